//! Validation rule tests: service matching, renew and the authorizer plan

use cas_service::authn::Authentication;
use cas_service::clock::Clock;
use cas_service::config::Config;
use cas_service::errors::InvalidTicketReason;
use cas_service::mfa::ServiceMfaRule;
use cas_service::services::{CentralAuthenticationService, ValidationOptions};
use cas_service::ticket::Ticket;
use cas_test_utils::*;
use common::types::{Principal, Service};
use std::collections::BTreeMap;
use std::sync::Arc;

async fn grant(
    cas: &Arc<CentralAuthenticationService>,
    authentication: Authentication,
    service: &str,
) -> Ticket {
    let tgt = cas
        .create_ticket_granting_ticket(authentication)
        .await
        .unwrap();
    cas.grant_service_ticket(tgt.id(), &Service::new(service))
        .await
        .unwrap()
}

fn mfa_config() -> Config {
    Config {
        required_mfa_services: vec![ServiceMfaRule {
            service_prefix: TEST_SERVICE_APP.to_string(),
            provider_id: TEST_MFA_PROVIDER.to_string(),
        }],
        mfa_providers: BTreeMap::from([(TEST_MFA_PROVIDER.to_string(), 1)]),
        ..test_config()
    }
}

#[tokio::test]
async fn test_service_mismatch_burns_ticket() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;

    let result = cas
        .validate_service_ticket(
            st.id(),
            &Service::new(TEST_SERVICE_MAIL),
            &ValidationOptions::default(),
        )
        .await;
    result.assert_invalid_ticket(InvalidTicketReason::ServiceMismatch);
    assert_eq!(result.unwrap_err().protocol_code(), "INVALID_SERVICE");

    // The rightful service can no longer use it either
    cas.validate_service_ticket(
        st.id(),
        &Service::new(TEST_SERVICE_APP),
        &ValidationOptions::default(),
    )
    .await
    .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_granting_ticket_is_not_a_service_ticket() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    cas.validate_service_ticket(
        tgt.id(),
        &Service::new(TEST_SERVICE_APP),
        &ValidationOptions::default(),
    )
    .await
    .assert_invalid_ticket(InvalidTicketReason::WrongType);

    // And the session survives the attempt
    assert!(cas.registry().find_ticket(tgt.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_ticket_id() {
    let (cas, _clock) = test_cas_with_clock(&test_config());
    let service = Service::new(TEST_SERVICE_APP);

    cas.validate_service_ticket(TEST_ST_ID, &service, &ValidationOptions::default())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
    cas.validate_service_ticket("not-a-ticket", &service, &ValidationOptions::default())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_renew_requires_ticket_from_new_login() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let renew = ValidationOptions {
        renew: true,
        ..ValidationOptions::default()
    };
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let app = Service::new(TEST_SERVICE_APP);
    let mail = Service::new(TEST_SERVICE_MAIL);

    let fresh = cas.grant_service_ticket(tgt.id(), &app).await.unwrap();
    let sso = cas.grant_service_ticket(tgt.id(), &mail).await.unwrap();

    let assertion = cas
        .validate_service_ticket(fresh.id(), &app, &renew)
        .await
        .unwrap();
    assert!(assertion.from_new_login);

    cas.validate_service_ticket(sso.id(), &mail, &renew)
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFromNewLogin);
    assert!(cas.registry().find_ticket(sso.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unregistered_service_is_denied_and_ticket_burned() {
    let config = Config {
        allowed_services: vec![TEST_SERVICE_APP.to_string()],
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_UNREGISTERED);
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_UNREGISTERED).await;

    let result = cas
        .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await;
    result.assert_unauthorized("SERVICE_NOT_ALLOWED");
    assert_eq!(result.unwrap_err().protocol_code(), "UNAUTHORIZED_SERVICE");

    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_registered_service_prefix_is_allowed() {
    let config = Config {
        allowed_services: vec![TEST_SERVICE_APP.to_string()],
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = format!("{TEST_SERVICE_APP}/login?next=home");
    let st = grant(&cas, test_authentication(clock.now()), &service).await;

    cas.validate_service_ticket(st.id(), &Service::new(service), &ValidationOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_look_alike_host_is_not_a_registered_service() {
    let config = Config {
        allowed_services: vec![TEST_SERVICE_APP.to_string()],
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let look_alike = format!("{TEST_SERVICE_APP}.attacker.net/steal");
    let st = grant(&cas, test_authentication(clock.now()), &look_alike).await;

    cas.validate_service_ticket(st.id(), &Service::new(look_alike), &ValidationOptions::default())
        .await
        .assert_unauthorized("SERVICE_NOT_ALLOWED");
}

#[tokio::test]
async fn test_mfa_required_for_service() {
    let (cas, clock) = test_cas_with_clock(&mfa_config());
    let service = Service::new(TEST_SERVICE_APP);

    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .assert_unauthorized("MFA_REQUIRED");

    let satisfied = test_authentication(clock.now()).with_mfa_provider(TEST_MFA_PROVIDER);
    let st = grant(&cas, satisfied, TEST_SERVICE_APP).await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mfa_not_required_for_other_services() {
    let (cas, clock) = test_cas_with_clock(&mfa_config());
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_MAIL).await;

    cas.validate_service_ticket(
        st.id(),
        &Service::new(TEST_SERVICE_MAIL),
        &ValidationOptions::default(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_mfa_required_by_principal_attribute() {
    let config = Config {
        mfa_providers: BTreeMap::from([(TEST_MFA_PROVIDER.to_string(), 1)]),
        mfa_principal_attribute: Some("mfaPolicy".to_string()),
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_MAIL);

    let enrolled = Authentication::new(
        Principal::new(TEST_USER).with_attribute("mfaPolicy", TEST_MFA_PROVIDER),
        clock.now(),
    );
    let st = grant(&cas, enrolled, TEST_SERVICE_MAIL).await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .assert_unauthorized("MFA_REQUIRED");

    // Users without the attribute are unaffected
    let st = grant(
        &cas,
        Authentication::new(Principal::new(TEST_USER_BOB), clock.now()),
        TEST_SERVICE_MAIL,
    )
    .await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_required_attributes() {
    let config = Config {
        required_attributes: BTreeMap::from([
            ("mail".to_string(), Vec::new()),
            ("memberOf".to_string(), vec!["staff".to_string()]),
        ]),
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);

    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .assert_unauthorized("REQUIRED_ATTRIBUTES_MISSING");

    let staff = Authentication::new(
        Principal::new(TEST_USER)
            .with_attribute("mail", "casuser@example.org")
            .with_attribute("memberOf", "staff"),
        clock.now(),
    );
    let st = grant(&cas, staff, TEST_SERVICE_APP).await;
    cas.validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_authorizers_fail_fast_in_registration_order() {
    // The ticket would fail all three authorizers; the service registry
    // runs first and its denial is the one reported
    let config = Config {
        allowed_services: vec![TEST_SERVICE_MAIL.to_string()],
        required_attributes: BTreeMap::from([("memberOf".to_string(), Vec::new())]),
        ..mfa_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;

    cas.validate_service_ticket(
        st.id(),
        &Service::new(TEST_SERVICE_APP),
        &ValidationOptions::default(),
    )
    .await
    .assert_unauthorized("SERVICE_NOT_ALLOWED");

    // Registered but without MFA: multifactor runs before attributes
    let config = Config {
        allowed_services: Vec::new(),
        ..config
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;
    cas.validate_service_ticket(
        st.id(),
        &Service::new(TEST_SERVICE_APP),
        &ValidationOptions::default(),
    )
    .await
    .assert_unauthorized("MFA_REQUIRED");
}

#[tokio::test]
async fn test_expired_ticket_is_rejected_before_authorizers() {
    let config = Config {
        allowed_services: vec![TEST_SERVICE_MAIL.to_string()],
        st_time_to_kill_seconds: 10,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let st = grant(&cas, test_authentication(clock.now()), TEST_SERVICE_APP).await;

    clock.advance_seconds(11);
    cas.validate_service_ticket(
        st.id(),
        &Service::new(TEST_SERVICE_APP),
        &ValidationOptions::default(),
    )
    .await
    .assert_invalid_ticket(InvalidTicketReason::Expired);
}
