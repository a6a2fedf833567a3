//! Ticket lifecycle tests against the service layer
//!
//! Drive the service graph the server builds, over a memory store and a
//! manual clock, through login, grant, validation, expiry and logout.

use cas_service::clock::Clock;
use cas_service::config::Config;
use cas_service::errors::InvalidTicketReason;
use cas_service::services::ValidationOptions;
use cas_service::ticket::TicketType;
use cas_test_utils::*;
use common::types::Service;
use serde_json::json;
use std::collections::BTreeMap;

fn options() -> ValidationOptions {
    ValidationOptions::default()
}

#[tokio::test]
async fn test_login_grant_validate_flow() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let service = Service::new(TEST_SERVICE_APP);

    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    tgt.assert_type(TicketType::TicketGranting)
        .assert_well_formed_id(None);

    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();
    st.assert_type(TicketType::Service)
        .assert_parent(tgt.id())
        .assert_valid_at(clock.now());
    assert!(st.is_from_new_login());

    let assertion = cas
        .validate_service_ticket(st.id(), &service, &options())
        .await
        .unwrap();
    assert_eq!(assertion.principal.id, TEST_USER);
    assert_eq!(assertion.principal.attribute("mail"), ["casuser@example.org"]);
    assert_eq!(assertion.service, service);
    assert!(assertion.from_new_login);
    assert!(assertion.proxies.is_empty());
    assert!(assertion.proxy_granting_ticket.is_none());

    // The TGT records the grant
    let stored = cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    assert_eq!(stored.granted_services(), vec![service]);
    assert_eq!(stored.count_of_uses(), 1);
}

#[tokio::test]
async fn test_service_ticket_is_single_use() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    clock.advance_seconds(100);
    cas.validate_service_ticket(st.id(), &service, &options())
        .await
        .unwrap();

    clock.advance_seconds(1);
    cas.validate_service_ticket(st.id(), &service, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
    assert!(cas.registry().find_ticket(st.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_multi_use_service_ticket() {
    let config = Config {
        st_number_of_uses: 2,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    for _ in 0..2 {
        cas.validate_service_ticket(st.id(), &service, &options())
            .await
            .unwrap();
    }
    cas.validate_service_ticket(st.id(), &service, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_service_ticket_expires_after_time_to_kill() {
    let config = Config {
        st_time_to_kill_seconds: 10,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    clock.advance_seconds(11);
    cas.validate_service_ticket(st.id(), &service, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::Expired);

    // Removed at lookup; the TGT is untouched
    assert!(cas.registry().find_ticket(st.id()).await.unwrap().is_none());
    assert!(cas.registry().find_ticket(tgt.id()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ticket_granting_ticket_idle_timeout() {
    let config = Config {
        tgt_max_time_to_live_seconds: 5,
        tgt_time_to_kill_seconds: 2,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    clock.advance_seconds(3);
    cas.grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_APP))
        .await
        .assert_invalid_ticket(InvalidTicketReason::Expired);
}

#[tokio::test]
async fn test_ticket_granting_ticket_hard_timeout_despite_activity() {
    let config = Config {
        tgt_max_time_to_live_seconds: 5,
        tgt_time_to_kill_seconds: 2,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    // Each grant resets the idle window
    for _ in 0..2 {
        clock.advance_seconds(2);
        cas.grant_service_ticket(tgt.id(), &service).await.unwrap();
    }

    clock.advance_seconds(2);
    cas.grant_service_ticket(tgt.id(), &service)
        .await
        .assert_invalid_ticket(InvalidTicketReason::Expired);
}

#[tokio::test]
async fn test_expired_session_invalidates_outstanding_service_tickets() {
    let config = Config {
        tgt_max_time_to_live_seconds: 5,
        tgt_time_to_kill_seconds: 0,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    clock.advance_seconds(6);
    st.assert_valid_at(clock.now());
    cas.validate_service_ticket(st.id(), &service, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::ParentInvalid);
}

#[tokio::test]
async fn test_only_first_service_ticket_is_from_new_login() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    let first = cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_APP))
        .await
        .unwrap();
    let second = cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_MAIL))
        .await
        .unwrap();
    assert!(first.is_from_new_login());
    assert!(!second.is_from_new_login());

    let assertion = cas
        .validate_service_ticket(second.id(), &Service::new(TEST_SERVICE_MAIL), &options())
        .await
        .unwrap();
    assert!(!assertion.from_new_login);
}

#[tokio::test]
async fn test_logout_cascades_to_granted_tickets() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let app = Service::new(TEST_SERVICE_APP);
    let mail = Service::new(TEST_SERVICE_MAIL);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st_app = cas.grant_service_ticket(tgt.id(), &app).await.unwrap();
    let st_mail = cas.grant_service_ticket(tgt.id(), &mail).await.unwrap();

    let mut services: Vec<String> = cas
        .destroy_ticket_granting_ticket(tgt.id())
        .await
        .unwrap()
        .iter()
        .map(|s| s.id().to_string())
        .collect();
    services.sort();
    assert_eq!(services, vec![TEST_SERVICE_APP, TEST_SERVICE_MAIL]);

    cas.validate_service_ticket(st_app.id(), &app, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
    cas.validate_service_ticket(st_mail.id(), &mail, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
    assert!(cas.registry().get_tickets().await.unwrap().is_empty());

    // Logging out twice is harmless
    assert!(cas
        .destroy_ticket_granting_ticket(tgt.id())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_logout_rejects_non_granting_ids() {
    let (cas, _clock) = test_cas_with_clock(&test_config());
    cas.destroy_ticket_granting_ticket(TEST_ST_ID)
        .await
        .assert_invalid_ticket(InvalidTicketReason::WrongType);
}

#[tokio::test]
async fn test_proxy_chain() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let app = Service::new(TEST_SERVICE_APP);
    let backend = Service::new(TEST_SERVICE_BACKEND);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &app).await.unwrap();

    let assertion = cas
        .validate_service_ticket(
            st.id(),
            &app,
            &ValidationOptions {
                pgt_url: Some(Service::new(TEST_SERVICE_PROXY)),
                ..options()
            },
        )
        .await
        .unwrap();
    let pgt_id = assertion.proxy_granting_ticket.unwrap();
    let pgt = cas
        .registry()
        .get_ticket(&pgt_id, TicketType::ProxyGranting)
        .await
        .unwrap();
    pgt.assert_parent(tgt.id());

    let pt = cas.grant_proxy_ticket(&pgt_id, &backend).await.unwrap();
    pt.assert_type(TicketType::Proxy).assert_parent(&pgt_id);

    // A PT is not accepted where only STs are
    cas.validate_service_ticket(pt.id(), &backend, &options())
        .await
        .assert_invalid_ticket(InvalidTicketReason::WrongType);

    let proxied = cas
        .validate_service_ticket(
            pt.id(),
            &backend,
            &ValidationOptions {
                allow_proxy_tickets: true,
                ..options()
            },
        )
        .await
        .unwrap();
    assert_eq!(proxied.principal.id, TEST_USER);
    assert_eq!(proxied.proxies, vec![Service::new(TEST_SERVICE_PROXY)]);
    assert!(!proxied.from_new_login);
}

#[tokio::test]
async fn test_logout_reaches_proxy_chain() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let app = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &app).await.unwrap();
    let pgt_id = cas
        .validate_service_ticket(
            st.id(),
            &app,
            &ValidationOptions {
                pgt_url: Some(Service::new(TEST_SERVICE_PROXY)),
                ..options()
            },
        )
        .await
        .unwrap()
        .proxy_granting_ticket
        .unwrap();

    cas.destroy_ticket_granting_ticket(tgt.id()).await.unwrap();

    assert!(cas.registry().find_ticket(&pgt_id).await.unwrap().is_none());
    cas.grant_proxy_ticket(&pgt_id, &Service::new(TEST_SERVICE_BACKEND))
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_transient_session_ticket_reads_once() {
    let (cas, _clock) = test_cas_with_clock(&test_config());
    let properties = BTreeMap::from([("state".to_string(), json!("xyz"))]);

    let tst = cas
        .create_transient_session_ticket(Some(Service::new(TEST_SERVICE_APP)), properties)
        .await
        .unwrap();
    tst.assert_type(TicketType::TransientSession);

    let read = cas.consume_transient_session_ticket(tst.id()).await.unwrap();
    assert_eq!(read.property("state"), Some(&json!("xyz")));

    cas.consume_transient_session_ticket(tst.id())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_transient_session_ticket_expires() {
    let config = Config {
        tst_time_to_kill_seconds: 30,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let tst = cas
        .create_transient_session_ticket(None, BTreeMap::new())
        .await
        .unwrap();

    clock.advance_seconds(31);
    cas.consume_transient_session_ticket(tst.id())
        .await
        .assert_invalid_ticket(InvalidTicketReason::Expired);
}

#[tokio::test]
async fn test_sweep_removes_expired_and_orphaned_tickets() {
    let config = Config {
        st_time_to_kill_seconds: 10,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let stale = cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_APP))
        .await
        .unwrap();

    clock.advance_seconds(11);
    let fresh = cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_MAIL))
        .await
        .unwrap();

    // An orphan whose parent never existed
    let orphan = TestTicketBuilder::service(TEST_SERVICE_APP)
        .with_id("ST-1-orphaned")
        .with_parent("TGT-1-gone")
        .created_at(clock.now())
        .build();
    cas.registry().add_ticket(&orphan).await.unwrap();

    assert_eq!(cas.registry().clean().await.unwrap(), 2);

    let registry = cas.registry();
    assert!(registry.find_ticket(stale.id()).await.unwrap().is_none());
    assert!(registry.find_ticket(orphan.id()).await.unwrap().is_none());
    assert!(registry.find_ticket(fresh.id()).await.unwrap().is_some());
    assert!(registry.find_ticket(tgt.id()).await.unwrap().is_some());

    // A second sweep finds nothing
    assert_eq!(registry.clean().await.unwrap(), 0);
}
