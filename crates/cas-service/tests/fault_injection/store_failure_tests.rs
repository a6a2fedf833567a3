//! Slow and failing ticket store backends

use cas_service::clock::{Clock, SystemClock};
use cas_service::errors::CasError;
use cas_service::services::{CentralAuthenticationService, ValidationOptions};
use cas_service::ticket::Ticket;
use cas_test_utils::*;
use common::types::Service;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

struct Node {
    cas: Arc<CentralAuthenticationService>,
    store: Arc<FaultyStore>,
}

/// A node over a healthy fault-injecting store, 200ms registry timeout
fn node() -> Node {
    let store = Arc::new(FaultyStore::default());
    let cas = test_cas(&test_config(), store.clone(), test_clock());
    Node { cas, store }
}

impl Node {
    async fn session_with_ticket(&self) -> (Ticket, Ticket) {
        let now = self.cas.registry().clock().now();
        let tgt = self
            .cas
            .create_ticket_granting_ticket(test_authentication(now))
            .await
            .unwrap();
        let st = self
            .cas
            .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_APP))
            .await
            .unwrap();
        (tgt, st)
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    let node = node();
    node.store
        .set_mode(FaultMode::Slow(Duration::from_millis(500)));

    let result = node
        .cas
        .create_ticket_granting_ticket(test_authentication(test_epoch()))
        .await;
    result.assert_storage_timeout();

    let error = result.unwrap_err();
    assert_eq!(error.protocol_code(), "INTERNAL_ERROR");
    assert!(!error.public_message().contains("put_if_absent"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_within_timeout_succeeds() {
    let node = node();
    node.store
        .set_mode(FaultMode::Slow(Duration::from_millis(50)));

    let (_, st) = node.session_with_ticket().await;
    node.cas
        .validate_service_ticket(
            st.id(),
            &Service::new(TEST_SERVICE_APP),
            &ValidationOptions::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unavailable_store_is_not_reported_as_missing_ticket() {
    let node = node();
    let (_, st) = node.session_with_ticket().await;
    let service = Service::new(TEST_SERVICE_APP);

    node.store.set_mode(FaultMode::Unavailable);
    let result = node
        .cas
        .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await;
    result.assert_storage_error();
    assert!(result.unwrap_err().invalid_ticket_reason().is_none());

    // The failed attempt consumed nothing; a retry after recovery succeeds
    node.store.set_mode(FaultMode::Healthy);
    node.cas
        .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejecting_store_leaves_session_untouched() {
    let node = node();
    let (tgt, _) = node.session_with_ticket().await;
    let before = node.cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();

    node.store.set_mode(FaultMode::Rejecting);
    node.cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_MAIL))
        .await
        .assert_storage_error();

    node.store.set_mode(FaultMode::Healthy);
    let after = node.cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    assert_eq!(after.count_of_uses(), before.count_of_uses());
    assert_eq!(after.granted_services(), before.granted_services());
    assert_eq!(node.store.inner().len().await, 2);
}

#[tokio::test]
async fn test_sweep_and_logout_surface_store_failures() {
    let node = node();
    let (tgt, _) = node.session_with_ticket().await;

    node.store.set_mode(FaultMode::Unavailable);
    assert!(matches!(
        node.cas.registry().clean().await,
        Err(CasError::Storage(_))
    ));
    node.cas
        .destroy_ticket_granting_ticket(tgt.id())
        .await
        .assert_storage_error();
    assert!(node.cas.registry().ping().await.is_err());

    // Logout can be retried once the backend is back
    node.store.set_mode(FaultMode::Healthy);
    let services = node
        .cas
        .destroy_ticket_granting_ticket(tgt.id())
        .await
        .unwrap();
    assert_eq!(services, vec![Service::new(TEST_SERVICE_APP)]);
    assert!(node.store.inner().is_empty().await);
}

#[tokio::test]
async fn test_id_collision_is_retried_once_with_fresh_id() {
    let node = node();
    let (tgt, _) = node.session_with_ticket().await;
    let attempts = node.store.insert_attempts();

    node.store.collide_next_inserts(1);
    let st = node
        .cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_MAIL))
        .await
        .unwrap();

    assert_eq!(node.store.insert_attempts(), attempts + 2);
    assert!(node.cas.registry().find_ticket(st.id()).await.unwrap().is_some());
    let session = node.cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    assert!(session.descendant_ids().contains(&st.id().to_string()));
}

#[tokio::test]
async fn test_repeated_id_collision_surfaces_duplicate_ticket() {
    let node = node();
    let (tgt, _) = node.session_with_ticket().await;
    let before = node.cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    let attempts = node.store.insert_attempts();

    node.store.collide_next_inserts(2);
    let result = node
        .cas
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_MAIL))
        .await;
    assert!(matches!(result, Err(CasError::DuplicateTicket)));
    assert_eq!(node.store.insert_attempts(), attempts + 2, "One retry, no more");

    // Nothing was stored or recorded on the session
    assert_eq!(node.store.inner().len().await, 2);
    let after = node.cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    assert_eq!(after.count_of_uses(), before.count_of_uses());

    node.store.collide_next_inserts(2);
    assert!(matches!(
        node.cas
            .create_ticket_granting_ticket(test_authentication(test_epoch()))
            .await,
        Err(CasError::DuplicateTicket)
    ));
}

#[tokio::test]
async fn test_every_call_reaches_the_store() {
    let node = node();
    node.store.set_mode(FaultMode::Unavailable);

    let before = node.store.calls();
    let _ = node.cas.registry().find_ticket(TEST_TGT_ID).await;
    assert_eq!(node.store.calls(), before + 1, "Failures are not retried blindly");
}

#[tokio::test]
async fn test_validation_endpoint_answers_503_while_store_is_down() -> Result<(), anyhow::Error> {
    let store = Arc::new(FaultyStore::default());
    let server =
        TestCasServer::spawn_with(test_config(), store.clone(), Arc::new(SystemClock)).await?;
    let tgt = server.login(TEST_USER, TEST_PASSWORD).await?;
    let st = server.grant_service_ticket(&tgt, TEST_SERVICE_APP).await?;

    store.set_mode(FaultMode::Unavailable);
    let (status, document) = server.service_validate(TEST_SERVICE_APP, &st, &[]).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        document["serviceResponse"]["authenticationFailure"]["code"],
        "INTERNAL_ERROR"
    );
    assert!(!document.to_string().contains("injected"));

    store.set_mode(FaultMode::Healthy);
    let (status, document) = server.service_validate(TEST_SERVICE_APP, &st, &[]).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        document["serviceResponse"]["authenticationSuccess"]["user"],
        TEST_USER
    );
    Ok(())
}

#[tokio::test]
async fn test_login_answers_503_on_store_timeout() -> Result<(), anyhow::Error> {
    let store = Arc::new(FaultyStore::new(FaultMode::Slow(Duration::from_millis(500))));
    let server =
        TestCasServer::spawn_with(test_config(), store.clone(), Arc::new(SystemClock)).await?;

    let response = server
        .client()
        .post(format!("{}/v1/tickets", server.url()))
        .form(&[("username", TEST_USER), ("password", TEST_PASSWORD)])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
