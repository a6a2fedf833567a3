//! Concurrent validation and issuance

use cas_service::clock::Clock;
use cas_service::config::Config;
use cas_service::errors::{CasError, InvalidTicketReason};
use cas_service::services::ValidationOptions;
use cas_test_utils::*;
use common::types::Service;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

const CONTENDERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_use_ticket_validates_once_under_contention() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    let attempts = (0..CONTENDERS).map(|_| {
        let cas = Arc::clone(&cas);
        let service = service.clone();
        let id = st.id().to_string();
        tokio::spawn(async move {
            cas.validate_service_ticket(&id, &service, &ValidationOptions::default())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "Exactly one validator may win");
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(CasError::InvalidTicket {
            reason: InvalidTicketReason::NotFound
        })
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_use_ticket_never_exceeds_its_uses() {
    let config = Config {
        st_number_of_uses: 3,
        ..test_config()
    };
    let (cas, clock) = test_cas_with_clock(&config);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();
    let st = cas.grant_service_ticket(tgt.id(), &service).await.unwrap();

    let attempts = (0..CONTENDERS).map(|_| {
        let cas = Arc::clone(&cas);
        let service = service.clone();
        let id = st.id().to_string();
        tokio::spawn(async move {
            cas.validate_service_ticket(&id, &service, &ValidationOptions::default())
                .await
                .is_ok()
        })
    });
    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| *joined.as_ref().unwrap())
        .count();

    assert_eq!(successes, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_yields_unique_ids() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    let grants = (0..CONTENDERS * 4).map(|i| {
        let cas = Arc::clone(&cas);
        let tgt_id = tgt.id().to_string();
        tokio::spawn(async move {
            let service = Service::new(format!("{TEST_SERVICE_APP}/{i}"));
            cas.grant_service_ticket(&tgt_id, &service)
                .await
                .unwrap()
                .id()
                .to_string()
        })
    });
    let ids: HashSet<String> = join_all(grants)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    assert_eq!(ids.len(), CONTENDERS * 4);

    // Every grant was recorded on the session despite the contention
    let stored = cas.registry().find_ticket(tgt.id()).await.unwrap().unwrap();
    assert_eq!(stored.granted_services().len(), CONTENDERS * 4);
    assert_eq!(stored.count_of_uses() as usize, CONTENDERS * 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_grants_yield_one_fresh_login_ticket() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    // Every grant starts from the same unused TGT
    let grants = (0..CONTENDERS).map(|i| {
        let cas = Arc::clone(&cas);
        let tgt_id = tgt.id().to_string();
        tokio::spawn(async move {
            let service = Service::new(format!("{TEST_SERVICE_APP}/{i}"));
            cas.grant_service_ticket(&tgt_id, &service).await.unwrap()
        })
    });
    let tickets: Vec<_> = join_all(grants)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let fresh = tickets.iter().filter(|st| st.is_from_new_login()).count();
    assert_eq!(fresh, 1, "Only the first grant follows the login");

    let mut stored_fresh = 0;
    for st in &tickets {
        let stored = cas.registry().find_ticket(st.id()).await.unwrap().unwrap();
        assert_eq!(stored.is_from_new_login(), st.is_from_new_login());
        if stored.is_from_new_login() {
            stored_fresh += 1;
        }
    }
    assert_eq!(stored_fresh, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_races_with_grants() {
    let (cas, clock) = test_cas_with_clock(&test_config());
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cas
        .create_ticket_granting_ticket(test_authentication(clock.now()))
        .await
        .unwrap();

    let grants: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let cas = Arc::clone(&cas);
            let service = service.clone();
            let tgt_id = tgt.id().to_string();
            tokio::spawn(async move { cas.grant_service_ticket(&tgt_id, &service).await })
        })
        .collect();
    cas.destroy_ticket_granting_ticket(tgt.id()).await.unwrap();

    // Whatever was granted before or during logout must not validate after it
    for joined in join_all(grants).await {
        if let Ok(st) = joined.unwrap() {
            let result = cas
                .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
                .await;
            assert!(result.is_err(), "Ticket outlived its session");
        }
    }
}
