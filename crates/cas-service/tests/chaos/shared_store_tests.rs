//! Several server nodes over one shared ticket store
//!
//! Each node has its own registry (its own locks and child index); only the
//! store is shared, as with a Redis-backed deployment.

use cas_service::clock::{Clock, ManualClock};
use cas_service::config::Config;
use cas_service::errors::InvalidTicketReason;
use cas_service::registry::{MemoryTicketStore, TicketStore};
use cas_service::services::{CentralAuthenticationService, ValidationOptions};
use cas_test_utils::*;
use common::types::Service;
use futures::future::join_all;
use std::sync::Arc;

struct Cluster {
    nodes: Vec<Arc<CentralAuthenticationService>>,
    clock: Arc<ManualClock>,
}

fn cluster(size: usize) -> Cluster {
    let store: Arc<dyn TicketStore> = Arc::new(MemoryTicketStore::new());
    let clock = test_clock();
    let nodes = (0..size)
        .map(|n| {
            let config = Config {
                node_id: Some(format!("node-{n}")),
                ..test_config()
            };
            test_cas(&config, Arc::clone(&store), clock.clone())
        })
        .collect();
    Cluster { nodes, clock }
}

impl Cluster {
    fn node(&self, n: usize) -> &Arc<CentralAuthenticationService> {
        self.nodes.get(n).unwrap()
    }
}

#[tokio::test]
async fn test_ticket_issued_on_one_node_validates_on_another() {
    let cluster = cluster(2);
    let service = Service::new(TEST_SERVICE_APP);

    let tgt = cluster
        .node(0)
        .create_ticket_granting_ticket(test_authentication(cluster.clock.now()))
        .await
        .unwrap();
    tgt.assert_well_formed_id(Some("node-0"));

    let st = cluster
        .node(1)
        .grant_service_ticket(tgt.id(), &service)
        .await
        .unwrap();
    st.assert_well_formed_id(Some("node-1")).assert_parent(tgt.id());

    let assertion = cluster
        .node(0)
        .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .unwrap();
    assert_eq!(assertion.principal.id, TEST_USER);

    cluster
        .node(1)
        .validate_service_ticket(st.id(), &service, &ValidationOptions::default())
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cross_node_double_validation() {
    let cluster = cluster(4);
    let service = Service::new(TEST_SERVICE_APP);
    let tgt = cluster
        .node(0)
        .create_ticket_granting_ticket(test_authentication(cluster.clock.now()))
        .await
        .unwrap();
    let st = cluster
        .node(0)
        .grant_service_ticket(tgt.id(), &service)
        .await
        .unwrap();

    let attempts = cluster.nodes.iter().cycle().take(16).map(|node| {
        let node = Arc::clone(node);
        let service = service.clone();
        let id = st.id().to_string();
        tokio::spawn(async move {
            node.validate_service_ticket(&id, &service, &ValidationOptions::default())
                .await
                .is_ok()
        })
    });
    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| *joined.as_ref().unwrap())
        .count();

    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_logout_on_one_node_ends_session_everywhere() {
    let cluster = cluster(2);
    let app = Service::new(TEST_SERVICE_APP);
    let mail = Service::new(TEST_SERVICE_MAIL);
    let tgt = cluster
        .node(0)
        .create_ticket_granting_ticket(test_authentication(cluster.clock.now()))
        .await
        .unwrap();

    // Grants land on different nodes, so neither holds the full child index
    let st_app = cluster.node(0).grant_service_ticket(tgt.id(), &app).await.unwrap();
    let st_mail = cluster.node(1).grant_service_ticket(tgt.id(), &mail).await.unwrap();

    let services = cluster
        .node(1)
        .destroy_ticket_granting_ticket(tgt.id())
        .await
        .unwrap();
    assert_eq!(services.len(), 2);

    for (st, service) in [(&st_app, &app), (&st_mail, &mail)] {
        for node in &cluster.nodes {
            node.validate_service_ticket(st.id(), service, &ValidationOptions::default())
                .await
                .assert_invalid_ticket(InvalidTicketReason::NotFound);
        }
    }
    cluster
        .node(0)
        .grant_service_ticket(tgt.id(), &app)
        .await
        .assert_invalid_ticket(InvalidTicketReason::NotFound);
}

#[tokio::test]
async fn test_sweep_on_one_node_sees_tickets_from_all() {
    let cluster = cluster(2);
    let tgt = cluster
        .node(0)
        .create_ticket_granting_ticket(test_authentication(cluster.clock.now()))
        .await
        .unwrap();
    cluster
        .node(1)
        .grant_service_ticket(tgt.id(), &Service::new(TEST_SERVICE_APP))
        .await
        .unwrap();

    // Past the default service ticket kill time
    cluster.clock.advance_seconds(301);

    assert_eq!(cluster.node(0).registry().clean().await.unwrap(), 1);
    assert_eq!(cluster.node(1).registry().clean().await.unwrap(), 0);
}
