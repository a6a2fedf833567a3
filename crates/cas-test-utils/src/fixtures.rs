//! Deterministic fixtures
//!
//! Fixed clock start, pre-hashed users and ready-made configurations.
//! Bcrypt runs at the minimum cost so fixture setup stays fast.

use crate::test_ids::*;
use cas_service::authn::Authentication;
use cas_service::clock::{Clock, ManualClock};
use cas_service::config::Config;
use cas_service::registry::{MemoryTicketStore, TicketStore};
use cas_service::routes::AppState;
use cas_service::services::CentralAuthenticationService;
use chrono::{DateTime, TimeZone, Utc};
use common::types::Principal;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Cheapest bcrypt cost accepted by the `bcrypt` crate
pub const TEST_BCRYPT_COST: u32 = 4;

/// 2026-01-01T00:00:00Z
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// A manual clock parked at [`test_epoch`]
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_epoch()))
}

/// `username -> bcrypt hash` for the fixture users, hashed once per process
pub fn test_users() -> HashMap<String, String> {
    static USERS: OnceLock<HashMap<String, String>> = OnceLock::new();
    USERS
        .get_or_init(|| {
            HashMap::from([
                (
                    TEST_USER.to_string(),
                    bcrypt::hash(TEST_PASSWORD, TEST_BCRYPT_COST).unwrap(),
                ),
                (
                    TEST_USER_BOB.to_string(),
                    bcrypt::hash(TEST_PASSWORD_BOB, TEST_BCRYPT_COST).unwrap(),
                ),
            ])
        })
        .clone()
}

/// Config with the fixture users, a short registry timeout and the cleaner
/// disabled (tests sweep explicitly)
pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        accept_users: test_users(),
        registry_cleaner_interval_seconds: 0,
        registry_timeout: std::time::Duration::from_millis(200),
        ticket_id_entropy_bytes: 16,
        ..Config::default()
    }
}

/// An authentication for [`TEST_USER`] at `at`
pub fn test_authentication(at: DateTime<Utc>) -> Authentication {
    Authentication::new(
        Principal::new(TEST_USER).with_attribute("mail", "casuser@example.org"),
        at,
    )
}

/// The service graph the server would build for `config`, without HTTP
pub fn test_cas(
    config: &Config,
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
) -> Arc<CentralAuthenticationService> {
    AppState::from_config(config, store, clock).cas
}

/// [`test_cas`] over a fresh memory store and a [`test_clock`]
pub fn test_cas_with_clock(config: &Config) -> (Arc<CentralAuthenticationService>, Arc<ManualClock>) {
    let clock = test_clock();
    let cas = test_cas(config, Arc::new(MemoryTicketStore::new()), clock.clone());
    (cas, clock)
}
