//! # CAS Test Utilities
//!
//! Shared test utilities for the CAS ticket server.
//!
//! This crate provides:
//! - Fixed test ids, users and services
//! - Deterministic fixtures (manual clock, bcrypt-hashed users, configs)
//! - Ticket builders (`TestTicketBuilder`)
//! - A fault-injecting ticket store (`FaultyStore`)
//! - Server test harness (`TestCasServer` for HTTP tests)
//! - Custom assertions (`TicketAssertions`, `CasResultAssertions`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cas_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let server = TestCasServer::spawn().await?;
//!     let tgt = server.login(TEST_USER, TEST_PASSWORD).await?;
//!     let st = server.grant_service_ticket(&tgt, TEST_SERVICE_APP).await?;
//!
//!     let ticket = TestTicketBuilder::service(TEST_SERVICE_APP)
//!         .with_parent(TEST_TGT_ID)
//!         .build();
//!     ticket.assert_type(TicketType::Service);
//! }
//! ```

pub mod assertions;
pub mod faulty_store;
pub mod fixtures;
pub mod server_harness;
pub mod test_ids;
pub mod ticket_builders;

// Re-export commonly used items
pub use assertions::*;
pub use faulty_store::*;
pub use fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
pub use ticket_builders::*;
