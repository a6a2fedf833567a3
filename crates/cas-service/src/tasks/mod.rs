//! Background tasks for the ticket server.
//!
//! # Tasks
//!
//! - `registry_cleaner` - Periodically removes expired and orphaned tickets

pub mod registry_cleaner;

pub use registry_cleaner::{start_registry_cleaner, RegistryCleanerConfig};
