//! Common utilities and types shared across the ticket server crates.

#![warn(clippy::pedantic)]

/// Module for shared identity types (principals, services)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
