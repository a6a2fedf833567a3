//! Central Authentication Service (CAS) Ticket Server Library
//!
//! This library provides the ticket lifecycle and validation core of the
//! single-sign-on server: ticket issuance, expiration policies, the
//! distributed ticket registry and the service-ticket validation path.
//!
//! # Modules
//!
//! - `authn` - Primary authentication (credentials to principal)
//! - `cache` - Distributed cache envelope used to replicate tickets
//! - `clock` - Time source abstraction
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `mfa` - Multifactor provider resolution
//! - `middleware` - HTTP middleware (request metrics)
//! - `observability` - Log correlation ids, error categories, metrics
//! - `models` - Protocol request/response models
//! - `registry` - Ticket registry and storage backends
//! - `routes` - Axum router and shared application state
//! - `services` - Central authentication service (business logic)
//! - `tasks` - Background tasks (registry cleaner)
//! - `ticket` - Ticket model, id generation, expiration policies, factory
//! - `validation` - Service ticket validation authorizers

pub mod authn;
pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod mfa;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod services;
pub mod tasks;
pub mod ticket;
pub mod validation;
