pub mod cas_service;

pub use cas_service::{Assertion, CentralAuthenticationService, ValidationOptions};
