//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types for
//! primary credentials (user passwords) and for connection strings that may
//! embed credentials, such as a Redis URL with a password.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to pass to `tracing` fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct UsernamePasswordCredential {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let credential = UsernamePasswordCredential {
//!     username: "casuser".to_string(),
//!     password: SecretString::from("Mellon"),
//! };
//!
//! // Password is redacted
//! println!("{:?}", credential);
//!
//! // Access requires an explicit call
//! let password: &str = credential.password.expose_secret();
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
