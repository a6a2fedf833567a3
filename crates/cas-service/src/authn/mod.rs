//! Primary authentication.
//!
//! Turns a presented credential into an [`Authentication`], the record a
//! ticket-granting ticket carries for the lifetime of the SSO session.
//! Handlers are pluggable through [`AuthenticationHandler`]; the built-in
//! [`AcceptUsersAuthenticationHandler`] checks a static bcrypt-hashed user map.

use crate::errors::CasError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{Attributes, Principal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

/// Bcrypt hash verified when the username is unknown, so that unknown and
/// known users take the same time to reject.
const DUMMY_BCRYPT_HASH: &str = "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// Username/password credential.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
}

/// The outcome of a successful primary authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub principal: Principal,
    pub authentication_date: DateTime<Utc>,
    /// Authentication-level attributes (method, handler, ...)
    #[serde(default)]
    pub attributes: Attributes,
    /// Names of the handlers that accepted the credential
    #[serde(default)]
    pub successful_handlers: Vec<String>,
    /// Multifactor providers satisfied during this session
    #[serde(default)]
    pub satisfied_mfa_providers: BTreeSet<String>,
}

impl Authentication {
    pub fn new(principal: Principal, authentication_date: DateTime<Utc>) -> Self {
        Self {
            principal,
            authentication_date,
            attributes: Attributes::new(),
            successful_handlers: Vec::new(),
            satisfied_mfa_providers: BTreeSet::new(),
        }
    }

    /// Record a satisfied multifactor provider
    pub fn with_mfa_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.satisfied_mfa_providers.insert(provider_id.into());
        self
    }

    pub fn has_satisfied(&self, provider_id: &str) -> bool {
        self.satisfied_mfa_providers.contains(provider_id)
    }
}

/// Verifies a credential and resolves the principal.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    /// Handler name recorded in `Authentication::successful_handlers`
    fn name(&self) -> &'static str;

    async fn authenticate(&self, credential: &Credential) -> Result<Principal, CasError>;
}

/// Static users with bcrypt-hashed passwords.
#[derive(Debug, Clone, Default)]
pub struct AcceptUsersAuthenticationHandler {
    users: HashMap<String, String>,
}

impl AcceptUsersAuthenticationHandler {
    /// Create from a `username -> bcrypt hash` map
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl AuthenticationHandler for AcceptUsersAuthenticationHandler {
    fn name(&self) -> &'static str {
        "AcceptUsersAuthenticationHandler"
    }

    #[instrument(skip_all, name = "cas.authn.accept_users")]
    async fn authenticate(&self, credential: &Credential) -> Result<Principal, CasError> {
        let known = self.users.get(&credential.username);
        let hash = known
            .cloned()
            .unwrap_or_else(|| DUMMY_BCRYPT_HASH.to_string());
        let password = credential.password.expose_secret().to_string();

        // bcrypt is CPU-bound; keep it off the async workers
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| {
                tracing::error!(target: "cas.authn", error = %e, "Password verification task failed");
                CasError::Internal
            })?;

        if known.is_none() {
            tracing::debug!(target: "cas.authn", "Rejected credential");
            return Err(CasError::AuthenticationFailed);
        }

        let is_valid = verified
            .map_err(|e| CasError::Crypto(format!("Password verification failed: {}", e)))?;

        if !is_valid {
            tracing::debug!(target: "cas.authn", "Rejected credential");
            return Err(CasError::AuthenticationFailed);
        }

        Ok(Principal::new(credential.username.clone()))
    }
}
