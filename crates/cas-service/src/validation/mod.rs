//! Service ticket validation authorizers.
//!
//! Authorizers are registered once at startup into a
//! [`ValidationAuthorizersExecutionPlan`]. Registration order is evaluation
//! order; the first denial stops the chain and becomes the validation
//! failure. Authorizers see the request read-only and never touch tickets.

pub mod authorizers;

pub use authorizers::{
    MultifactorAuthorizer, RegisteredServiceAuthorizer, RequiredAttributesAuthorizer,
};

use crate::authn::Authentication;
use crate::errors::CasError;
use async_trait::async_trait;
use common::types::{Principal, Service};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What an authorizer is asked to judge.
///
/// Authorizers get the ticket id only, never the ticket itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub service: &'a Service,
    pub ticket_id: &'a str,
    pub principal: &'a Principal,
    pub authentication: &'a Authentication,
}

/// A denial with a machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerDenial {
    pub code: String,
    pub reason: String,
}

impl AuthorizerDenial {
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl From<AuthorizerDenial> for CasError {
    fn from(denial: AuthorizerDenial) -> Self {
        CasError::UnauthorizedService {
            code: denial.code,
            reason: denial.reason,
        }
    }
}

#[async_trait]
pub trait ServiceTicketValidationAuthorizer: Send + Sync {
    /// Name for logs
    fn name(&self) -> &'static str;

    async fn authorize(&self, request: &ValidationRequest<'_>) -> Result<(), AuthorizerDenial>;
}

/// Ordered, fail-fast chain of authorizers.
#[derive(Default)]
pub struct ValidationAuthorizersExecutionPlan {
    authorizers: Vec<Arc<dyn ServiceTicketValidationAuthorizer>>,
}

impl ValidationAuthorizersExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an authorizer; it runs after every one registered before it
    pub fn register_authorizer(&mut self, authorizer: Arc<dyn ServiceTicketValidationAuthorizer>) {
        self.authorizers.push(authorizer);
    }

    pub fn authorizers(&self) -> &[Arc<dyn ServiceTicketValidationAuthorizer>] {
        &self.authorizers
    }

    pub fn len(&self) -> usize {
        self.authorizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorizers.is_empty()
    }

    /// Run every authorizer in order, stopping at the first denial
    #[instrument(skip_all, name = "cas.validation.authorize")]
    pub async fn authorize(&self, request: &ValidationRequest<'_>) -> Result<(), CasError> {
        for authorizer in &self.authorizers {
            if let Err(denial) = authorizer.authorize(request).await {
                debug!(
                    target: "cas.validation",
                    authorizer = authorizer.name(),
                    code = %denial.code,
                    "Validation denied"
                );
                return Err(denial.into());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ValidationAuthorizersExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.authorizers.iter().map(|a| a.name()))
            .finish()
    }
}
