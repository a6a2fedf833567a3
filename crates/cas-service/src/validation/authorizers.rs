//! Built-in validation authorizers.

use crate::mfa::MultifactorProviderResolver;
use crate::validation::{AuthorizerDenial, ServiceTicketValidationAuthorizer, ValidationRequest};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Only services under a registered URL prefix may validate tickets.
///
/// Prefixes match on URL boundaries, see
/// [`Service::is_under`](common::types::Service::is_under). An empty registry
/// allows every service.
#[derive(Debug, Clone, Default)]
pub struct RegisteredServiceAuthorizer {
    allowed_prefixes: Vec<String>,
}

impl RegisteredServiceAuthorizer {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self { allowed_prefixes }
    }
}

#[async_trait]
impl ServiceTicketValidationAuthorizer for RegisteredServiceAuthorizer {
    fn name(&self) -> &'static str {
        "RegisteredServiceAuthorizer"
    }

    async fn authorize(&self, request: &ValidationRequest<'_>) -> Result<(), AuthorizerDenial> {
        if self.allowed_prefixes.is_empty()
            || self
                .allowed_prefixes
                .iter()
                .any(|prefix| request.service.is_under(prefix))
        {
            return Ok(());
        }
        Err(AuthorizerDenial::new(
            "SERVICE_NOT_ALLOWED",
            "Service is not registered with this server",
        ))
    }
}

/// Requires the multifactor provider resolved for the request to have been
/// satisfied during the SSO session.
#[derive(Debug)]
pub struct MultifactorAuthorizer {
    resolver: Arc<MultifactorProviderResolver>,
}

impl MultifactorAuthorizer {
    pub fn new(resolver: Arc<MultifactorProviderResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ServiceTicketValidationAuthorizer for MultifactorAuthorizer {
    fn name(&self) -> &'static str {
        "MultifactorAuthorizer"
    }

    async fn authorize(&self, request: &ValidationRequest<'_>) -> Result<(), AuthorizerDenial> {
        match self.resolver.resolve(request.service, request.principal) {
            Some(provider) if !request.authentication.has_satisfied(provider.id()) => {
                Err(AuthorizerDenial::new(
                    "MFA_REQUIRED",
                    format!(
                        "Service requires multifactor authentication via {}",
                        provider.id()
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Requires the principal to carry given attribute values.
///
/// Each configured attribute must have at least one value in common with the
/// accepted set; an empty accepted set only requires the attribute's presence.
#[derive(Debug, Clone, Default)]
pub struct RequiredAttributesAuthorizer {
    required: BTreeMap<String, Vec<String>>,
}

impl RequiredAttributesAuthorizer {
    pub fn new(required: BTreeMap<String, Vec<String>>) -> Self {
        Self { required }
    }
}

#[async_trait]
impl ServiceTicketValidationAuthorizer for RequiredAttributesAuthorizer {
    fn name(&self) -> &'static str {
        "RequiredAttributesAuthorizer"
    }

    async fn authorize(&self, request: &ValidationRequest<'_>) -> Result<(), AuthorizerDenial> {
        for (attribute, accepted) in &self.required {
            let values = request.principal.attribute(attribute);
            let satisfied = if accepted.is_empty() {
                !values.is_empty()
            } else {
                values.iter().any(|v| accepted.contains(v))
            };
            if !satisfied {
                return Err(AuthorizerDenial::new(
                    "REQUIRED_ATTRIBUTES_MISSING",
                    format!("Principal lacks required attribute {attribute}"),
                ));
            }
        }
        Ok(())
    }
}
