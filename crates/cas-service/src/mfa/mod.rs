//! Multifactor provider resolution.
//!
//! Decides which second-factor provider, if any, a service request requires.
//! Requirements come from two sources: per-service rules (URL prefix ->
//! provider) and a principal attribute naming providers. When several apply,
//! the provider with the highest `order` wins.

use common::types::{Principal, Service};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A second-factor provider known to the server.
pub trait MultifactorProvider: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Rank; higher wins when several providers apply
    fn order(&self) -> i32;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMultifactorProvider {
    id: String,
    order: i32,
}

impl StaticMultifactorProvider {
    pub fn new(id: impl Into<String>, order: i32) -> Self {
        Self {
            id: id.into(),
            order,
        }
    }
}

impl MultifactorProvider for StaticMultifactorProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> i32 {
        self.order
    }
}

/// Service prefix that requires a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMfaRule {
    pub service_prefix: String,
    pub provider_id: String,
}

#[derive(Debug, Default)]
pub struct MultifactorProviderResolver {
    providers: HashMap<String, Arc<dyn MultifactorProvider>>,
    service_rules: Vec<ServiceMfaRule>,
    principal_attribute: Option<String>,
}

impl MultifactorProviderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn MultifactorProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn add_service_rule(&mut self, rule: ServiceMfaRule) {
        self.service_rules.push(rule);
    }

    /// Principal attribute whose values name required providers
    pub fn with_principal_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.principal_attribute = Some(attribute.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.service_rules.is_empty() && self.principal_attribute.is_none()
    }

    /// The provider required for `service` and `principal`, if any.
    ///
    /// Rules naming unregistered providers are ignored.
    pub fn resolve(
        &self,
        service: &Service,
        principal: &Principal,
    ) -> Option<Arc<dyn MultifactorProvider>> {
        let from_service = self
            .service_rules
            .iter()
            .filter(|rule| service.is_under(&rule.service_prefix))
            .map(|rule| rule.provider_id.as_str());

        let from_principal = self
            .principal_attribute
            .as_deref()
            .map(|attr| principal.attribute(attr))
            .unwrap_or_default()
            .iter()
            .map(String::as_str);

        from_service
            .chain(from_principal)
            .filter_map(|id| self.providers.get(id))
            .max_by_key(|provider| provider.order())
            .cloned()
    }
}
