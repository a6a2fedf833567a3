//! Shared identity types.
//!
//! A [`Principal`] is the authenticated subject carried by a ticket-granting
//! ticket; a [`Service`] is the relying party a ticket is issued for.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Multi-valued attribute map released with a principal.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// The authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (typically the username)
    pub id: String,
    /// Attributes resolved for the principal
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    /// Create a principal with no attributes
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Add an attribute value, appending to any existing values
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Values of an attribute, empty if the attribute is not released
    #[must_use]
    pub fn attribute(&self, name: &str) -> &[String] {
        self.attributes.get(name).map_or(&[], Vec::as_slice)
    }
}

/// A relying-party service, identified by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Service {
    id: String,
}

impl Service {
    /// Create a service from its identifier (URL).
    ///
    /// A trailing `/` is not significant: `https://app/` and `https://app`
    /// identify the same service.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let mut id = id.into();
        while id.len() > 1 && id.ends_with('/') {
            id.pop();
        }
        Self { id }
    }

    /// Service identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a service presented at validation time is the one a ticket was
    /// issued for.
    #[must_use]
    pub fn matches(&self, other: &Service) -> bool {
        self.id == other.id
    }

    /// Whether this service falls under a registered URL prefix.
    ///
    /// The prefix must end on a URL boundary: `https://app` covers
    /// `https://app/x` and `https://app?x` but not `https://app.evil.net`.
    #[must_use]
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return false;
        }
        self.id
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
