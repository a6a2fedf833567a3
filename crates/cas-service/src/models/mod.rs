//! Protocol request and response models.
//!
//! Validation endpoints answer with a `serviceResponse` document whose single
//! key names the outcome; REST ticket endpoints use plain JSON bodies.

use crate::errors::CasError;
use crate::services::Assertion;
use common::types::Attributes;
use serde::{Deserialize, Serialize};

/// Form body of `POST /v1/tickets/{tgt}`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTicketRequest {
    pub service: String,
}

/// Query of `GET /p3/serviceValidate` and `GET /p3/proxyValidate`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateParams {
    pub service: Option<String>,
    pub ticket: Option<String>,
    #[serde(rename = "pgtUrl")]
    pub pgt_url: Option<String>,
    /// Any value other than `false` counts as set
    pub renew: Option<String>,
}

impl ValidateParams {
    pub fn renew(&self) -> bool {
        self.renew
            .as_deref()
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }
}

/// Query of `GET /proxy`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyParams {
    pub pgt: Option<String>,
    #[serde(rename = "targetService")]
    pub target_service: Option<String>,
}

/// Body of `POST /v1/tickets`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketGrantingTicketResponse {
    pub ticket: String,
}

/// Body of `POST /v1/tickets/{tgt}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTicketResponse {
    pub ticket: String,
    pub service: String,
}

/// Body of `DELETE /v1/tickets/{tgt}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Services that held tickets under the destroyed session
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse {
    #[serde(rename = "serviceResponse")]
    pub service_response: ServiceResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceResponseBody {
    #[serde(rename = "authenticationSuccess")]
    AuthenticationSuccess(AuthenticationSuccess),
    #[serde(rename = "authenticationFailure")]
    AuthenticationFailure(Failure),
    #[serde(rename = "proxySuccess")]
    ProxySuccess(ProxySuccess),
    #[serde(rename = "proxyFailure")]
    ProxyFailure(Failure),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSuccess {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_granting_ticket: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxies: Vec<String>,
    #[serde(default)]
    pub attributes: Attributes,
    pub is_from_new_login: bool,
    pub authentication_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySuccess {
    pub proxy_ticket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub code: String,
    pub description: String,
}

impl ServiceResponse {
    pub fn authentication_success(assertion: Assertion) -> Self {
        let Assertion {
            principal,
            from_new_login,
            authentication_date,
            proxies,
            proxy_granting_ticket,
            ..
        } = assertion;

        Self {
            service_response: ServiceResponseBody::AuthenticationSuccess(AuthenticationSuccess {
                user: principal.id,
                proxy_granting_ticket,
                proxies: proxies.into_iter().map(|p| p.id().to_string()).collect(),
                attributes: principal.attributes,
                is_from_new_login: from_new_login,
                authentication_date: authentication_date.to_rfc3339(),
            }),
        }
    }

    pub fn authentication_failure(error: &CasError) -> Self {
        Self {
            service_response: ServiceResponseBody::AuthenticationFailure(Failure::from(error)),
        }
    }

    pub fn proxy_success(proxy_ticket: String) -> Self {
        Self {
            service_response: ServiceResponseBody::ProxySuccess(ProxySuccess { proxy_ticket }),
        }
    }

    pub fn proxy_failure(error: &CasError) -> Self {
        Self {
            service_response: ServiceResponseBody::ProxyFailure(Failure::from(error)),
        }
    }
}

impl From<&CasError> for Failure {
    fn from(error: &CasError) -> Self {
        Self {
            code: error.protocol_code().to_string(),
            description: error.public_message(),
        }
    }
}

/// Body of `GET /health` and `GET /ready`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}
