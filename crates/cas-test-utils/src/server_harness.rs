//! Test server harness for HTTP tests
//!
//! Provides `TestCasServer` for spawning a real ticket server in tests.

use crate::fixtures::test_config;
use cas_service::clock::{Clock, SystemClock};
use cas_service::config::Config;
use cas_service::observability::metrics::init_metrics_recorder;
use cas_service::registry::{MemoryTicketStore, TicketStore};
use cas_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running ticket server bound to a random local port.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_login() -> Result<()> {
///     let server = TestCasServer::spawn().await?;
///     let tgt = server.login(TEST_USER, TEST_PASSWORD).await?;
///     assert!(tgt.starts_with("TGT-"));
///     Ok(())
/// }
/// ```
pub struct TestCasServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestCasServer {
    /// Spawn with [`test_config`], an in-memory store and the system clock
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(
            test_config(),
            Arc::new(MemoryTicketStore::new()),
            Arc::new(SystemClock),
        )
        .await
    }

    /// Spawn with an explicit config, store and clock
    pub async fn spawn_with(
        config: Config,
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, anyhow::Error> {
        let state = Arc::new(AppState::from_config(&config, store, clock));

        // The global recorder can only be installed once per process; later
        // servers get a standalone one
        let metrics_handle = init_metrics_recorder()
            .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle());

        let app = routes::build_routes(state.clone(), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            client: reqwest::Client::new(),
            handle,
        })
    }

    /// Base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The server's state, for reaching the registry directly
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `POST /v1/tickets`, returning the TGT id
    pub async fn login(&self, username: &str, password: &str) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/tickets", self.url()))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::CREATED,
            "Login failed with status {}",
            response.status()
        );
        let body: Value = response.json().await?;
        body["ticket"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Login response has no ticket"))
    }

    /// `POST /v1/tickets/{tgt}`, returning the ST id
    pub async fn grant_service_ticket(
        &self,
        tgt: &str,
        service: &str,
    ) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/tickets/{}", self.url(), tgt))
            .form(&[("service", service)])
            .send()
            .await?;
        anyhow::ensure!(
            response.status().is_success(),
            "Service ticket request failed with status {}",
            response.status()
        );
        let body: Value = response.json().await?;
        body["ticket"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Service ticket response has no ticket"))
    }

    /// `GET /p3/serviceValidate`, returning status and the JSON document
    pub async fn service_validate(
        &self,
        service: &str,
        ticket: &str,
        extra: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, Value), anyhow::Error> {
        self.get_document("/p3/serviceValidate", service, ticket, extra)
            .await
    }

    /// `GET /p3/proxyValidate`, returning status and the JSON document
    pub async fn proxy_validate(
        &self,
        service: &str,
        ticket: &str,
        extra: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, Value), anyhow::Error> {
        self.get_document("/p3/proxyValidate", service, ticket, extra)
            .await
    }

    async fn get_document(
        &self,
        path: &str,
        service: &str,
        ticket: &str,
        extra: &[(&str, &str)],
    ) -> Result<(reqwest::StatusCode, Value), anyhow::Error> {
        let mut query = vec![("service", service), ("ticket", ticket)];
        query.extend_from_slice(extra);
        let response = self
            .client
            .get(format!("{}{}", self.url(), path))
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }
}

impl Drop for TestCasServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
