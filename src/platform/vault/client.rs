use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::VaultConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::ApiTransport;

use super::auth::create_session;
use super::mapper;

const INVALID_SESSION: &str = "INVALID_SESSION_ID";

/// `reqwest`-backed transport to a vault's REST API.
pub struct VaultHttpClient {
    config: VaultConfig,
    client: Client,
    /// Cached session id, refreshed once when the vault reports it invalid.
    session: RwLock<Option<String>>,
}

impl VaultHttpClient {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        if config.session_id.is_none() && (config.username.is_none() || config.password.is_none()) {
            return Err(AppError::Config(
                "vault needs either session_id or username and password".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            client,
            session: RwLock::new(config.session_id.clone()),
        })
    }

    async fn session_id(&self) -> CallResult<String> {
        {
            let cached = self.session.read().await;
            if let Some(id) = cached.as_ref() {
                return Ok(id.clone());
            }
        }

        let (Some(username), Some(password)) = (&self.config.username, &self.config.password) else {
            return Err(CallError::operation_failed(
                "Session expired and no credentials are configured",
            ));
        };

        tracing::debug!(base_url = %self.config.base_url, "Creating vault session");
        let id = create_session(
            &self.client,
            &self.config.base_url,
            &self.config.api_version,
            username,
            password,
        )
        .await?;

        let mut cached = self.session.write().await;
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn send(&self, method: HttpMethod, path: &str, params: &Params, session: &str) -> CallResult<Value> {
        let url = format!("{}{path}", self.config.base_url);

        let request = match method {
            HttpMethod::Get => self.client.get(&url).query(params),
            HttpMethod::Post => self.client.post(&url).form(params),
            HttpMethod::Put => self.client.put(&url).form(params),
        };

        let response = request
            .header("authorization", session)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| CallError::operation_failed(format!("{method} {path} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::operation_failed(format!("{method} {path} failed: {e}")))?;

        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(CallError::operation_failed(format!(
                    "{method} {path} returned {status}: {text}"
                )))
            }
            Err(e) => {
                return Err(CallError::operation_failed(format!(
                    "{method} {path} returned invalid JSON: {e}"
                )))
            }
        };

        if let Some(err) = mapper::map_failure(&body) {
            return Err(err);
        }
        if !status.is_success() {
            return Err(CallError::operation_failed(format!(
                "{method} {path} returned {status}: {text}"
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl ApiTransport for VaultHttpClient {
    async fn call(&self, method: HttpMethod, path: &str, params: &Params) -> CallResult<Value> {
        let session = self.session_id().await?;
        tracing::trace!(%method, path, "Vault API call");

        match self.send(method, path, params, &session).await {
            Err(e) if e.kind == ErrorKind::Other(INVALID_SESSION.to_string())
                && self.config.username.is_some() =>
            {
                tracing::info!("Vault session expired, re-authenticating");
                *self.session.write().await = None;
                let session = self.session_id().await?;
                self.send(method, path, params, &session).await
            }
            other => other,
        }
    }
}
