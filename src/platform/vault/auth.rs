use reqwest::Client;
use serde::Deserialize;

use crate::platform::types::{CallError, CallResult};

use super::mapper;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Exchange a username and password for a vault session id.
pub async fn create_session(
    client: &Client,
    base_url: &str,
    api_version: &str,
    username: &str,
    password: &str,
) -> CallResult<String> {
    let url = format!("{base_url}/api/{api_version}/auth");

    let response = client
        .post(&url)
        .header("accept", "application/json")
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .map_err(|e| CallError::operation_failed(format!("Authentication request failed: {e}")))?;

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| CallError::operation_failed(format!("Invalid authentication response: {e}")))?;

    if let Some(err) = mapper::map_failure(&body) {
        return Err(err);
    }

    let parsed: AuthResponse = serde_json::from_value(body)
        .map_err(|e| CallError::operation_failed(format!("Invalid authentication response: {e}")))?;

    parsed
        .session_id
        .ok_or_else(|| CallError::operation_failed("No sessionId in authentication response"))
}
