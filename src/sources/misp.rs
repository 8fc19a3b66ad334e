use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client,
};
use serde_json::Value;

use crate::{
    config::MispConfig,
    core::{error::SyncError, types::json_scalar_to_string},
};

/// Destination for transformed events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Submit one `{"Event": {...}}` document; returns the new event id.
    async fn submit(&self, event: &Value) -> Result<String, SyncError>;
}

pub struct MispClient {
    client: Client,
    add_url: String,
}

impl MispClient {
    pub fn new(cfg: &MispConfig) -> Result<Self, SyncError> {
        let mut auth = HeaderValue::from_str(&cfg.auth_key)
            .map_err(|e| SyncError::Config(format!("misp.auth_key: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(super::user_agent())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(headers)
            .danger_accept_invalid_certs(!cfg.verify_tls)
            .build()
            .map_err(SyncError::from)?;

        Ok(Self {
            client,
            add_url: format!("{}/events/add", cfg.url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EventSink for MispClient {
    async fn submit(&self, event: &Value) -> Result<String, SyncError> {
        let resp = self.client.post(&self.add_url).json(event).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        parse_add_response(status.as_u16(), &body)
    }
}

/// Interpret an `events/add` reply. Error text keeps the full body so callers
/// can look for the duplicate marker in it.
pub fn parse_add_response(status: u16, body: &str) -> Result<String, SyncError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let has_errors = parsed
        .as_ref()
        .and_then(|v| v.get("errors"))
        .map(|e| !e.is_null())
        .unwrap_or(false);
    if has_errors || !(200..300).contains(&status) {
        return Err(SyncError::Platform(format!("status {status}: {body}")));
    }
    parsed
        .as_ref()
        .and_then(|v| v.pointer("/Event/id"))
        .and_then(json_scalar_to_string)
        .ok_or_else(|| SyncError::Platform(format!("response without Event.id: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_yields_id() {
        let id = parse_add_response(200, r#"{"Event":{"id":"42","info":"x"}}"#).unwrap();
        assert_eq!(id, "42");
        let id = parse_add_response(200, r#"{"Event":{"id":7}}"#).unwrap();
        assert_eq!(id, "7");
    }

    #[test]
    fn errors_field_is_failure_even_on_200() {
        let err = parse_add_response(200, r#"{"errors":{"Event":"Event already exists"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Event already exists"));
    }

    #[test]
    fn non_json_server_error_keeps_body() {
        let err = parse_add_response(502, "Bad Gateway").unwrap_err();
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad Gateway"));
    }
}
