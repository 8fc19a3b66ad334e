use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, StatusCode,
};

use crate::{config::AnyrunConfig, core::error::SyncError};

/// Raw response to an artifact download.
#[derive(Debug, Clone)]
pub struct Download {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Download {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Authenticated ANY.RUN API client (`Authorization: API-Key <key>`).
#[derive(Clone, Debug)]
pub struct AnyrunClient {
    client: Client,
    history_url: String,
}

impl AnyrunClient {
    pub fn new(cfg: &AnyrunConfig) -> Result<Self, SyncError> {
        let mut auth = HeaderValue::from_str(&format!("API-Key {}", cfg.api_key))
            .map_err(|e| SyncError::Config(format!("anyrun.api_key: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(super::user_agent())
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(SyncError::from)?;

        Ok(Self {
            client,
            history_url: cfg.history_url.clone(),
        })
    }

    /// Fetch one history page body. Non-2xx is an error.
    pub async fn history_page(&self, skip: u32) -> Result<Vec<u8>, SyncError> {
        let resp = self
            .client
            .get(&self.history_url)
            .query(&[("skip", skip)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        if !status.is_success() {
            return Err(SyncError::Http(format!(
                "history skip={} returned {}: {}",
                skip,
                status,
                String::from_utf8_lossy(&body)
            )));
        }
        Ok(body)
    }

    /// GET one artifact. Any received response is returned, whatever its status.
    pub async fn download(&self, url: &str) -> Result<Download, SyncError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();
        Ok(Download { status, body })
    }
}
