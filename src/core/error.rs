use std::io;

/// Every failure the sync can hit. Only `UpstreamUnavailable` ends a run
/// early; everything else is folded into the run summary per entry.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("history feed unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("artifact missing for {date}: {}", .urls.join(", "))]
    ArtifactMissing { date: String, urls: Vec<String> },
    #[error("registration failed after {attempts} attempts: {last_error}")]
    RegistrationFailed { attempts: u32, last_error: String },
    #[error("platform rejected event: {0}")]
    Platform(String),
    #[error("malformed report: {0}")]
    MalformedReport(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("http error: {0}")]
    Http(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::UpstreamUnavailable(_))
    }

    /// Errors the pipeline anticipates per entry. Anything else counts as
    /// unexpected and flags the run subject.
    pub fn is_expected_entry_failure(&self) -> bool {
        matches!(
            self,
            SyncError::ArtifactMissing { .. } | SyncError::RegistrationFailed { .. }
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_connect() {
            SyncError::Network(err.to_string())
        } else if err.is_status() {
            SyncError::Http(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_is_fatal() {
        assert!(SyncError::UpstreamUnavailable("down".into()).is_fatal());
        assert!(!SyncError::Timeout.is_fatal());
        assert!(!SyncError::RegistrationFailed {
            attempts: 5,
            last_error: "x".into()
        }
        .is_fatal());
    }

    #[test]
    fn artifact_missing_lists_urls() {
        let err = SyncError::ArtifactMissing {
            date: "2024-01-01T00:00:00.000Z".into(),
            urls: vec!["https://a/misp".into(), "https://a/ioc".into()],
        };
        let text = err.to_string();
        assert!(text.contains("https://a/misp, https://a/ioc"));
        assert!(err.is_expected_entry_failure());
    }
}
