use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::core::{
    audit::{ArtifactKind, AuditDump},
    error::SyncError,
    types::{HistoryEntry, ReportBundle},
};
use crate::sources::anyrun::AnyrunClient;

/// Downloads the three artifacts of one report.
pub struct ReportFetcher {
    client: AnyrunClient,
    audit: AuditDump,
}

impl ReportFetcher {
    pub fn new(client: AnyrunClient, audit: AuditDump) -> Self {
        Self { client, audit }
    }

    /// Never fails: each document that cannot be fetched or parsed is left
    /// out of the bundle. `seq` is the 1-based position in the walked list.
    pub async fn fetch(&self, seq: usize, entry: &HistoryEntry) -> ReportBundle {
        let (misp_doc, ioc_doc, summary_doc) = tokio::join!(
            self.fetch_doc::<Value>(ArtifactKind::Misp, seq, entry, &entry.misp_url),
            self.fetch_doc::<Vec<Value>>(ArtifactKind::Ioc, seq, entry, &entry.ioc_url),
            self.fetch_doc::<Value>(ArtifactKind::Summary, seq, entry, &entry.summary_url),
        );
        let files_downloaded = [misp_doc.is_some(), ioc_doc.is_some(), summary_doc.is_some()]
            .iter()
            .filter(|ok| **ok)
            .count() as u32;
        ReportBundle {
            misp_doc,
            ioc_doc,
            summary_doc,
            files_downloaded,
        }
    }

    async fn fetch_doc<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
        seq: usize,
        entry: &HistoryEntry,
        url: &str,
    ) -> Option<T> {
        match self.try_fetch(kind, seq, entry, url).await {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!("{} download failed for {}: {}", kind.label(), url, err);
                None
            }
        }
    }

    async fn try_fetch<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
        seq: usize,
        entry: &HistoryEntry,
        url: &str,
    ) -> Result<T, SyncError> {
        if url.is_empty() {
            return Err(SyncError::Http("history entry has no link".into()));
        }
        let download = self.client.download(url).await?;
        self.audit
            .artifact(kind, seq, &entry.formatted_date, &download.body);
        if !download.is_success() {
            return Err(SyncError::Http(format!("status {}", download.status)));
        }
        Ok(serde_json::from_slice(&download.body)?)
    }
}

/// Decide whether a bundle can be transformed. Both event skeleton and IOC
/// list are required; the summary is informational only.
pub fn check_required(bundle: &ReportBundle, entry: &HistoryEntry) -> Result<(), SyncError> {
    let shown = |url: &str| {
        if url.is_empty() {
            "(no link in history)".to_string()
        } else {
            url.to_string()
        }
    };
    let mut urls = Vec::new();
    if bundle.misp_doc.is_none() {
        urls.push(shown(&entry.misp_url));
    }
    if bundle.ioc_doc.is_none() {
        urls.push(shown(&entry.ioc_url));
    }
    if urls.is_empty() {
        Ok(())
    } else {
        Err(SyncError::ArtifactMissing {
            date: entry.analysis_date.clone(),
            urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> HistoryEntry {
        HistoryEntry::new(
            "https://h/report/r1/summary/json".into(),
            "https://h/report/r1/download/misp".into(),
            "2024-01-01T00:00:00.000Z".into(),
        )
    }

    #[test]
    fn both_documents_missing_lists_both_urls() {
        let err = check_required(&ReportBundle::default(), &entry()).unwrap_err();
        match err {
            SyncError::ArtifactMissing { urls, .. } => assert_eq!(
                urls,
                vec![
                    "https://h/report/r1/download/misp".to_string(),
                    "https://h/report/r1/ioc/json".to_string()
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn entry_without_links_reports_placeholder() {
        let bare = HistoryEntry::new(String::new(), String::new(), "2024-01-01T00:00:00.000Z".into());
        match check_required(&ReportBundle::default(), &bare).unwrap_err() {
            SyncError::ArtifactMissing { urls, .. } => {
                assert_eq!(urls, vec!["(no link in history)"; 2])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_summary_does_not_block() {
        let bundle = ReportBundle {
            misp_doc: Some(serde_json::json!({ "Event": {} })),
            ioc_doc: Some(vec![]),
            summary_doc: None,
            files_downloaded: 2,
        };
        assert!(check_required(&bundle, &entry()).is_ok());
    }
}
