use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::{
    audit::AuditDump,
    error::SyncError,
    types::{HistoryEntry, Watermark},
};
use crate::sources::anyrun::AnyrunClient;

#[derive(Debug, Deserialize, Default)]
struct HistoryPage {
    #[serde(default)]
    data: HistoryData,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryData {
    #[serde(default)]
    tasks: Vec<HistoryTask>,
}

/// Link fields may be null for a broken task; that only fails its entry.
#[derive(Debug, Deserialize)]
struct HistoryTask {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    json: Option<String>,
    #[serde(default)]
    misp: Option<String>,
}

/// Pages through the analysis history, newest first.
pub struct HistoryWalker {
    client: AnyrunClient,
    page_size: u32,
    audit: AuditDump,
}

impl HistoryWalker {
    pub fn new(client: AnyrunClient, page_size: u32, audit: AuditDump) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
            audit,
        }
    }

    /// Every entry newer than `watermark`, in feed order. Stops at the first
    /// entry at or below the watermark, or at the first empty page. Any page
    /// failure aborts the walk: a partial history would open a gap.
    pub async fn walk(&self, watermark: &Watermark) -> Result<Vec<HistoryEntry>, SyncError> {
        let mut entries: Vec<HistoryEntry> = Vec::new();
        let mut skip = 0u32;

        loop {
            let tasks = self.fetch_page(skip).await?;
            info!("history page skip={} tasks={}", skip, tasks.len());

            if tasks.is_empty() {
                info!("reached the end of the history feed");
                return Ok(entries);
            }

            for task in tasks {
                let Some(date) = task.date.filter(|d| !d.is_empty()) else {
                    warn!("history skip={} has a task without a date; skipped", skip);
                    continue;
                };
                if !watermark.admits(&date) {
                    info!("entries from {} on were imported already; stopping", date);
                    return Ok(entries);
                }
                if let Some(prev) = entries.last() {
                    if date > prev.analysis_date {
                        warn!(
                            "history not in descending order: {} follows {}",
                            date, prev.analysis_date
                        );
                    }
                }
                entries.push(HistoryEntry::new(
                    task.json.unwrap_or_default(),
                    task.misp.unwrap_or_default(),
                    date,
                ));
            }

            skip += self.page_size;
        }
    }

    async fn fetch_page(&self, skip: u32) -> Result<Vec<HistoryTask>, SyncError> {
        let body = self
            .client
            .history_page(skip)
            .await
            .map_err(|e| SyncError::UpstreamUnavailable(e.to_string()))?;
        let raw: Value = serde_json::from_slice(&body).map_err(|e| {
            SyncError::UpstreamUnavailable(format!("history skip={skip} is not JSON: {e}"))
        })?;
        self.audit.history_page(skip, &raw);
        let page: HistoryPage = serde_json::from_value(raw).map_err(|e| {
            SyncError::UpstreamUnavailable(format!("history skip={skip} has an unexpected shape: {e}"))
        })?;
        Ok(page.data.tasks)
    }
}
