use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::core::{
    audit::AuditDump,
    error::SyncError,
    retry::Sleeper,
    time::{day_stamp, now_utc},
    types::{HistoryEntry, RunSummary},
    watermark::WatermarkStore,
};
use crate::pipeline::{
    fetcher::{check_required, ReportFetcher},
    history::HistoryWalker,
    registrar::{EventRegistrar, RegistrationOutcome},
    transform::IocTransformer,
};
use crate::sources::{anyrun::AnyrunClient, misp::EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Walking,
    ProcessingEntries,
    Finalizing,
    Done,
    AbortedFatal,
}

/// Per-entry result; none of these change the run's state.
#[derive(Debug)]
pub enum EntryOutcome {
    Imported(String),
    AlreadyExists,
    Failed(SyncError),
}

pub struct SyncRunner {
    walker: HistoryWalker,
    fetcher: ReportFetcher,
    transformer: IocTransformer,
    registrar: EventRegistrar,
    watermarks: WatermarkStore,
    state: RunState,
}

impl SyncRunner {
    pub fn new(
        walker: HistoryWalker,
        fetcher: ReportFetcher,
        transformer: IocTransformer,
        registrar: EventRegistrar,
        watermarks: WatermarkStore,
    ) -> Self {
        Self {
            walker,
            fetcher,
            transformer,
            registrar,
            watermarks,
            state: RunState::Idle,
        }
    }

    /// Wire every stage from configuration. The sink and sleeper are passed
    /// in so callers can swap the platform or the clock.
    pub fn from_config(
        cfg: &AppConfig,
        sink: Arc<dyn EventSink>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, SyncError> {
        let client = AnyrunClient::new(&cfg.anyrun)?;
        let audit = match &cfg.storage.audit_dir {
            Some(root) => AuditDump::new(root, &day_stamp(now_utc()))?,
            None => AuditDump::disabled(),
        };
        Ok(Self::new(
            HistoryWalker::new(client.clone(), cfg.anyrun.page_size, audit.clone()),
            ReportFetcher::new(client, audit),
            IocTransformer::new(),
            EventRegistrar::new(
                sink,
                cfg.retry.policy(),
                sleeper,
                cfg.misp.duplicate_marker.clone(),
            ),
            WatermarkStore::new(&cfg.storage.watermark_path),
        ))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// One sync pass. Only a failure before entry processing (history feed or
    /// unreadable watermark) returns `Err`; entry failures end up in the summary.
    pub async fn run(&mut self) -> Result<RunSummary, SyncError> {
        let mut summary = RunSummary::new(now_utc());

        self.transition(RunState::Walking);
        let entries = match self.walk().await {
            Ok(entries) => entries,
            Err(err) => {
                error!("history walk aborted: {}", err);
                self.transition(RunState::AbortedFatal);
                return Err(err);
            }
        };

        if entries.is_empty() {
            info!("no new reports since the last run");
            self.transition(RunState::Finalizing);
            summary.finished_at = Some(now_utc());
            self.transition(RunState::Done);
            return Ok(summary);
        }

        self.transition(RunState::ProcessingEntries);
        info!("{} new reports to import", entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let seq = idx + 1;
            let span = info_span!("entry", seq = seq as u64, report = entry.report_id());
            let outcome = self
                .process_entry(seq, entry, &mut summary)
                .instrument(span)
                .await;
            record_outcome(&mut summary, entry, outcome);
        }

        self.transition(RunState::Finalizing);
        // The feed is newest first, so the first walked entry is the cursor.
        let newest = entries[0].analysis_date.clone();
        match self.watermarks.save(&newest) {
            Ok(()) => summary.watermark_saved = true,
            Err(err) => {
                error!("could not save watermark {}: {}", newest, err);
                summary
                    .errors
                    .push(format!("watermark_error: {} / {}", newest, err));
            }
        }
        summary.newest_date = Some(newest);
        summary.finished_at = Some(now_utc());
        self.transition(RunState::Done);
        Ok(summary)
    }

    async fn walk(&self) -> Result<Vec<HistoryEntry>, SyncError> {
        let watermark = self.watermarks.load()?;
        if watermark.is_empty() {
            info!("no watermark; importing the full history");
        } else {
            info!("importing reports newer than {}", watermark.as_str());
        }
        self.walker.walk(&watermark).await
    }

    async fn process_entry(
        &self,
        seq: usize,
        entry: &HistoryEntry,
        summary: &mut RunSummary,
    ) -> EntryOutcome {
        info!("importing {}", entry.report_url());
        let bundle = self.fetcher.fetch(seq, entry).await;
        summary.files_downloaded += bundle.files_downloaded;

        if let Err(err) = check_required(&bundle, entry) {
            return EntryOutcome::Failed(err);
        }
        if bundle.summary_doc.is_none() {
            summary.warnings.push(format!(
                "summary missing: {} / {}",
                entry.analysis_date, entry.summary_url
            ));
        }

        let (event, warnings) = match self.transformer.transform(bundle) {
            Ok(done) => done,
            Err(err) => return EntryOutcome::Failed(err),
        };
        for w in &warnings {
            warn!("{}", w);
        }
        summary.warnings.extend(warnings);

        match self.registrar.register(event).await {
            RegistrationOutcome::Created(id) => EntryOutcome::Imported(id),
            RegistrationOutcome::AlreadyExists => EntryOutcome::AlreadyExists,
            RegistrationOutcome::Failed(err) => EntryOutcome::Failed(err),
        }
    }
}

fn record_outcome(summary: &mut RunSummary, entry: &HistoryEntry, outcome: EntryOutcome) {
    summary.entries_total += 1;
    match outcome {
        EntryOutcome::Imported(_) => summary.succeeded += 1,
        EntryOutcome::AlreadyExists => {
            summary.succeeded += 1;
            summary.duplicates += 1;
        }
        EntryOutcome::Failed(err) => {
            warn!("entry {} failed: {}", entry.report_id(), err);
            summary.failed += 1;
            if !err.is_expected_entry_failure() {
                summary.unexpected_errors += 1;
            }
            summary
                .errors
                .push(format!("{} ({}): {}", entry.report_id(), entry.analysis_date, err));
        }
    }
}
