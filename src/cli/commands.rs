use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::cli::config::resolve_config;
use crate::cli::flags::{Cli, Command, WatermarkAction};
use crate::config::AppConfig;
use crate::core::{
    notify::{notify_all, LogNotifier, Notifier, WebhookNotifier},
    retry::TokioSleeper,
    watermark::WatermarkStore,
};
use crate::pipeline::reporter::{
    failure_lines, subject, summary_flagged, summary_lines, write_summary_json,
};
use crate::pipeline::runner::SyncRunner;
use crate::sources::misp::{EventSink, MispClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    EntryFailures,
    Aborted,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Clean => 0,
            RunStatus::Aborted => 1,
            RunStatus::EntryFailures => 2,
        }
    }
}

pub async fn run(cli: Cli) -> Result<RunStatus> {
    let cfg = resolve_config(&cli)?;
    match &cli.command {
        Command::Sync { .. } => {
            cfg.validate()?;
            run_sync(&cfg).await
        }
        Command::Watermark { action } => {
            run_watermark(&cfg, action)?;
            Ok(RunStatus::Clean)
        }
    }
}

pub async fn run_sync(cfg: &AppConfig) -> Result<RunStatus> {
    let sink: Arc<dyn EventSink> =
        Arc::new(MispClient::new(&cfg.misp).context("building MISP client")?);
    let mut runner = SyncRunner::from_config(cfg, sink, Arc::new(TokioSleeper))
        .context("building sync pipeline")?;
    let notifiers = build_notifiers(cfg)?;

    match runner.run().await {
        Ok(summary) => {
            if let Some(path) = &cfg.storage.summary_path {
                if let Err(err) = write_summary_json(&summary, path) {
                    tracing::warn!("could not write summary {}: {}", path.display(), err);
                }
            }
            let subject = subject(&cfg.notify, summary_flagged(&summary));
            notify_all(&notifiers, &subject, &summary_lines(&summary)).await;
            if summary.has_failures() {
                Ok(RunStatus::EntryFailures)
            } else {
                Ok(RunStatus::Clean)
            }
        }
        Err(err) => {
            let subject = subject(&cfg.notify, true);
            notify_all(&notifiers, &subject, &failure_lines(&err)).await;
            Ok(RunStatus::Aborted)
        }
    }
}

fn build_notifiers(cfg: &AppConfig) -> Result<Vec<Box<dyn Notifier>>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(url) = &cfg.notify.webhook_url {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.misp.timeout_ms))
            .build()
            .context("building webhook client")?;
        notifiers.push(Box::new(WebhookNotifier::new(client, url.clone())));
    }
    Ok(notifiers)
}

pub fn run_watermark(cfg: &AppConfig, action: &WatermarkAction) -> Result<()> {
    let store = WatermarkStore::new(&cfg.storage.watermark_path);
    match action {
        WatermarkAction::Show => {
            let wm = store.load()?;
            if wm.is_empty() {
                println!("(none) next sync imports the full history");
            } else {
                println!("{}", wm.as_str());
            }
        }
        WatermarkAction::Set { date } => {
            let date = date.trim();
            if date.is_empty() {
                return Err(anyhow!("watermark date must not be empty"));
            }
            store.save(date)?;
            tracing::info!("watermark set to {} in {}", date, store.path().display());
        }
        WatermarkAction::Clear => {
            store.clear()?;
            tracing::info!("watermark cleared at {}", store.path().display());
        }
    }
    Ok(())
}
