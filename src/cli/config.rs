use anyhow::{Context, Result};

use crate::cli::flags::{Cli, Command};
use crate::config::{load_config, AppConfig};

/// Layer file settings, environment overrides and command-line flags.
pub fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = load_config(cli.config.as_deref())
        .context("loading configuration")?
        .apply_env_overrides();

    if let Some(path) = &cli.watermark_file {
        cfg.storage.watermark_path = path.clone();
    }
    if let Some(dir) = &cli.audit_dir {
        cfg.storage.audit_dir = Some(dir.clone());
    }
    if cli.no_audit {
        cfg.storage.audit_dir = None;
    }
    if let Command::Sync {
        summary: Some(path),
    } = &cli.command
    {
        cfg.storage.summary_path = Some(path.clone());
    }
    Ok(cfg)
}
