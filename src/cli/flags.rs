use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "anyrun-misp-sync",
    version,
    about = "Import new ANY.RUN analyses into MISP"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (TOML). Default: config/anyrun-misp-sync.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override storage.watermark_path
    #[arg(long, global = true)]
    pub watermark_file: Option<PathBuf>,

    /// Override storage.audit_dir
    #[arg(long, global = true)]
    pub audit_dir: Option<PathBuf>,

    /// Do not write audit dumps
    #[arg(long, global = true)]
    pub no_audit: bool,

    /// Increase verbosity (info, debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log file path
    #[arg(long, default_value = "data/anyrun-misp-sync.log", global = true)]
    pub log_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import every report newer than the watermark
    Sync {
        /// Also write the run summary as JSON to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Inspect or change the import watermark
    Watermark {
        #[command(subcommand)]
        action: WatermarkAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum WatermarkAction {
    /// Print the stored watermark
    Show,
    /// Store a new watermark (an analysis date from the history feed)
    Set { date: String },
    /// Remove the watermark so the next sync imports the full history
    Clear,
}
