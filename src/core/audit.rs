use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::core::error::SyncError;

/// Artifact kinds persisted per report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Misp,
    Ioc,
    Summary,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Misp => "misp",
            ArtifactKind::Ioc => "ioc",
            ArtifactKind::Summary => "summary",
        }
    }
}

/// Write-only dump directory. Dumps never feed back into the pipeline, so a
/// failed write is logged and otherwise ignored.
#[derive(Debug, Clone, Default)]
pub struct AuditDump {
    dir: Option<PathBuf>,
}

impl AuditDump {
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Dumps go to `<root>/<day>`; the directory is created up front.
    pub fn new(root: &Path, day: &str) -> Result<Self, SyncError> {
        let dir = root.join(day);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir: Some(dir) })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn history_page(&self, skip: u32, page: &Value) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("history_skip_{skip}.json"));
        match serde_json::to_vec_pretty(page) {
            Ok(bytes) => write_quietly(&path, &bytes),
            Err(err) => tracing::warn!("could not encode history page {}: {}", skip, err),
        }
    }

    pub fn artifact(&self, kind: ArtifactKind, seq: usize, formatted_date: &str, body: &[u8]) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("{}_{}_{}.json", kind.label(), seq, formatted_date));
        write_quietly(&path, body);
    }
}

fn write_quietly(path: &Path, bytes: &[u8]) {
    if let Err(err) = fs::write(path, bytes) {
        tracing::warn!("audit dump {} failed: {}", path.display(), err);
    }
}
