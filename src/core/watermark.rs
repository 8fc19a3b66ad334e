use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::core::{error::SyncError, types::Watermark};

/// Single-line file holding the `analysisDate` of the newest imported report.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or blank file means "import everything".
    pub fn load(&self) -> Result<Watermark, SyncError> {
        if !self.path.exists() {
            return Ok(Watermark::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Watermark::new(raw.trim()))
    }

    /// Replace the stored cursor via temp file + rename.
    pub fn save(&self, date: &str) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, date.trim())?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!("watermark {} written to {}", date, self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SyncError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn tmp_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("watermark");
    dst.with_file_name(format!(".{name}.tmp"))
}
