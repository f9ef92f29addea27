use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vigil_core::{Result, VigilError};

/// Process-wide halt flag backed by a marker file.
///
/// There is no in-memory state: every query re-reads the file, so an
/// operator creating or deleting the marker from another process takes
/// effect at the next check.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    marker: PathBuf,
}

impl KillSwitch {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.marker
    }

    pub fn is_active(&self) -> bool {
        self.marker.exists()
    }

    /// running → killed. Writes the reason and time to the marker.
    pub fn activate(&self, reason: &str) -> Result<()> {
        if let Some(parent) = self.marker.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.marker,
            format!("KILLED: {}\nTime: {}\n", reason, Utc::now().to_rfc3339()),
        )?;
        warn!(marker = ?self.marker, reason, "kill switch activated");
        Ok(())
    }

    /// killed → running. A missing marker is not an error.
    pub fn deactivate(&self) -> Result<()> {
        match std::fs::remove_file(&self.marker) {
            Ok(()) => {
                info!(marker = ?self.marker, "kill switch deactivated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Marker contents, if the switch is active.
    pub fn reason(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        match std::fs::read_to_string(&self.marker) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => Some("Unknown".to_string()),
        }
    }

    /// Fail with `Halted` when active.
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(VigilError::Halted(reason)),
            None => Ok(()),
        }
    }
}
