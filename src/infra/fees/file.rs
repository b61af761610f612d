//! Fee schedules read from JSON files on disk.
//!
//! The default profile lives in `fees.json`; a named profile `x` lives in
//! `fees_x.json`. Files are re-read on every request so operators can edit
//! rates without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::{AppError, ConfigError, FeeSchedule, FeeScheduleProvider, ValidationError};

pub const DEFAULT_FEES_FILE: &str = "fees.json";

/// Fee schedule provider backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct FileFeeScheduleStore {
    dir: PathBuf,
}

impl FileFeeScheduleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `FEES_DIR`, defaulting to the working directory
    pub fn from_env() -> Self {
        let dir = std::env::var("FEES_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| ".".to_string());
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the file for a profile, rejecting names that would leave the directory.
    pub fn path_for(&self, profile: Option<&str>) -> Result<PathBuf, ValidationError> {
        let file_name = match profile.filter(|p| !p.is_empty()) {
            None => DEFAULT_FEES_FILE.to_string(),
            Some(name) => {
                if name.contains(['/', '\\']) || name.contains("..") {
                    return Err(ValidationError::InvalidField {
                        field: "name".to_string(),
                        message: "profile name must not contain path components".to_string(),
                    });
                }
                format!("fees_{}.json", name)
            }
        };
        Ok(self.dir.join(file_name))
    }
}

#[async_trait]
impl FeeScheduleProvider for FileFeeScheduleStore {
    #[instrument(skip(self))]
    async fn load(&self, profile: Option<&str>) -> Result<FeeSchedule, AppError> {
        let path = self.path_for(profile)?;
        debug!(path = %path.display(), "Loading fee schedule");

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ConfigError::Missing(format!("fee schedule {}", path.display()))
            } else {
                ConfigError::FeeSchedule(format!("{}: {}", path.display(), e))
            }
        })?;

        let schedule: FeeSchedule = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::FeeSchedule(format!("{}: {}", path.display(), e)))?;
        schedule.validate()?;

        Ok(schedule)
    }
}
