use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};

use crate::data_capture::Direction;
use crate::error_handling::types::SessionError;

/// One run of the relay.
///
/// A session is identified by a human-readable, sortable timestamp generated
/// once at process start, and owns a directory of that name under the
/// destination folder. All capture logs of the run live in that directory.
/// Two runs starting within the same second against the same folder merge
/// their files, which is acceptable for a single-operator debugging tool.
pub struct Session {
    id: String,
    directory: PathBuf,
}

impl Session {
    /// Creates the session directory eagerly. Failure here is fatal: the
    /// relay refuses to start if it cannot persist captures.
    pub fn create(destination_folder: &Path) -> Result<Self, SessionError> {
        let id = Local::now().format("%Y-%m-%d %H.%M.%S").to_string();
        let directory = destination_folder.join(&id);

        fs::create_dir_all(&directory).map_err(|e| {
            error!(
                "Failed to create session directory {}: {}",
                directory.display(),
                e
            );
            SessionError::DirectoryCreationFailed(e)
        })?;

        info!("Session {} capturing to {}", id, directory.display());
        Ok(Self { id, directory })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the capture log for one direction of one connection:
    /// `<destination>/<session>/<connectionId>_{client|server}.txt`.
    pub fn log_path(&self, connection_id: u64, direction: Direction) -> PathBuf {
        self.directory
            .join(format!("{}_{}.txt", connection_id, direction.log_suffix()))
    }
}
