//! File Checkpoint Store
//!
//! Persists the last delivered sequence id as a one-key JSON document:
//!
//! ```json
//! {"last_id": "1700000000000-0"}
//! ```
//!
//! The file is created (with parent directories) on first open. Writes go to a
//! sibling temp file that is renamed over the checkpoint, so a reader never
//! observes a half-written document.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::application::ports::{CheckpointError, CheckpointPort};
use crate::domain::sequence::SequenceId;

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointDocument {
    last_id: Option<SequenceId>,
}

#[derive(Debug)]
struct CheckpointState {
    stored: Option<SequenceId>,
    last_write: Option<Instant>,
}

/// Checkpoint store backed by a JSON file.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    state: Mutex<CheckpointState>,
}

impl FileCheckpointStore {
    /// Open an existing checkpoint file or create an empty one.
    ///
    /// # Errors
    ///
    /// Fails if the path is not a regular file, is not readable and writable,
    /// or holds something other than a checkpoint document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();

        let stored = match fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => {
                return Err(CheckpointError::NotAFile(path.display().to_string()));
            }
            Ok(_) => read_document(&path)?.last_id,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent)?;
                }
                write_document(&path, &CheckpointDocument::default())?;
                tracing::info!(path = %path.display(), "Created checkpoint file");
                None
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), last_id = ?stored, "Opened checkpoint store");

        Ok(Self {
            path,
            state: Mutex::new(CheckpointState {
                stored,
                last_write: None,
            }),
        })
    }

    /// Path of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointPort for FileCheckpointStore {
    fn read(&self) -> Option<SequenceId> {
        self.state.lock().stored
    }

    fn write(&self, id: SequenceId, min_interval: Duration) -> Result<bool, CheckpointError> {
        let mut state = self.state.lock();

        if !min_interval.is_zero()
            && state
                .last_write
                .is_some_and(|at| at.elapsed() < min_interval)
        {
            return Ok(false);
        }

        if state.stored.is_some_and(|stored| id < stored) {
            return Ok(false);
        }

        if state.stored == Some(id) && state.last_write.is_some() {
            return Ok(false);
        }

        write_document(&self.path, &CheckpointDocument { last_id: Some(id) })?;
        state.stored = Some(id);
        state.last_write = Some(Instant::now());

        tracing::trace!(last_id = %id, "Checkpoint written");
        Ok(true)
    }
}

fn read_document(path: &Path) -> Result<CheckpointDocument, CheckpointError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| open_error(path, source))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    if contents.trim().is_empty() {
        return Ok(CheckpointDocument::default());
    }

    serde_json::from_str(&contents).map_err(|e| CheckpointError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn open_error(path: &Path, source: std::io::Error) -> CheckpointError {
    match source.kind() {
        ErrorKind::PermissionDenied => CheckpointError::Permission {
            path: path.display().to_string(),
            source,
        },
        _ => CheckpointError::Io(source),
    }
}

fn write_document(path: &Path, document: &CheckpointDocument) -> Result<(), CheckpointError> {
    let json = serde_json::to_string(document).map_err(|e| CheckpointError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
