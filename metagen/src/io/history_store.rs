//! Append-only history of evaluated candidates.
//!
//! The whole collection lives in one pretty-printed JSON array that is
//! rewritten atomically on every append. Writers serialize on an exclusive
//! lock over a sidecar `<history>.lock` file, held across read, id
//! assignment, and write, so concurrent processes never hand out the same id.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::ids::next_agent_id;
use crate::core::record::AgentRecord;
use crate::io::atomic::write_atomic;

/// The history could not be written. The generator loop stops on this error.
#[derive(Debug)]
pub struct PersistenceError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persist history {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for PersistenceError {}

/// Handle to a history file. Cheap to create; holds no open files.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        with_suffix(&self.path, ".lock")
    }

    /// Current collection. Missing or unreadable storage reads as empty.
    pub fn load(&self) -> Vec<AgentRecord> {
        match read_records(&self.path) {
            Ok(Stored::Records(records)) => records,
            Ok(Stored::Missing) => Vec::new(),
            Ok(Stored::Corrupt(err)) => {
                warn!(path = %self.path.display(), %err, "history corrupt, treating as empty");
                Vec::new()
            }
            Err(err) => {
                warn!(path = %self.path.display(), err = %format!("{err:#}"), "history unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Assign the next id to `record`, persist, and return the stored record.
    ///
    /// Failures are reported as [`PersistenceError`].
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn append(&self, record: AgentRecord) -> Result<AgentRecord> {
        self.append_locked(record)
            .map_err(|err| {
                anyhow::Error::new(PersistenceError {
                    path: self.path.clone(),
                    message: format!("{err:#}"),
                })
            })
    }

    fn append_locked(&self, mut record: AgentRecord) -> Result<AgentRecord> {
        let lock = self.acquire_lock()?;

        // Only unparseable contents are moved aside; I/O errors propagate.
        let mut records = match read_records(&self.path)? {
            Stored::Records(records) => records,
            Stored::Missing => Vec::new(),
            Stored::Corrupt(err) => {
                let aside = self.move_aside()?;
                warn!(
                    %err,
                    moved_to = %aside.display(),
                    "history corrupt, starting a new collection"
                );
                Vec::new()
            }
        };

        record.agent_id = next_agent_id(&records);
        records.push(record.clone());

        let mut buf = serde_json::to_string_pretty(&records).context("serialize history")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)?;

        lock.unlock().context("release history lock")?;
        info!(agent_id = %record.agent_id, total = records.len(), "appended record");
        Ok(record)
    }

    fn acquire_lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open lock {}", lock_path.display()))?;
        debug!(lock = %lock_path.display(), "waiting for history lock");
        file.lock()
            .with_context(|| format!("lock {}", lock_path.display()))?;
        Ok(file)
    }

    fn move_aside(&self) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let aside = with_suffix(&self.path, &format!(".corrupt-{stamp}"));
        fs::rename(&self.path, &aside)
            .with_context(|| format!("move corrupt history to {}", aside.display()))?;
        Ok(aside)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// What the history path holds.
#[derive(Debug)]
enum Stored {
    Missing,
    Records(Vec<AgentRecord>),
    Corrupt(serde_json::Error),
}

/// `Err` only when the file exists but cannot be read.
fn read_records(path: &Path) -> Result<Stored> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Stored::Missing),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Ok(Stored::Records(Vec::new()));
    }
    Ok(match serde_json::from_slice(&contents) {
        Ok(records) => Stored::Records(records),
        Err(err) => Stored::Corrupt(err),
    })
}
