//! Persistent state backed by flat JSON files
//!
//! Settings, the known PE firm registry, the history log and one report
//! document per completed batch. Missing or corrupt state files fall back to
//! a default value, which is written back so the next read succeeds. Any
//! other read failure leaves the file alone: plain loads return the default,
//! read-modify-write cycles abort with `StoreError::Read`. Those cycles, on
//! the registry and on history, are serialized by a single advisory lock
//! held by the store.

use crate::company::{HistoryEntry, Report};
use crate::config::StorageConfig;
use crate::known_firms;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Report file {path} is corrupt: {source}")]
    CorruptReport {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Application settings editable from the web UI.
///
/// Unknown keys are preserved so a settings file written by a newer UI
/// round-trips unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Settings {
    /// The configured credential, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Storage seam used by the orchestrator and the web layer.
pub trait StateStore: Send + Sync {
    fn load_settings(&self) -> Settings;
    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    fn load_known_firms(&self) -> Vec<String>;
    fn save_known_firms(&self, firms: &[String]) -> Result<(), StoreError>;
    /// Union `additions` into the persisted registry under the store lock.
    /// Returns how many names were new.
    fn merge_known_firms(&self, additions: &[String]) -> Result<usize, StoreError>;

    fn load_history(&self) -> Vec<HistoryEntry>;
    /// Apply `update` to the history log under the store lock and persist it.
    fn update_history(&self, update: &mut dyn FnMut(&mut Vec<HistoryEntry>)) -> Result<(), StoreError>;

    /// Persist a report document and return its path.
    fn save_report(&self, report: &Report) -> Result<PathBuf, StoreError>;
    fn load_report(&self, id: Uuid) -> Result<Option<Report>, StoreError>;
    /// Remove a batch's report, its uploaded source file and its history
    /// entry. Returns false when nothing was known about the batch.
    fn remove_batch(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Run a store operation on the blocking thread pool.
pub async fn blocking<T, F>(store: &Arc<dyn StateStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn StateStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref())).await?
}

/// File-backed store rooted at the configured data directory
#[derive(Debug)]
pub struct JsonStore {
    settings_path: PathBuf,
    history_path: PathBuf,
    pe_firms_path: PathBuf,
    reports_dir: PathBuf,
    uploads_dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            settings_path: storage.settings_path(),
            history_path: storage.history_path(),
            pe_firms_path: storage.pe_firms_path(),
            reports_dir: storage.reports_path(),
            uploads_dir: storage.uploads_path(),
            lock: Mutex::new(()),
        }
    }

    /// Create the upload and report directories.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        for dir in [&self.uploads_dir, &self.reports_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: dir.clone(),
                source,
            })?;
        }
        info!("Ensured upload and report directories exist");
        Ok(())
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn report_path(&self, id: Uuid) -> PathBuf {
        self.reports_dir.join(format!("{}.json", id))
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (); a panic while holding it leaves nothing inconsistent
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for JsonStore {
    fn load_settings(&self) -> Settings {
        load_or_seed(&self.settings_path, Settings::default)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        write_json_atomic(&self.settings_path, settings, "settings")?;
        info!("Settings updated");
        Ok(())
    }

    fn load_known_firms(&self) -> Vec<String> {
        load_or_seed(&self.pe_firms_path, known_firms::default_firms)
    }

    fn save_known_firms(&self, firms: &[String]) -> Result<(), StoreError> {
        let _guard = self.guard();
        write_json_atomic(&self.pe_firms_path, firms, "PE firm list")?;
        info!("Private equity firm list updated ({} firms)", firms.len());
        Ok(())
    }

    fn merge_known_firms(&self, additions: &[String]) -> Result<usize, StoreError> {
        let _guard = self.guard();
        let mut firms = load_for_update(&self.pe_firms_path, known_firms::default_firms)?;
        let added = known_firms::union_into(&mut firms, additions);
        if added > 0 {
            write_json_atomic(&self.pe_firms_path, &firms, "PE firm list")?;
            info!("Added {} newly discovered PE firm(s) to the registry", added);
        }
        Ok(added)
    }

    fn load_history(&self) -> Vec<HistoryEntry> {
        load_or_seed(&self.history_path, Vec::new)
    }

    fn update_history(&self, update: &mut dyn FnMut(&mut Vec<HistoryEntry>)) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut history: Vec<HistoryEntry> = load_for_update(&self.history_path, Vec::new)?;
        update(&mut history);
        write_json_atomic(&self.history_path, &history, "history")?;
        debug!("History updated ({} entries)", history.len());
        Ok(())
    }

    fn save_report(&self, report: &Report) -> Result<PathBuf, StoreError> {
        let path = self.report_path(report.report_id);
        write_json_atomic(&path, report, "report")?;
        info!("Saved report '{}' to {}", report.report_name, path.display());
        Ok(path)
    }

    fn load_report(&self, id: Uuid) -> Result<Option<Report>, StoreError> {
        let path = self.report_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Report {} not found at {}", id, path.display());
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::CorruptReport { path, source })
    }

    fn remove_batch(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut history: Vec<HistoryEntry> = load_for_update(&self.history_path, Vec::new)?;
        let entry = history.iter().position(|e| e.id == id).map(|i| history.remove(i));

        let mut removed_anything = entry.is_some();
        let report_path = self.report_path(id);
        removed_anything |= remove_if_exists(&report_path)?;

        if let Some(source) = entry.as_ref().and_then(|e| e.source_file.as_ref()) {
            remove_if_exists(Path::new(source))?;
        }

        if entry.is_some() {
            write_json_atomic(&self.history_path, &history, "history")?;
        }
        if removed_anything {
            info!("Removed batch {}", id);
        }
        Ok(removed_anything)
    }
}

/// Read a JSON document. `Ok(None)` means the file is missing or cannot be
/// decoded and may be replaced with a default.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("File not found: {}. Initializing with default.", path.display());
            return Ok(None);
        }
        Err(source) => {
            error!("Failed to read {}: {}", path.display(), source);
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match serde_json::from_slice(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            error!("Error decoding JSON from {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Read a document for a read-modify-write cycle. Missing or corrupt files
/// are seeded with `default`; an unreadable file is an error.
fn load_for_update<T, F>(path: &Path, default: F) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    Ok(match read_json(path)? {
        Some(value) => value,
        None => seed(path, default()),
    })
}

/// Read a document, falling back to `default`. The file is only seeded when
/// it is missing or corrupt.
fn load_or_seed<T, F>(path: &Path, default: F) -> T
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => seed(path, default()),
        Err(_) => default(),
    }
}

fn seed<T: Serialize>(path: &Path, value: T) -> T {
    if let Err(e) = write_json_atomic(path, &value, "default value") {
        warn!("Could not seed {}: {}", path.display(), e);
    }
    value
}

/// Write JSON through a temporary file and rename it into place.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T, what: &'static str) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|source| StoreError::Serialize { what, source })?;

    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)
    };

    write().map_err(|source| {
        error!("Failed to write JSON to {}: {}", path.display(), source);
        StoreError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}
