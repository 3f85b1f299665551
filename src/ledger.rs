use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::store;

/// Persisted form of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub completed_ligands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// In-memory completed set. Keeps first-seen order so saved files stay stable.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    order: Vec<String>,
    index: HashSet<String>,
}

impl Ledger {
    pub fn from_document(document: LedgerDocument) -> Self {
        let mut ledger = Self::default();
        for id in document.completed_ligands {
            ledger.mark_completed(&id);
        }
        ledger
    }

    pub fn to_document(&self) -> LedgerDocument {
        LedgerDocument {
            completed_ligands: self.order.clone(),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns `true` when `id` was not already present.
    pub fn mark_completed(&mut self, id: &str) -> bool {
        if !self.index.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Ledger bound to its state file. All access goes through one lock.
///
/// Every save rewrites the whole document through a temp file and rename. Identities are
/// only ever added; [`ProgressLedger::reset`] is the only way to drop them.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    state: Mutex<Ledger>,
}

impl ProgressLedger {
    /// Missing or unreadable state yields an empty ledger; corruption is only a warning.
    pub fn load(path: &Path) -> Self {
        let ledger = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<LedgerDocument>(&content) {
                Ok(document) => Ledger::from_document(document),
                Err(err) => {
                    warn!(path = %path.display(), "ignoring corrupt ledger: {err}");
                    Ledger::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(err) => {
                warn!(path = %path.display(), "could not read ledger: {err}");
                Ledger::default()
            }
        };
        debug!(path = %path.display(), completed = ledger.len(), "ledger loaded");
        Self {
            path: path.to_path_buf(),
            state: Mutex::new(ledger),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.lock().is_completed(id)
    }

    pub fn mark_completed(&self, id: &str) -> bool {
        self.lock().mark_completed(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes the full ledger. The lock is held across the write so saves never interleave.
    pub fn save(&self) -> Result<(), PipelineError> {
        let guard = self.lock();
        let content = serde_json::to_vec_pretty(&guard.to_document())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        store::write_bytes_atomic(&self.path, &content)
    }

    /// Save failures keep the run going on in-memory state; unsaved units are redone later.
    pub fn save_or_warn(&self) -> bool {
        match self.save() {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.path.display(), "ledger save failed: {err}");
                false
            }
        }
    }

    /// Deletes the state file. Returns whether there was one.
    pub fn reset(path: &Path) -> Result<bool, PipelineError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(PipelineError::Filesystem(format!(
                "remove {}: {err}",
                path.display()
            ))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
