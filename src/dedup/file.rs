// src/dedup/file.rs
//! JSON file store. The file is its own artifact, independent of the configuration,
//! so it can be backed up or restored on its own.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{DedupStore, Fingerprint, SeenLedger, SeenRecord};
use crate::error::StoreError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    records: Vec<SeenRecord>,
}

/// Dedup store persisted as one JSON document.
///
/// Every mutation rewrites the whole file through a temp file + rename; the in-memory
/// view only changes once that write succeeded.
#[derive(Debug)]
pub struct FileDedupStore {
    path: PathBuf,
    ledger: SeenLedger,
}

impl FileDedupStore {
    /// Open the store at `path`. A missing file is an empty store; an unreadable or
    /// undecodable file is an error.
    pub fn open(path: impl Into<PathBuf>, window: Duration) -> Result<Self, StoreError> {
        let path = path.into();
        let ledger = match fs::read_to_string(&path) {
            Ok(s) if s.trim().is_empty() => SeenLedger::new(window),
            Ok(s) => {
                let state: StateFile =
                    serde_json::from_str(&s).map_err(|source| StoreError::Decode {
                        path: path.display().to_string(),
                        source,
                    })?;
                SeenLedger::from_records(window, state.records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SeenLedger::new(window),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        tracing::debug!(path = %path.display(), records = ledger.len(), "dedup store opened");
        Ok(Self { path, ledger })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seen_at(&self, fp: &Fingerprint) -> Option<DateTime<Utc>> {
        self.ledger.seen_at(fp)
    }

    /// Persist `next` and adopt it only on success.
    fn commit(&mut self, next: SeenLedger) -> Result<(), StoreError> {
        write_atomically(&self.path, &next).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        self.ledger = next;
        Ok(())
    }
}

impl DedupStore for FileDedupStore {
    fn window(&self) -> Duration {
        self.ledger.window()
    }

    fn is_seen(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool {
        self.ledger.is_seen(fp, now)
    }

    fn mark_seen(
        &mut self,
        fps: &BTreeSet<Fingerprint>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if fps.is_empty() {
            return Ok(());
        }
        let mut next = self.ledger.clone();
        next.mark(fps, now);
        self.commit(next)
    }

    fn compact(&mut self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut next = self.ledger.clone();
        let removed = next.compact(now);
        if removed > 0 {
            self.commit(next)?;
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.ledger.len()
    }
}

fn write_atomically(path: &Path, ledger: &SeenLedger) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let state = StateFile {
        version: FORMAT_VERSION,
        records: ledger.records(),
    };
    let json = serde_json::to_vec_pretty(&state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(&json)?;
    f.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}
