use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{ClassRecord, HistoryFile, HistorySnapshot};

/// Number of snapshots kept in the history file.
pub const MAX_VERSIONS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// How a new dataset compares to the last persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetChange {
    /// Nothing was persisted before.
    Initial,
    Unchanged,
    CountChanged { from: usize, to: usize },
    /// Same number of classes; names of those that differ by position.
    ContentChanged { classes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub saved: bool,
    /// Snapshots held after the call.
    pub version: usize,
    pub change: DatasetChange,
}

/// Dataset served to API clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentData {
    pub last_updated: DateTime<Utc>,
    pub classes: Vec<ClassRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFormat {
    Versioned(HistoryFile),
    Legacy(Vec<ClassRecord>),
}

struct Loaded {
    history: Vec<HistorySnapshot>,
    current: Option<Vec<ClassRecord>>,
    legacy: bool,
}

/// Read-modify-write owner of the versioned class data file.
///
/// Assumes a single writer; callers that may refresh concurrently must
/// serialize calls to [`HistoryStore::reconcile`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_versions: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_versions: MAX_VERSIONS,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `records` as a new version unless they match the latest one
    /// once provenance fields are ignored.
    pub async fn reconcile(
        &self,
        records: Vec<ClassRecord>,
    ) -> Result<ReconcileOutcome, HistoryError> {
        self.reconcile_at(records, Utc::now()).await
    }

    pub async fn reconcile_at(
        &self,
        records: Vec<ClassRecord>,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, HistoryError> {
        let loaded = self.load_for_update(now).await;
        let mut history = loaded.history;

        let baseline = history
            .last()
            .map(|s| s.data.as_slice())
            .or(loaded.current.as_deref());

        let change = match baseline {
            None => {
                log::info!("Creating new file: {}", self.path.display());
                DatasetChange::Initial
            }
            Some(previous) => compare(previous, &records),
        };

        if change == DatasetChange::Unchanged {
            log::info!("No changes detected - existing file is up to date");
            if loaded.legacy {
                log::info!("Rewriting legacy file in versioned format");
                let current = loaded.current.unwrap_or_default();
                self.write(&HistoryFile {
                    last_updated: now,
                    total_versions: history.len(),
                    current_data: Some(current),
                    history: history.clone(),
                })
                .await?;
            }
            return Ok(ReconcileOutcome {
                saved: false,
                version: history.len(),
                change,
            });
        }

        match &change {
            DatasetChange::CountChanged { from, to } => {
                log::info!("Class count changed: {} → {}", from, to)
            }
            DatasetChange::ContentChanged { classes } => {
                for name in classes {
                    log::info!("Changes detected in class: {}", name);
                }
            }
            _ => {}
        }

        let count = records.len();
        history.push(HistorySnapshot::new(now, records.clone()));
        if history.len() > self.max_versions {
            let excess = history.len() - self.max_versions;
            history.drain(..excess);
        }

        let version = history.len();
        self.write(&HistoryFile {
            last_updated: now,
            total_versions: version,
            current_data: Some(records),
            history,
        })
        .await?;

        log::info!(
            "Saved {} classes to {} (version {})",
            count,
            self.path.display(),
            version
        );

        Ok(ReconcileOutcome {
            saved: true,
            version,
            change,
        })
    }

    /// The dataset currently published, or `None` before the first save.
    pub async fn current(&self) -> Result<Option<CurrentData>, HistoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: HistoryFile =
            serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let classes = match file.current_data {
            Some(data) => data,
            None => file
                .history
                .last()
                .map(|s| s.data.clone())
                .unwrap_or_default(),
        };

        Ok(Some(CurrentData {
            last_updated: file.last_updated,
            classes,
        }))
    }

    /// Loads the file for an update. Anything unreadable counts as an empty
    /// history so that fresh data is never lost to an old corrupt file.
    async fn load_for_update(&self, now: DateTime<Utc>) -> Loaded {
        let empty = Loaded {
            history: Vec::new(),
            current: None,
            legacy: false,
        };

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return empty,
            Err(e) => {
                log::warn!(
                    "Error reading existing file, will create new: {}",
                    e
                );
                return empty;
            }
        };
        log::info!("Found existing file: {}", self.path.display());

        match serde_json::from_str::<StoredFormat>(&content) {
            Ok(StoredFormat::Versioned(file)) => Loaded {
                history: file.history,
                current: file.current_data,
                legacy: false,
            },
            Ok(StoredFormat::Legacy(records)) => Loaded {
                history: vec![HistorySnapshot::new(now, records.clone())],
                current: Some(records),
                legacy: true,
            },
            Err(e) => {
                log::warn!("Error parsing existing file, will create new: {}", e);
                empty
            }
        }
    }

    async fn write(&self, file: &HistoryFile) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| HistoryError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| HistoryError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

fn compare(previous: &[ClassRecord], next: &[ClassRecord]) -> DatasetChange {
    let previous: Vec<ClassRecord> = previous.iter().map(|r| r.without_provenance()).collect();
    let next_normalized: Vec<ClassRecord> = next.iter().map(|r| r.without_provenance()).collect();

    if previous == next_normalized {
        return DatasetChange::Unchanged;
    }
    if previous.len() != next_normalized.len() {
        return DatasetChange::CountChanged {
            from: previous.len(),
            to: next_normalized.len(),
        };
    }

    let classes = previous
        .iter()
        .zip(&next_normalized)
        .filter(|(old, new)| old != new)
        .map(|(_, new)| {
            if new.class_name.is_empty() {
                "Unknown".to_string()
            } else {
                new.class_name.clone()
            }
        })
        .collect();

    DatasetChange::ContentChanged { classes }
}
