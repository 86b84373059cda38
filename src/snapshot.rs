//! Generational backups for salonbook.
//!
//! The snapshot manager produces point-in-time copies of the three persisted
//! stores, retains a bounded number of generations, and can restore one.
//! Each snapshot is a bundle written under a key that embeds its creation
//! time in milliseconds, so key order is creation order. An index of
//! snapshot metadata is maintained under its own key; routine listings read
//! the index instead of scanning the key space, and the index is rebuilt
//! from a prefix scan if it is ever missing or unreadable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::ledger::{LedgerStats, STORE_CUSTOMERS, STORE_DESIGNS, STORE_TREATMENTS};
use crate::model::IdGenerator;

/// Prefix of every snapshot key. The remainder is a zero-padded
/// millisecond timestamp, keeping lexicographic key order equal to
/// creation order.
pub const BACKUP_PREFIX: &str = "salon_backup_";

/// Key holding the serialized snapshot index. Deliberately outside the
/// bundle prefix so prefix scans never mistake the index for a bundle.
pub const BACKUP_INDEX_KEY: &str = "salon_index";

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotTrigger {
    /// Taken at process start.
    Startup,
    /// Taken at process teardown.
    Shutdown,
    /// Taken by the fixed-interval timer.
    Interval,
    /// Taken after a (debounced) data mutation.
    DataChanged,
    /// Requested explicitly by the user.
    Manual,
    /// Safety copy taken immediately before a restore.
    PreRestore,
}

impl std::fmt::Display for SnapshotTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Startup => write!(f, "startup"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Interval => write!(f, "interval"),
            Self::DataChanged => write!(f, "data-changed"),
            Self::Manual => write!(f, "manual"),
            Self::PreRestore => write!(f, "pre-restore"),
        }
    }
}

/// Counts recorded alongside each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Number of customer records at snapshot time.
    pub customer_count: usize,
    /// Number of treatment records at snapshot time.
    pub treatment_count: usize,
}

impl From<LedgerStats> for SnapshotStats {
    fn from(stats: LedgerStats) -> Self {
        Self {
            customer_count: stats.customer_count,
            treatment_count: stats.treatment_count,
        }
    }
}

/// The raw store blobs captured by a snapshot. A `None` field means the
/// store key was absent when the snapshot was taken; restoring such a
/// bundle leaves the corresponding store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Serialized customer collection, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customers: Option<String>,
    /// Serialized treatment collection, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatments: Option<String>,
    /// Serialized gallery collection, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery: Option<String>,
}

/// A full snapshot as persisted under its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBundle {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// What caused it.
    pub trigger: SnapshotTrigger,
    /// The captured store blobs.
    pub data: SnapshotData,
    /// Live counts at snapshot time.
    pub stats: SnapshotStats,
}

/// Index entry describing one snapshot without its data payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// The store key the bundle lives under.
    pub key: String,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// What caused it.
    pub trigger: SnapshotTrigger,
    /// Live counts at snapshot time.
    pub stats: SnapshotStats,
}

/// Outcome of a successful restore. In-memory state must be reloaded from
/// the persisted stores; the live collections are not patched in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Key of the restored snapshot.
    pub key: String,
    /// When the restored snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Store keys that were overwritten.
    pub restored_stores: Vec<&'static str>,
    /// Key of the pre-restore safety snapshot.
    pub safety_key: String,
}

/// Manages snapshot creation, retention, and restore.
#[derive(Debug)]
pub struct SnapshotManager {
    max_generations: usize,
    clock: IdGenerator,
}

impl SnapshotManager {
    /// Create a manager with the given backup configuration.
    #[must_use]
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            max_generations: config.max_generations,
            clock: IdGenerator::new(),
        }
    }

    /// The retention cap.
    #[must_use]
    pub fn max_generations(&self) -> usize {
        self.max_generations
    }

    /// Take a snapshot of the current persisted stores.
    ///
    /// Reads the three store blobs (each may be absent), wraps them with a
    /// timestamp, the trigger, and the given counts, writes the bundle
    /// under a fresh timestamped key, then prunes old generations.
    ///
    /// # Errors
    ///
    /// Returns an error on any store or serialization fault; nothing is
    /// partially written in that case. Automatic callers catch and log the
    /// error and simply wait for the next trigger.
    pub fn create(
        &self,
        kv: &KvStore,
        trigger: SnapshotTrigger,
        stats: SnapshotStats,
    ) -> Result<SnapshotMeta> {
        let bundle = SnapshotBundle {
            timestamp: Utc::now(),
            trigger,
            data: SnapshotData {
                customers: kv.get(STORE_CUSTOMERS)?,
                treatments: kv.get(STORE_TREATMENTS)?,
                gallery: kv.get(STORE_DESIGNS)?,
            },
            stats,
        };

        // Load the index before the bundle lands; a rebuild here must not
        // see the new bundle or its entry would be appended twice.
        let mut index = self.load_index(kv)?;

        let key = format!("{BACKUP_PREFIX}{:013}", self.clock.next_millis());
        let blob = serde_json::to_string(&bundle)?;
        kv.set(&key, &blob)?;

        let meta = SnapshotMeta {
            key: key.clone(),
            timestamp: bundle.timestamp,
            trigger,
            stats,
        };
        index.push(meta.clone());
        Self::save_index(kv, &index)?;

        let pruned = self.prune(kv)?;
        info!(
            "Snapshot {key} created ({trigger}, {} customers, {pruned} pruned)",
            stats.customer_count
        );
        Ok(meta)
    }

    /// List all snapshots, oldest first.
    ///
    /// Index entries whose bundle has gone missing are skipped and logged,
    /// never fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self, kv: &KvStore) -> Result<Vec<SnapshotMeta>> {
        let index = self.load_index(kv)?;
        let mut listed = Vec::with_capacity(index.len());
        for meta in index {
            if kv.contains(&meta.key)? {
                listed.push(meta);
            } else {
                warn!("Snapshot {} listed in index but missing; skipped", meta.key);
            }
        }
        Ok(listed)
    }

    /// The most recently created snapshot, or `None` when there are none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn latest(&self, kv: &KvStore) -> Result<Option<SnapshotMeta>> {
        Ok(self.list(kv)?.into_iter().last())
    }

    /// Load the bundle stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMissing`] if no snapshot lives under the
    /// key, and [`Error::SnapshotCorrupt`] if the bundle cannot be parsed.
    pub fn get(&self, kv: &KvStore, key: &str) -> Result<SnapshotBundle> {
        let blob = kv.get(key)?.ok_or_else(|| Error::snapshot_missing(key))?;
        serde_json::from_str(&blob).map_err(|source| Error::SnapshotCorrupt {
            key: key.to_string(),
            source,
        })
    }

    /// Delete snapshots beyond the retention cap, oldest first.
    ///
    /// Returns the number of generations removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn prune(&self, kv: &KvStore) -> Result<usize> {
        let mut index = self.load_index(kv)?;
        if index.len() <= self.max_generations {
            return Ok(0);
        }

        let excess = index.len() - self.max_generations;
        let removed: Vec<SnapshotMeta> = index.drain(..excess).collect();
        for meta in &removed {
            kv.remove(&meta.key)?;
            debug!("Pruned snapshot {}", meta.key);
        }
        Self::save_index(kv, &index)?;
        Ok(removed.len())
    }

    /// Restore the persisted stores from the snapshot under `key`.
    ///
    /// A missing key aborts before anything is mutated (no safety snapshot
    /// is taken). Otherwise a `pre-restore` safety snapshot of the current
    /// state is created first, then every store present in the bundle is
    /// overwritten; stores absent from the bundle are left untouched. The
    /// caller must reload in-memory state from the stores afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is missing or corrupt, if the
    /// safety snapshot cannot be written, or if overwriting a store fails.
    pub fn restore(
        &self,
        kv: &KvStore,
        key: &str,
        current_stats: SnapshotStats,
    ) -> Result<RestoreReport> {
        // Look up before mutating anything; a missing snapshot must have
        // no side effects.
        let bundle = self.get(kv, key)?;

        let safety = self.create(kv, SnapshotTrigger::PreRestore, current_stats)?;

        let mut restored_stores = Vec::new();
        if let Some(blob) = &bundle.data.customers {
            kv.set(STORE_CUSTOMERS, blob)?;
            restored_stores.push(STORE_CUSTOMERS);
        }
        if let Some(blob) = &bundle.data.treatments {
            kv.set(STORE_TREATMENTS, blob)?;
            restored_stores.push(STORE_TREATMENTS);
        }
        if let Some(blob) = &bundle.data.gallery {
            kv.set(STORE_DESIGNS, blob)?;
            restored_stores.push(STORE_DESIGNS);
        }

        info!(
            "Restored snapshot {key} ({} stores); reload required",
            restored_stores.len()
        );
        Ok(RestoreReport {
            key: key.to_string(),
            timestamp: bundle.timestamp,
            restored_stores,
            safety_key: safety.key,
        })
    }

    /// Delete one snapshot generation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMissing`] if no snapshot lives under the
    /// key, or an error if the store cannot be written.
    pub fn delete(&self, kv: &KvStore, key: &str) -> Result<()> {
        if !kv.remove(key)? {
            return Err(Error::snapshot_missing(key));
        }
        let mut index = self.load_index(kv)?;
        index.retain(|meta| meta.key != key);
        Self::save_index(kv, &index)?;
        Ok(())
    }

    /// Load the snapshot index, rebuilding it from a prefix scan when it is
    /// missing or unreadable. The returned entries are ordered by key.
    fn load_index(&self, kv: &KvStore) -> Result<Vec<SnapshotMeta>> {
        let mut index = match kv.get(BACKUP_INDEX_KEY)? {
            Some(blob) => match serde_json::from_str::<Vec<SnapshotMeta>>(&blob) {
                Ok(index) => index,
                Err(err) => {
                    warn!("Snapshot index unreadable ({err}); rebuilding");
                    self.rebuild_index(kv)?
                }
            },
            None => {
                // Fresh store, or the index was lost; rebuild from the keys
                let rebuilt = self.rebuild_index(kv)?;
                if !rebuilt.is_empty() {
                    Self::save_index(kv, &rebuilt)?;
                }
                rebuilt
            }
        };
        index.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(index)
    }

    /// Rebuild index entries by scanning every key under the backup prefix.
    /// Corrupt bundles are skipped and logged.
    fn rebuild_index(&self, kv: &KvStore) -> Result<Vec<SnapshotMeta>> {
        let mut index = Vec::new();
        for key in kv.keys_with_prefix(BACKUP_PREFIX)? {
            match self.get(kv, &key) {
                Ok(bundle) => index.push(SnapshotMeta {
                    key,
                    timestamp: bundle.timestamp,
                    trigger: bundle.trigger,
                    stats: bundle.stats,
                }),
                Err(err) => warn!("Skipping unreadable snapshot {key}: {err}"),
            }
        }
        Ok(index)
    }

    fn save_index(kv: &KvStore, index: &[SnapshotMeta]) -> Result<()> {
        let blob = serde_json::to_string(index)?;
        kv.set(BACKUP_INDEX_KEY, &blob)
    }
}
