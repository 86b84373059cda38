//! `salonbook` - Nail salon customer records with generational backups
//!
//! This library keeps customer, treatment, and design gallery records in a
//! local key-value store and protects them with automatic bounded-retention
//! snapshots that can be restored at any time.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analytics;
pub mod cli;
pub mod config;
pub mod error;
pub mod kv;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod scheduler;
pub mod snapshot;

pub use config::Config;
pub use error::{Error, Result};
pub use kv::KvStore;
pub use ledger::{CustomerSort, Ledger, LedgerStats};
pub use logging::init_logging;
pub use scheduler::BackupScheduler;
pub use snapshot::{SnapshotManager, SnapshotTrigger};
