//! Derived reports over the treatment log.
//!
//! Nothing here mutates state; every report is computed from the live
//! collections (or the store, for the usage report) on demand.

use std::collections::HashMap;

use chrono::Datelike;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::ledger::{STORE_CUSTOMERS, STORE_DESIGNS, STORE_TREATMENTS};
use crate::model::Treatment;
use crate::snapshot::BACKUP_PREFIX;

/// How many tags the popularity ranking reports.
pub const TAG_RANKING_LIMIT: usize = 5;

/// Aggregates for one calendar month of treatments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// Year of the reported month.
    pub year: i32,
    /// Month of the reported month (1-12).
    pub month: u32,
    /// Total revenue in whole yen.
    pub revenue: i64,
    /// Number of treatments performed.
    pub treatment_count: usize,
    /// Number of distinct customers seen.
    pub unique_customers: usize,
    /// Share of those customers who visited more than once, as a
    /// percentage (0-100). Zero when no customers visited.
    pub repeat_rate: f64,
    /// Mean price per treatment in whole yen, rounded.
    pub average_price: i64,
}

/// One entry of the tag popularity ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    /// The tag text.
    pub tag: String,
    /// How many treatments carry it.
    pub count: usize,
}

/// Storage consumption broken down per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageReport {
    /// Total bytes across every persisted key.
    pub used_bytes: u64,
    /// The configured quota, when one is set.
    pub quota_bytes: Option<u64>,
    /// Bytes held by the customer store.
    pub customer_bytes: u64,
    /// Bytes held by the treatment store.
    pub treatment_bytes: u64,
    /// Bytes held by the gallery store.
    pub gallery_bytes: u64,
    /// Bytes held by snapshot bundles and their index.
    pub backup_bytes: u64,
    /// Number of snapshot bundles on disk.
    pub backup_count: usize,
}

impl StorageReport {
    /// Usage as a percentage of the quota, when one is set.
    #[must_use]
    pub fn percent_used(&self) -> Option<f64> {
        self.quota_bytes.map(|quota| {
            if quota == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let ratio = self.used_bytes as f64 / quota as f64;
                ratio * 100.0
            }
        })
    }
}

/// Parse a `YYYY-MM` month argument.
///
/// # Errors
///
/// Returns a validation error when the text is not a valid year-month.
pub fn parse_month(text: &str) -> Result<(i32, u32)> {
    let invalid = || Error::validation(format!("invalid month '{text}', expected YYYY-MM"));
    let (year, month) = text.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Summarize the treatments performed in the given month.
#[must_use]
pub fn monthly_summary(treatments: &[Treatment], year: i32, month: u32) -> MonthlySummary {
    let in_month: Vec<&Treatment> = treatments
        .iter()
        .filter(|t| t.date.year() == year && t.date.month() == month)
        .collect();

    let revenue: i64 = in_month.iter().map(|t| t.price).sum();
    let mut visits_per_customer: HashMap<&str, usize> = HashMap::new();
    for treatment in &in_month {
        *visits_per_customer
            .entry(treatment.customer_id.as_str())
            .or_insert(0) += 1;
    }

    let unique_customers = visits_per_customer.len();
    let repeaters = visits_per_customer.values().filter(|&&n| n > 1).count();
    #[allow(clippy::cast_precision_loss)]
    let repeat_rate = if unique_customers == 0 {
        0.0
    } else {
        repeaters as f64 / unique_customers as f64 * 100.0
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let average_price = if in_month.is_empty() {
        0
    } else {
        (revenue as f64 / in_month.len() as f64).round() as i64
    };

    MonthlySummary {
        year,
        month,
        revenue,
        treatment_count: in_month.len(),
        unique_customers,
        repeat_rate,
        average_price,
    }
}

/// Rank tags by how many treatments carry them, most popular first.
/// Ties break alphabetically. At most [`TAG_RANKING_LIMIT`] entries.
#[must_use]
pub fn tag_ranking(treatments: &[Treatment]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for treatment in treatments {
        for tag in &treatment.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }

    let mut ranking: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranking.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranking.truncate(TAG_RANKING_LIMIT);
    ranking
}

/// Report storage consumption per store and for the snapshot area.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn storage_report(kv: &KvStore, quota_bytes: Option<u64>) -> Result<StorageReport> {
    let value_len = |key: &str| -> Result<u64> {
        Ok(kv
            .get(key)?
            .map(|blob| (key.len() + blob.len()) as u64)
            .unwrap_or(0))
    };

    let mut backup_bytes = 0;
    let backup_keys = kv.keys_with_prefix(BACKUP_PREFIX)?;
    let backup_count = backup_keys.len();
    for key in &backup_keys {
        backup_bytes += value_len(key)?;
    }
    backup_bytes += value_len(crate::snapshot::BACKUP_INDEX_KEY)?;

    Ok(StorageReport {
        used_bytes: kv.used_bytes()?,
        quota_bytes,
        customer_bytes: value_len(STORE_CUSTOMERS)?,
        treatment_bytes: value_len(STORE_TREATMENTS)?,
        gallery_bytes: value_len(STORE_DESIGNS)?,
        backup_bytes,
        backup_count,
    })
}
