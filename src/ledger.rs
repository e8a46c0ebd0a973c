//! Append-only per-image detection ledger.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, PerClass};
use crate::matcher::FlyId;

/// One re-identified detection: which fly, where, how confident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub fly_id: FlyId,
    pub bbox: BoundingBox,
    /// Missing when a historic row carried fewer confidences than
    /// identities; always present for freshly processed detections.
    pub confidence: Option<f64>,
}

/// Everything observed for one class in one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassObservations {
    /// Number of identities minted by this image, not total detections.
    pub new_count: u32,
    /// All detections of this class in the image, in detector order.
    pub records: Vec<DetectionRecord>,
}

/// Accumulated distinct-fly counts for one class, filled by recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedCounts {
    /// Distinct flies in the row's ISO week, for the row's sensor.
    pub weekly: u32,
    /// Distinct flies in the row's calendar month, for the row's sensor.
    pub monthly: u32,
    /// Distinct flies on the row's sensor up to and including the row's date.
    pub sensor: u32,
}

/// One processed image: exactly one row per image name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Unique key of the row.
    pub image_name: String,
    /// Raw ISO-8601 timestamp as delivered by the image source.
    pub captured_at: String,
    /// Capture timestamp truncated to a calendar date; all weekly and
    /// monthly grouping is done on this.
    pub capture_date: NaiveDate,
    pub sensor_id: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observations: PerClass<ClassObservations>,
    /// Zeroed at creation; recompute overwrites all nine counts.
    pub accumulated: PerClass<AccumulatedCounts>,
}

impl LedgerRow {
    #[cfg(test)]
    pub(crate) fn stub(
        image_name: &str,
        captured_at: &str,
        capture_date: NaiveDate,
        sensor_id: &str,
    ) -> Self {
        Self {
            image_name: image_name.to_string(),
            captured_at: captured_at.to_string(),
            capture_date,
            sensor_id: sensor_id.to_string(),
            location: "Olival Norte".to_string(),
            latitude: 38.57,
            longitude: -7.91,
            observations: PerClass::default(),
            accumulated: PerClass::default(),
        }
    }
}

/// The full detection ledger: one row per processed image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from rows (e.g. decoded from persistence).
    /// Duplicate image names are collapsed keeping the last occurrence.
    pub fn from_rows(rows: Vec<LedgerRow>) -> Self {
        Self::new().merge(rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerRow> {
        self.rows.iter()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [LedgerRow] {
        &mut self.rows
    }

    /// Names of every image already in the ledger; the processed-set used
    /// to skip images on idempotent re-runs.
    pub fn image_names(&self) -> HashSet<String> {
        self.rows.iter().map(|r| r.image_name.clone()).collect()
    }

    /// Rows belonging to one sensor, in ledger order. Used to seed that
    /// sensor's matching history at the start of a run.
    pub fn rows_for_sensor<'a>(&'a self, sensor_id: &'a str) -> impl Iterator<Item = &'a LedgerRow> {
        self.rows.iter().filter(move |r| r.sensor_id == sensor_id)
    }

    /// Combine this ledger with newly produced rows.
    ///
    /// Rows are concatenated and deduplicated by image name keeping the last
    /// occurrence, so a reprocessed image replaces its old row instead of
    /// duplicating it. Survivor order follows the concatenation.
    pub fn merge(self, new_rows: Vec<LedgerRow>) -> Ledger {
        let mut combined = self.rows;
        combined.extend(new_rows);

        let mut last_index: HashMap<String, usize> = HashMap::new();
        for (idx, row) in combined.iter().enumerate() {
            last_index.insert(row.image_name.clone(), idx);
        }

        let rows = combined
            .into_iter()
            .enumerate()
            .filter(|(idx, row)| last_index[&row.image_name] == *idx)
            .map(|(_, row)| row)
            .collect();

        Ledger { rows }
    }

    pub fn into_rows(self) -> Vec<LedgerRow> {
        self.rows
    }
}
