//! Master registry: the deduplicated first-sighting table.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::detection::{BoundingBox, ObjectClass};
use crate::matcher::FlyId;

/// First sighting of one fly: exactly one record per (identity, class).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub fly_id: FlyId,
    pub class: ObjectClass,
    /// Date of the earliest ledger row that mentions the identity.
    pub first_seen: NaiveDate,
    /// Image the fly was first detected in.
    pub first_image: String,
    pub sensor_id: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub first_bbox: BoundingBox,
    pub first_confidence: Option<f64>,
    /// Date of the run that derived this record. Never overwritten by the
    /// cross-run merge.
    pub run_date: NaiveDate,
}

/// Cross-run registry of first sightings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterRegistry {
    records: Vec<MasterRecord>,
}

impl MasterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from records, collapsing duplicate (identity, class)
    /// pairs keeping the first occurrence.
    pub fn from_records(records: Vec<MasterRecord>) -> Self {
        Self::new().merge(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasterRecord> {
        self.records.iter()
    }

    /// Whether an identity of a class already has a registry entry.
    pub fn contains(&self, fly_id: FlyId, class: ObjectClass) -> bool {
        self.records
            .iter()
            .any(|r| r.fly_id == fly_id && r.class == class)
    }

    /// Fold a freshly derived registry into this one.
    ///
    /// Records are concatenated and deduplicated by (identity, class)
    /// keeping the first occurrence: once a fly has an entry it is never
    /// overwritten by a later run, even when that run derived a slightly
    /// different first-sighting snapshot. Registry stability is favored
    /// over registry accuracy.
    pub fn merge(self, newer: MasterRegistry) -> MasterRegistry {
        let mut seen: HashSet<(FlyId, ObjectClass)> = HashSet::new();
        let records = self
            .records
            .into_iter()
            .chain(newer.records)
            .filter(|r| seen.insert((r.fly_id, r.class)))
            .collect();
        MasterRegistry { records }
    }

    pub fn into_records(self) -> Vec<MasterRecord> {
        self.records
    }
}
