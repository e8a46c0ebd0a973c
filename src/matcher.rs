//! Centroid matcher: decides whether a detection is a fly already on the
//! plate or a new one.

use std::fmt;
use std::str::FromStr;

use nalgebra::{distance, Point2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::{ObjectClass, PerClass};
use crate::ledger::LedgerRow;
use crate::{Error, Result};

/// Stable identity of one physical fly.
///
/// Minted the first time a fly is observed and reused on every subsequent
/// observation while it remains on the same plate. Never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlyId(Uuid);

impl FlyId {
    /// Mint a fresh, globally unique identity.
    pub fn mint() -> Self {
        FlyId(Uuid::new_v4())
    }
}

impl fmt::Display for FlyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FlyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(FlyId).map_err(|e| Error::MalformedEntry {
            entry: s.to_string(),
            reason: format!("not a valid identity token: {}", e),
        })
    }
}

/// Last known position of each identity of one class.
///
/// At most one position per identity; a new sighting overwrites the stored
/// centroid, it never appends. Entries keep insertion order, which is the
/// order the matcher scans them in.
#[derive(Debug, Clone, Default)]
pub struct ClassHistory {
    entries: Vec<(FlyId, Point2<f64>)>,
}

impl ClassHistory {
    /// Number of known identities for this class.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last known centroid of an identity, if it has been seen.
    pub fn position_of(&self, fly_id: FlyId) -> Option<Point2<f64>> {
        self.entries
            .iter()
            .find(|(id, _)| *id == fly_id)
            .map(|(_, pos)| *pos)
    }

    /// Record a sighting: overwrite the identity's position if known,
    /// otherwise append it.
    pub fn record(&mut self, fly_id: FlyId, centroid: Point2<f64>) {
        if let Some((_, pos)) = self.entries.iter_mut().find(|(id, _)| *id == fly_id) {
            *pos = centroid;
        } else {
            self.entries.push((fly_id, centroid));
        }
    }

    fn scan(&self, candidate: &Point2<f64>, threshold: f64) -> Option<usize> {
        self.entries
            .iter()
            .position(|(_, known)| distance(known, candidate) < threshold)
    }
}

/// Per-class position history for one sensor, for one run.
///
/// Owned by the processing of a single sensor; it is shared across all of
/// that sensor's images within a run so later images can match flies first
/// seen earlier in the same run.
#[derive(Debug, Clone, Default)]
pub struct SensorHistory {
    classes: PerClass<ClassHistory>,
}

impl SensorHistory {
    /// Empty history (a sensor with no prior ledger rows).
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the history from previously recorded ledger rows of one sensor,
    /// so matching is continuous across runs.
    ///
    /// Rows are walked in ledger order; a fly sighted in several rows keeps
    /// the position from the last row that mentions it.
    pub fn seed_from_rows<'a>(rows: impl IntoIterator<Item = &'a LedgerRow>) -> Self {
        let mut history = Self::new();
        for row in rows {
            for class in ObjectClass::ALL {
                for record in &row.observations[class].records {
                    history.classes[class].record(record.fly_id, record.bbox.centroid());
                }
            }
        }
        history
    }

    /// History of one class.
    pub fn class(&self, class: ObjectClass) -> &ClassHistory {
        &self.classes[class]
    }

    /// Total identities known across all classes.
    pub fn total_known(&self) -> usize {
        ObjectClass::ALL.iter().map(|&c| self.classes[c].len()).sum()
    }
}

/// Result of resolving one detection against the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Identity the detection resolved to.
    pub fly_id: FlyId,
    /// True when the identity was minted by this resolution.
    pub is_new: bool,
}

/// Matches detection centroids against per-class known positions.
///
/// The scan returns the first history entry whose Euclidean distance to the
/// candidate is strictly below the threshold, even when a later entry is
/// closer; insertion order is the tie-break.
#[derive(Debug, Clone)]
pub struct CentroidMatcher {
    distance_threshold: f64,
}

impl CentroidMatcher {
    /// Create a matcher with the given distance threshold in pixels.
    pub fn new(distance_threshold: f64) -> Result<Self> {
        if !distance_threshold.is_finite() || distance_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "distance_threshold must be a positive number, got {}",
                distance_threshold
            )));
        }
        Ok(Self { distance_threshold })
    }

    pub fn distance_threshold(&self) -> f64 {
        self.distance_threshold
    }

    /// Resolve one centroid of one class against the history.
    ///
    /// On a match the stored position of the matched identity is overwritten
    /// with the candidate centroid, so the history tracks last-seen positions
    /// and keeps matching a fly whose apparent position drifts between
    /// photographs. On a miss a new identity is minted and inserted.
    pub fn resolve(
        &self,
        class: ObjectClass,
        centroid: Point2<f64>,
        history: &mut SensorHistory,
    ) -> MatchOutcome {
        let class_history = &mut history.classes[class];

        if let Some(idx) = class_history.scan(&centroid, self.distance_threshold) {
            let (fly_id, known) = &mut class_history.entries[idx];
            *known = centroid;
            return MatchOutcome { fly_id: *fly_id, is_new: false };
        }

        let fly_id = FlyId::mint();
        class_history.entries.push((fly_id, centroid));
        MatchOutcome { fly_id, is_new: true }
    }
}
