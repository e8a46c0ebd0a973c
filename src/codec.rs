//! Tabular boundary codec.
//!
//! The ledger is exposed to persistence collaborators as a flat table whose
//! per-class detection cells are text: `identity:x_min,y_min,x_max,y_max`
//! entries joined by `"; "`, with a second cell of `"; "`-joined confidence
//! values aligned positionally with the first. This module converts between
//! that wire form and [`DetectionRecord`] lists.
//!
//! Decoding is lossy by policy: a malformed entry is logged and skipped,
//! never fatal. A confidence position past the end of the confidence list
//! decodes to a missing confidence, not an error.

use tracing::warn;

use crate::detection::BoundingBox;
use crate::ledger::DetectionRecord;
use crate::matcher::FlyId;

const LIST_SEPARATOR: &str = "; ";

/// Encode detection records as an `identity:bbox` list cell.
pub fn encode_records(records: &[DetectionRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}:{}", r.fly_id, r.bbox))
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Encode the confidence list cell, positionally aligned with
/// [`encode_records`]. Confidences are stored with two decimal places;
/// a missing confidence encodes as an empty slot.
pub fn encode_confidences(records: &[DetectionRecord]) -> String {
    records
        .iter()
        .map(|r| match r.confidence {
            Some(c) => format!("{:.2}", c),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Decode a coordinate cell and its aligned confidence cell back into
/// detection records.
///
/// Entries that cannot be split into `identity:bbox`, whose identity is not
/// a valid token, or whose bbox does not parse as four integers are warned
/// about and dropped; the remaining entries keep their confidences by
/// position in the original list.
pub fn decode_records(coords: &str, confidences: &str) -> Vec<DetectionRecord> {
    if coords.trim().is_empty() {
        return Vec::new();
    }

    let confidence_slots: Vec<Option<f64>> = confidences
        .split(LIST_SEPARATOR)
        .map(|s| s.trim().parse::<f64>().ok())
        .collect();

    let mut records = Vec::new();
    for (position, entry) in coords.split(LIST_SEPARATOR).enumerate() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let Some((id_part, bbox_part)) = entry.split_once(':') else {
            warn!(entry, "skipping coordinate entry without identity separator");
            continue;
        };

        let fly_id: FlyId = match id_part.trim().parse() {
            Ok(id) => id,
            Err(e) => {
                warn!(entry, error = %e, "skipping entry with malformed identity");
                continue;
            }
        };

        let bbox: BoundingBox = match bbox_part.trim().parse() {
            Ok(bbox) => bbox,
            Err(e) => {
                warn!(entry, error = %e, "skipping entry with malformed coordinates");
                continue;
            }
        };

        let confidence = confidence_slots.get(position).copied().flatten();
        records.push(DetectionRecord { fly_id, bbox, confidence });
    }

    records
}
