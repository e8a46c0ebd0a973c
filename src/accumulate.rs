//! Accumulation recompute: derives the master registry from the ledger and
//! refills every row's accumulated counts.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::detection::ObjectClass;
use crate::ledger::{AccumulatedCounts, Ledger};
use crate::matcher::FlyId;
use crate::registry::{MasterRecord, MasterRegistry};
use crate::utils::{month_key, week_key};

/// Recompute all accumulation columns of the ledger and derive the master
/// registry of first sightings.
///
/// Every count is recomputed from scratch for every row on every call;
/// there is no incremental path. Reprocessing or late-arriving out-of-order
/// images therefore always yield globally consistent counts, at the cost of
/// O(rows x registry) work per call. Running this twice over an unchanged
/// ledger produces identical counts and an identical registry.
///
/// The registry keeps, per (identity, class), the data of the earliest
/// ledger row mentioning that identity: all flattened detections are stably
/// sorted by capture date before first-occurrence deduplication, so
/// same-day sightings keep ledger order.
pub fn recompute(ledger: &mut Ledger, run_date: NaiveDate) -> MasterRegistry {
    let registry = derive_registry(ledger, run_date);

    for row in ledger.rows_mut() {
        let row_week = week_key(row.capture_date);
        let row_month = month_key(row.capture_date);

        for class in ObjectClass::ALL {
            let on_sensor = registry
                .iter()
                .filter(|r| r.class == class && r.sensor_id == row.sensor_id);

            let mut counts = AccumulatedCounts::default();
            for record in on_sensor {
                if record.first_seen <= row.capture_date {
                    counts.sensor += 1;
                }
                if week_key(record.first_seen) == row_week {
                    counts.weekly += 1;
                }
                if month_key(record.first_seen) == row_month {
                    counts.monthly += 1;
                }
            }
            row.accumulated[class] = counts;
        }
    }

    registry
}

/// Flatten the ledger into per-detection tuples, order them chronologically,
/// and keep the earliest occurrence of each (identity, class).
fn derive_registry(ledger: &Ledger, run_date: NaiveDate) -> MasterRegistry {
    let mut flattened: Vec<MasterRecord> = Vec::new();

    for row in ledger.iter() {
        for class in ObjectClass::ALL {
            for record in &row.observations[class].records {
                flattened.push(MasterRecord {
                    fly_id: record.fly_id,
                    class,
                    first_seen: row.capture_date,
                    first_image: row.image_name.clone(),
                    sensor_id: row.sensor_id.clone(),
                    location: row.location.clone(),
                    latitude: row.latitude,
                    longitude: row.longitude,
                    first_bbox: record.bbox,
                    first_confidence: record.confidence,
                    run_date,
                });
            }
        }
    }

    // Stable: same-day detections keep ledger order
    flattened.sort_by_key(|r| r.first_seen);

    let mut seen: HashSet<(FlyId, ObjectClass)> = HashSet::new();
    let records = flattened
        .into_iter()
        .filter(|r| seen.insert((r.fly_id, r.class)))
        .collect();

    MasterRegistry::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use crate::ledger::{DetectionRecord, LedgerRow};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row_with(
        image: &str,
        day: NaiveDate,
        sensor: &str,
        class: ObjectClass,
        records: Vec<DetectionRecord>,
    ) -> LedgerRow {
        let mut row = LedgerRow::stub(image, &format!("{}T08:00:00Z", day), day, sensor);
        row.observations[class].records = records;
        row
    }

    fn det(fly_id: FlyId, x: i32) -> DetectionRecord {
        DetectionRecord {
            fly_id,
            bbox: BoundingBox::new(x, 100, x + 20, 120),
            confidence: Some(0.9),
        }
    }

    fn run() -> NaiveDate {
        date(2024, 8, 1)
    }

    #[test]
    fn test_registry_keeps_earliest_sighting() {
        let fly = FlyId::mint();
        let mut ledger = Ledger::new().merge(vec![
            // Later image first in the ledger: sorting must still win
            row_with("b.jpg", date(2024, 7, 2), "S1", ObjectClass::Mosca, vec![det(fly, 105)]),
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(fly, 100)]),
        ]);

        let registry = recompute(&mut ledger, run());

        assert_eq!(registry.len(), 1);
        let record = registry.iter().next().unwrap();
        assert_eq!(record.first_image, "a.jpg");
        assert_eq!(record.first_seen, date(2024, 7, 1));
        assert_eq!(record.first_bbox, BoundingBox::new(100, 100, 120, 120));
    }

    #[test]
    fn test_reobserved_fly_counts_once() {
        let fly = FlyId::mint();
        let mut ledger = Ledger::new().merge(vec![
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(fly, 100)]),
            row_with("b.jpg", date(2024, 7, 2), "S1", ObjectClass::Mosca, vec![det(fly, 105)]),
        ]);

        let registry = recompute(&mut ledger, run());
        assert_eq!(registry.len(), 1);

        let b = ledger.iter().find(|r| r.image_name == "b.jpg").unwrap();
        assert_eq!(b.accumulated[ObjectClass::Mosca].sensor, 1);
    }

    #[test]
    fn test_new_fly_raises_sensor_count() {
        let fly_a = FlyId::mint();
        let fly_b = FlyId::mint();
        let mut ledger = Ledger::new().merge(vec![
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(fly_a, 100)]),
            row_with("b.jpg", date(2024, 7, 2), "S1", ObjectClass::Mosca, vec![det(fly_b, 400)]),
        ]);

        let registry = recompute(&mut ledger, run());
        assert_eq!(registry.len(), 2);

        let a = ledger.iter().find(|r| r.image_name == "a.jpg").unwrap();
        let b = ledger.iter().find(|r| r.image_name == "b.jpg").unwrap();
        assert_eq!(a.accumulated[ObjectClass::Mosca].sensor, 1);
        assert_eq!(b.accumulated[ObjectClass::Mosca].sensor, 2);
    }

    #[test]
    fn test_sensor_count_is_monotonic_in_date() {
        let mut rows = Vec::new();
        for day in 1..=10u32 {
            rows.push(row_with(
                &format!("img_{:02}.jpg", day),
                date(2024, 7, day),
                "S1",
                ObjectClass::Mosca,
                vec![det(FlyId::mint(), day as i32 * 200)],
            ));
        }
        let mut ledger = Ledger::new().merge(rows);
        recompute(&mut ledger, run());

        let mut ordered: Vec<_> = ledger.iter().collect();
        ordered.sort_by_key(|r| r.capture_date);

        let mut prev = 0;
        for row in ordered {
            let count = row.accumulated[ObjectClass::Mosca].sensor;
            assert!(count >= prev, "sensor count decreased at {}", row.image_name);
            prev = count;
        }
    }

    #[test]
    fn test_weekly_and_monthly_are_bucket_totals() {
        // Week 27 (Jul 1) and week 28 (Jul 8), same month
        let fly_a = FlyId::mint();
        let fly_b = FlyId::mint();
        let mut ledger = Ledger::new().merge(vec![
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(fly_a, 100)]),
            row_with("b.jpg", date(2024, 7, 8), "S1", ObjectClass::Mosca, vec![det(fly_b, 400)]),
        ]);

        recompute(&mut ledger, run());

        let a = ledger.iter().find(|r| r.image_name == "a.jpg").unwrap();
        let b = ledger.iter().find(|r| r.image_name == "b.jpg").unwrap();

        // Each week holds one distinct fly
        assert_eq!(a.accumulated[ObjectClass::Mosca].weekly, 1);
        assert_eq!(b.accumulated[ObjectClass::Mosca].weekly, 1);

        // The month holds both, and the earlier row already sees the full
        // month total after recompute
        assert_eq!(a.accumulated[ObjectClass::Mosca].monthly, 2);
        assert_eq!(b.accumulated[ObjectClass::Mosca].monthly, 2);

        // The to-date count stays date-bounded
        assert_eq!(a.accumulated[ObjectClass::Mosca].sensor, 1);
        assert_eq!(b.accumulated[ObjectClass::Mosca].sensor, 2);
    }

    #[test]
    fn test_counts_are_scoped_to_sensor() {
        let mut ledger = Ledger::new().merge(vec![
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(FlyId::mint(), 100)]),
            row_with("b.jpg", date(2024, 7, 1), "S2", ObjectClass::Mosca, vec![det(FlyId::mint(), 100)]),
        ]);

        recompute(&mut ledger, run());

        for row in ledger.iter() {
            assert_eq!(row.accumulated[ObjectClass::Mosca].sensor, 1);
            assert_eq!(row.accumulated[ObjectClass::Mosca].weekly, 1);
            assert_eq!(row.accumulated[ObjectClass::Mosca].monthly, 1);
        }
    }

    #[test]
    fn test_counts_are_scoped_to_class() {
        let fly_m = FlyId::mint();
        let fly_f = FlyId::mint();
        let mut row = LedgerRow::stub("a.jpg", "2024-07-01T08:00:00Z", date(2024, 7, 1), "S1");
        row.observations[ObjectClass::Mosca].records = vec![det(fly_m, 100)];
        row.observations[ObjectClass::Femea].records = vec![det(fly_f, 300)];

        let mut ledger = Ledger::new().merge(vec![row]);
        recompute(&mut ledger, run());

        let r = ledger.iter().next().unwrap();
        assert_eq!(r.accumulated[ObjectClass::Mosca].sensor, 1);
        assert_eq!(r.accumulated[ObjectClass::Femea].sensor, 1);
        assert_eq!(r.accumulated[ObjectClass::Macho].sensor, 0);
    }

    #[test]
    fn test_empty_ledger_yields_empty_registry() {
        let mut ledger = Ledger::new();
        let registry = recompute(&mut ledger, run());

        assert!(registry.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rows_without_detections_get_zero_counts() {
        let mut ledger = Ledger::new().merge(vec![row_with(
            "a.jpg",
            date(2024, 7, 1),
            "S1",
            ObjectClass::Mosca,
            Vec::new(),
        )]);

        let registry = recompute(&mut ledger, run());
        assert!(registry.is_empty());

        let row = ledger.iter().next().unwrap();
        for class in ObjectClass::ALL {
            assert_eq!(row.accumulated[class], AccumulatedCounts::default());
        }
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let fly_a = FlyId::mint();
        let fly_b = FlyId::mint();
        let mut ledger = Ledger::new().merge(vec![
            row_with("a.jpg", date(2024, 7, 1), "S1", ObjectClass::Mosca, vec![det(fly_a, 100)]),
            row_with("b.jpg", date(2024, 7, 8), "S1", ObjectClass::Mosca, vec![det(fly_a, 105), det(fly_b, 400)]),
            row_with("c.jpg", date(2024, 7, 9), "S2", ObjectClass::Femea, vec![det(FlyId::mint(), 200)]),
        ]);

        let registry_first = recompute(&mut ledger, run());
        let ledger_first = ledger.clone();

        let registry_second = recompute(&mut ledger, run());

        assert_eq!(ledger, ledger_first);
        assert_eq!(registry_second, registry_first);
    }

    #[test]
    fn test_missing_confidence_is_carried_to_registry() {
        let fly = FlyId::mint();
        let record = DetectionRecord {
            fly_id: fly,
            bbox: BoundingBox::new(100, 100, 120, 120),
            confidence: None,
        };
        let mut ledger = Ledger::new().merge(vec![row_with(
            "a.jpg",
            date(2024, 7, 1),
            "S1",
            ObjectClass::Mosca,
            vec![record],
        )]);

        let registry = recompute(&mut ledger, run());
        assert_eq!(registry.iter().next().unwrap().first_confidence, None);
    }

    #[test]
    fn test_run_date_is_stamped() {
        let mut ledger = Ledger::new().merge(vec![row_with(
            "a.jpg",
            date(2024, 7, 1),
            "S1",
            ObjectClass::Mosca,
            vec![det(FlyId::mint(), 100)],
        )]);

        let registry = recompute(&mut ledger, date(2024, 8, 15));
        assert_eq!(registry.iter().next().unwrap().run_date, date(2024, 8, 15));
    }
}
