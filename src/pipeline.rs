//! Batch engine: one run-to-completion pass over every active sensor.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::accumulate::recompute;
use crate::ledger::{Ledger, LedgerRow};
use crate::matcher::{CentroidMatcher, SensorHistory};
use crate::processor::ImageProcessor;
use crate::registry::MasterRegistry;
use crate::sources::{AnnotationSink, Detector, ImageSource, SensorInfo, SensorStore, SourceImage};
use crate::{Error, Result};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximum centroid distance, in pixels, for a detection to resolve to
    /// a known fly of the same class.
    pub distance_threshold: f64,

    /// Minimum confidence for a detection to enter the ledger.
    pub confidence_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 80.0,
            confidence_threshold: 0.4,
        }
    }
}

/// The collaborators one run operates against.
pub struct Collaborators<'a> {
    pub detector: &'a mut dyn Detector,
    pub sensors: &'a mut dyn SensorStore,
    pub images: &'a mut dyn ImageSource,
    pub annotations: &'a mut dyn AnnotationSink,
}

/// Ledger and registry as read at run start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub ledger: Ledger,
    pub registry: MasterRegistry,
}

/// Result of one run: the updated tables plus run diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub ledger: Ledger,
    pub registry: MasterRegistry,
    /// Rows produced by this run.
    pub new_rows: usize,
    /// Sensors skipped because their image source failed or was unmapped.
    pub sensors_skipped: usize,
    /// Images skipped because processing them failed; they stay out of the
    /// ledger and are retried on the next run.
    pub images_failed: usize,
    /// False when the run produced no new rows and the recompute was
    /// short-circuited.
    pub recomputed: bool,
}

/// Single-threaded, run-to-completion batch engine.
///
/// Each run processes every active sensor's pending images sequentially,
/// merges the produced rows into the ledger, recomputes the accumulations,
/// and folds the derived registry into the cross-run master registry. No
/// failure of one sensor or one image aborts the others.
pub struct Engine {
    config: EngineConfig,
    matcher: CentroidMatcher,
}

impl Engine {
    /// Create an engine, validating the configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                config.confidence_threshold
            )));
        }
        let matcher = CentroidMatcher::new(config.distance_threshold)?;
        Ok(Self { config, matcher })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// `run_date` stamps the master records derived by this run; pass the
    /// current date in production, a fixed date in tests.
    pub fn run(
        &self,
        collab: &mut Collaborators<'_>,
        state: RunState,
        run_date: NaiveDate,
    ) -> Result<RunOutcome> {
        let RunState { ledger, registry } = state;
        let processed = ledger.image_names();

        let mut new_rows: Vec<LedgerRow> = Vec::new();
        let mut sensors_skipped = 0;
        let mut images_failed = 0;

        for sensor in collab.sensors.active_sensors()? {
            let images = match collab.images.pending_images(&sensor) {
                Ok(images) => images,
                Err(Error::ConfigurationGap { sensor: name }) => {
                    warn!(sensor = %name, "no image source mapped, skipping sensor");
                    sensors_skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(sensor = %sensor.sensor_id, error = %e, "image source failed, skipping sensor");
                    sensors_skipped += 1;
                    continue;
                }
            };

            if images.is_empty() {
                debug!(sensor = %sensor.sensor_id, "no pending images");
                continue;
            }

            let produced = self.process_sensor(
                collab,
                &sensor,
                &images,
                &ledger,
                &processed,
                &mut images_failed,
            );
            new_rows.extend(produced);
        }

        if new_rows.is_empty() {
            // Recompute is only meaningful when new data arrived
            info!("no new images processed, skipping recompute");
            return Ok(RunOutcome {
                ledger,
                registry,
                new_rows: 0,
                sensors_skipped,
                images_failed,
                recomputed: false,
            });
        }

        let produced = new_rows.len();
        let mut ledger = ledger.merge(new_rows);
        let derived = recompute(&mut ledger, run_date);
        let registry = registry.merge(derived);

        info!(
            rows = produced,
            ledger = ledger.len(),
            registry = registry.len(),
            "run complete"
        );

        Ok(RunOutcome {
            ledger,
            registry,
            new_rows: produced,
            sensors_skipped,
            images_failed,
            recomputed: true,
        })
    }

    /// Process one sensor's images against a history seeded from that
    /// sensor's prior ledger rows. Image-level failures are logged and
    /// skipped; they never abort the sensor or the run.
    fn process_sensor(
        &self,
        collab: &mut Collaborators<'_>,
        sensor: &SensorInfo,
        images: &[SourceImage],
        ledger: &Ledger,
        processed: &HashSet<String>,
        images_failed: &mut usize,
    ) -> Vec<LedgerRow> {
        let mut history = SensorHistory::seed_from_rows(ledger.rows_for_sensor(&sensor.sensor_id));
        debug!(
            sensor = %sensor.sensor_id,
            known = history.total_known(),
            pending = images.len(),
            "processing sensor"
        );

        let mut processor = ImageProcessor::new(
            &mut *collab.detector,
            &mut *collab.annotations,
            &self.matcher,
            self.config.confidence_threshold,
        );

        let mut rows = Vec::new();
        for image in images {
            match processor.process(image, sensor, &mut history, processed) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(e) => {
                    warn!(image = %image.name, error = %e, "image processing failed, skipping image");
                    *images_failed += 1;
                }
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_default_config() {
        let engine = Engine::new(EngineConfig::default()).unwrap();

        assert_eq!(engine.config().distance_threshold, 80.0);
        assert_eq!(engine.config().confidence_threshold, 0.4);
    }

    #[test]
    fn test_engine_rejects_bad_confidence() {
        let config = EngineConfig { confidence_threshold: 1.5, ..EngineConfig::default() };
        assert!(Engine::new(config).is_err());

        let config = EngineConfig { confidence_threshold: -0.1, ..EngineConfig::default() };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_engine_rejects_bad_distance() {
        let config = EngineConfig { distance_threshold: 0.0, ..EngineConfig::default() };
        assert!(Engine::new(config).is_err());
    }
}
