//! Image processor: turns one image into one ledger row.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::detection::{ObjectClass, PerClass};
use crate::ledger::{ClassObservations, DetectionRecord, LedgerRow};
use crate::matcher::{CentroidMatcher, SensorHistory};
use crate::sources::{AnnotationSink, Detector, SensorInfo, SourceImage};
use crate::utils::truncate_to_date;
use crate::Result;

/// Runs the detector over every class of one image, resolves each detection
/// against the sensor's history, and assembles the ledger row.
pub struct ImageProcessor<'a> {
    detector: &'a mut dyn Detector,
    annotations: &'a mut dyn AnnotationSink,
    matcher: &'a CentroidMatcher,
    confidence_threshold: f64,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(
        detector: &'a mut dyn Detector,
        annotations: &'a mut dyn AnnotationSink,
        matcher: &'a CentroidMatcher,
        confidence_threshold: f64,
    ) -> Self {
        Self { detector, annotations, matcher, confidence_threshold }
    }

    /// Process one image for one sensor.
    ///
    /// Returns `Ok(None)` when the image name is already in the processed
    /// set: completed images are never reprocessed, which is what makes
    /// re-runs idempotent. Otherwise produces exactly one row with zeroed
    /// accumulation placeholders, mutating the history in place so later
    /// images of the same run match against flies first seen here.
    pub fn process(
        &mut self,
        image: &SourceImage,
        sensor: &SensorInfo,
        history: &mut SensorHistory,
        processed: &HashSet<String>,
    ) -> Result<Option<LedgerRow>> {
        if processed.contains(&image.name) {
            debug!(image = %image.name, "already processed, skipping");
            return Ok(None);
        }

        let capture_date = truncate_to_date(&image.captured_at)?;
        let mut observations: PerClass<ClassObservations> = PerClass::default();

        for class in ObjectClass::ALL {
            let detections = self.detector.detect(image, class)?;
            let kept: Vec<_> = detections
                .into_iter()
                .filter(|d| d.confidence >= self.confidence_threshold)
                .collect();

            // Rendering is a side channel; a failed publish must not poison
            // the ledger row.
            if let Err(e) = self.annotations.publish(image, class, &kept) {
                warn!(image = %image.name, %class, error = %e, "annotation publish failed");
            }

            let slot = &mut observations[class];
            for detection in kept {
                let outcome = self.matcher.resolve(class, detection.centroid(), history);
                if outcome.is_new {
                    slot.new_count += 1;
                }
                slot.records.push(DetectionRecord {
                    fly_id: outcome.fly_id,
                    bbox: detection.bbox,
                    confidence: Some(detection.confidence),
                });
            }
        }

        Ok(Some(LedgerRow {
            image_name: image.name.clone(),
            captured_at: image.captured_at.clone(),
            capture_date,
            sensor_id: sensor.sensor_id.clone(),
            location: sensor.location.clone(),
            latitude: sensor.latitude,
            longitude: sensor.longitude,
            observations,
            accumulated: PerClass::default(),
        }))
    }
}
