//! Collaborator contracts: detector, sensor metadata, image source, and
//! annotation sink.
//!
//! The engine core is specified against these traits; the concrete YOLO
//! detector, the drive/folder image source, the sensor database, and the
//! dashboard renderer all live outside the crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detection::{ObjectClass, RawDetection};
use crate::Result;

/// One active sensor (sticky plate) and its geo-metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Identity of the currently active plate on the trap.
    pub sensor_id: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Display name of the trap; image sources are mapped by this name.
    pub name: String,
}

/// One image pending processing for a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    /// Unique image name; the ledger key.
    pub name: String,
    /// Local path of the fetched image, handed to the detector.
    pub path: PathBuf,
    /// ISO-8601 capture timestamp, possibly with sub-second or zone suffix.
    pub captured_at: String,
}

/// External object detector.
///
/// Called once per class per image with the class filter applied; returns
/// every detection of that class with bounding box and confidence.
pub trait Detector {
    fn detect(&mut self, image: &SourceImage, class: ObjectClass) -> Result<Vec<RawDetection>>;
}

/// Sensor metadata store; yields every currently active sensor.
pub trait SensorStore {
    fn active_sensors(&mut self) -> Result<Vec<SensorInfo>>;
}

/// Image acquisition collaborator.
///
/// Returns the images available for one sensor, fetched locally. Errors are
/// isolated per sensor by the engine: return
/// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable) when the
/// backing store cannot be reached and
/// [`Error::ConfigurationGap`](crate::Error::ConfigurationGap) when the
/// sensor's name has no mapped source.
pub trait ImageSource {
    fn pending_images(&mut self, sensor: &SensorInfo) -> Result<Vec<SourceImage>>;
}

/// Visualization collaborator.
///
/// Receives, once per class per processed image, the detections that
/// survived confidence filtering so it can render an annotated variant.
/// The engine only guarantees the [`annotation_file_name`] naming contract,
/// not the rendering.
pub trait AnnotationSink {
    fn publish(
        &mut self,
        image: &SourceImage,
        class: ObjectClass,
        detections: &[RawDetection],
    ) -> Result<()>;
}

/// Sink that discards annotations; for headless and test runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnnotationSink;

impl AnnotationSink for NullAnnotationSink {
    fn publish(
        &mut self,
        _image: &SourceImage,
        _class: ObjectClass,
        _detections: &[RawDetection],
    ) -> Result<()> {
        Ok(())
    }
}

/// File name an annotated image variant is published under:
/// `{image_name}_det_{class}.{ext}`.
pub fn annotation_file_name(image_name: &str, class: ObjectClass, extension: &str) -> String {
    format!("{}_det_{}.{}", image_name, class, extension)
}
