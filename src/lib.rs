//! # Flytally - Fly Re-identification and Accumulation Engine
//!
//! Flytally ingests per-image object-detection output (bounding boxes, class
//! labels, confidence scores) produced by an external detector for a network
//! of sticky-plate sensors photographed over time, and turns it into a
//! longitudinal count of distinct flies per class, per sensor, per ISO week,
//! and per month.
//!
//! ## Features
//!
//! - Centroid-based re-identification: a detection within a configurable
//!   pixel distance of a previously seen fly of the same class resolves to
//!   the same identity; anything farther mints a new one
//! - Append-only per-image ledger with last-write-wins merge by image name
//! - Deduplicated master registry of first sightings, one record per
//!   (identity, class), rederived in full on every run
//! - Per-sensor-to-date, per-ISO-week, and per-month accumulated counts
//!   recomputed from scratch so late-arriving images never corrupt history
//! - Collaborator traits for the detector, sensor metadata store, image
//!   source, and annotation sink
//!
//! ## Example
//!
//! ```rust,ignore
//! use flytally::{Engine, EngineConfig, Collaborators, RunState};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let mut collab = Collaborators {
//!     detector: &mut detector,
//!     sensors: &mut sensor_store,
//!     images: &mut image_source,
//!     annotations: &mut annotation_sink,
//! };
//!
//! let outcome = engine.run(&mut collab, RunState::default(), run_date)?;
//! println!("{} new rows, {} flies registered",
//!     outcome.new_rows, outcome.registry.len());
//! ```

pub mod detection;
pub mod matcher;
pub mod processor;
pub mod ledger;
pub mod accumulate;
pub mod registry;
pub mod codec;
pub mod sources;
pub mod pipeline;
pub mod utils;

// Re-exports for convenience
pub use detection::{BoundingBox, ObjectClass, PerClass, RawDetection};
pub use matcher::{CentroidMatcher, FlyId, MatchOutcome, SensorHistory};
pub use processor::ImageProcessor;
pub use ledger::{AccumulatedCounts, ClassObservations, DetectionRecord, Ledger, LedgerRow};
pub use accumulate::recompute;
pub use registry::{MasterRecord, MasterRegistry};
pub use sources::{
    AnnotationSink, Detector, ImageSource, NullAnnotationSink, SensorInfo, SensorStore,
    SourceImage,
};
pub use pipeline::{Collaborators, Engine, EngineConfig, RunOutcome, RunState};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur in the flytally engine.
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("unknown object class: {0}")]
        UnknownClass(String),

        #[error("malformed entry '{entry}': {reason}")]
        MalformedEntry { entry: String, reason: String },

        #[error("invalid timestamp: {0}")]
        InvalidTimestamp(String),

        #[error("image source unavailable for sensor '{sensor}': {reason}")]
        SourceUnavailable { sensor: String, reason: String },

        #[error("no image source mapped for sensor '{sensor}'")]
        ConfigurationGap { sensor: String },

        #[error("detector error: {0}")]
        Detector(String),

        #[error("annotation sink error: {0}")]
        Annotation(String),

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Result type for flytally operations.
    pub type Result<T> = std::result::Result<T, Error>;
}
