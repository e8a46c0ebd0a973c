//! Detection value types: classes, bounding boxes, raw detector output.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Object classes produced by the detector.
///
/// The detector distinguishes female flies, male flies, and flies whose sex
/// could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Femea,
    Macho,
    Mosca,
}

impl ObjectClass {
    /// All classes, in detector class-id order.
    pub const ALL: [ObjectClass; 3] = [ObjectClass::Femea, ObjectClass::Macho, ObjectClass::Mosca];

    /// Lowercase name used in tabular data and annotation file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Femea => "femea",
            ObjectClass::Macho => "macho",
            ObjectClass::Mosca => "mosca",
        }
    }

    /// Numeric class id understood by the detector collaborator.
    pub fn class_id(&self) -> u32 {
        match self {
            ObjectClass::Femea => 0,
            ObjectClass::Macho => 1,
            ObjectClass::Mosca => 2,
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "femea" => Ok(ObjectClass::Femea),
            "macho" => Ok(ObjectClass::Macho),
            "mosca" => Ok(ObjectClass::Mosca),
            other => Err(Error::UnknownClass(other.to_string())),
        }
    }
}

/// Axis-aligned bounding box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    /// Center of the box. Matching operates on centroids, not corners.
    pub fn centroid(&self) -> Point2<f64> {
        Point2::new(
            (self.x_min + self.x_max) as f64 / 2.0,
            (self.y_min + self.y_max) as f64 / 2.0,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x_min, self.y_min, self.x_max, self.y_max)
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parse `x_min,y_min,x_max,y_max` as four integers.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedEntry {
            entry: s.to_string(),
            reason: reason.to_string(),
        };

        let mut coords = [0i32; 4];
        let mut parts = s.split(',');
        for slot in coords.iter_mut() {
            let part = parts.next().ok_or_else(|| malformed("expected four coordinates"))?;
            *slot = part
                .trim()
                .parse()
                .map_err(|_| malformed("coordinate is not an integer"))?;
        }
        if parts.next().is_some() {
            return Err(malformed("expected four coordinates"));
        }

        Ok(BoundingBox::new(coords[0], coords[1], coords[2], coords[3]))
    }
}

/// One detection as returned by the detector collaborator, before
/// re-identification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Confidence score in [0, 1].
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }

    /// Centroid of the detection's bounding box.
    pub fn centroid(&self) -> Point2<f64> {
        self.bbox.centroid()
    }
}

/// A value per object class.
///
/// Most of the engine fans out over the three classes independently; this
/// keeps the per-class values together without stringly-keyed maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerClass<T> {
    pub femea: T,
    pub macho: T,
    pub mosca: T,
}

impl<T> PerClass<T> {
    /// Build a per-class value by evaluating `f` once per class.
    pub fn from_fn(mut f: impl FnMut(ObjectClass) -> T) -> Self {
        Self {
            femea: f(ObjectClass::Femea),
            macho: f(ObjectClass::Macho),
            mosca: f(ObjectClass::Mosca),
        }
    }

    /// Iterate `(class, value)` pairs in class-id order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectClass, &T)> {
        ObjectClass::ALL.iter().map(move |&class| (class, &self[class]))
    }
}

impl<T> Index<ObjectClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: ObjectClass) -> &T {
        match class {
            ObjectClass::Femea => &self.femea,
            ObjectClass::Macho => &self.macho,
            ObjectClass::Mosca => &self.mosca,
        }
    }
}

impl<T> IndexMut<ObjectClass> for PerClass<T> {
    fn index_mut(&mut self, class: ObjectClass) -> &mut T {
        match class {
            ObjectClass::Femea => &mut self.femea,
            ObjectClass::Macho => &mut self.macho,
            ObjectClass::Mosca => &mut self.mosca,
        }
    }
}
