use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Side length of the square grayscale face crop the model is trained on.
pub const CANONICAL_FACE_SIZE: u32 = 100;

/// Default calibration constant for [`confidence_percent`].
pub const DEFAULT_THRESHOLD_DISTANCE: f64 = 12_000.0;

/// Axis-aligned face box within a single frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector score; only comparable between boxes from the same detector.
    pub score: f32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect a raw detector rectangle with a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the frame.
    pub fn clamped(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        score: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let x0 = x.clamp(0, frame_width as i64);
        let y0 = y.clamp(0, frame_height as i64);
        let x1 = (x + width).clamp(0, frame_width as i64);
        let y1 = (y + height).clamp(0, frame_height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            score,
        })
    }
}

/// Recognizer output for one face crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: i32,
    /// Distance to the nearest training projection. Lower = more similar.
    pub distance: f64,
}

impl Prediction {
    pub fn confidence(&self, threshold_distance: f64) -> f64 {
        confidence_percent(self.distance, threshold_distance)
    }
}

/// Map a raw distance onto a 0–100 confidence percentage.
///
/// `threshold_distance` maps to 0%, a perfect match to 100%. The mapping is linear
/// in between and clamped outside.
pub fn confidence_percent(distance: f64, threshold_distance: f64) -> f64 {
    if threshold_distance <= 0.0 {
        return if distance <= 0.0 { 100.0 } else { 0.0 };
    }
    (100.0 - (distance / threshold_distance) * 100.0).clamp(0.0, 100.0)
}

/// One enrolled face image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: i32,
}

/// How labels are assigned to the files of a sample directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPolicy {
    /// Every file gets its index in file-name order. Two images of the same person
    /// end up as two different classes.
    #[default]
    PerImage,
    /// Label is the second `_`-separated token of the file stem (`image_3_12.jpg` → 3).
    FromFileName,
}

impl FromStr for LabelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-image" => Ok(Self::PerImage),
            "from-file-name" => Ok(Self::FromFileName),
            other => Err(format!(
                "unknown label policy {other:?} (expected per-image or from-file-name)"
            )),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("cannot derive a label from file name {0:?} (expected <name>_<label>[_<n>].jpg)")]
pub struct LabelParseError(pub String);

/// Parse the integer label embedded in a file name: `image_7.jpg` → 7.
pub fn label_from_file_name(path: &Path) -> Result<i32, LabelParseError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LabelParseError(path.display().to_string()))?;

    stem.split('_')
        .nth(1)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| LabelParseError(stem.to_string()))
}
