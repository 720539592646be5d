//! Cascade face detection via the `rustface` funnel-structured cascade.
//!
//! The cascade model is a pretrained external asset read from disk; this module
//! only configures the scan and converts the hits into [`BoundingBox`]es.

use crate::types::BoundingBox;
use image::GrayImage;
use rustface::ImageData;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const DEFAULT_SCALE_FACTOR: f32 = 1.1;
const DEFAULT_MIN_FACE_SIZE: u32 = 30;
const DEFAULT_SCORE_THRESHOLD: f64 = 2.0;
const DEFAULT_WINDOW_STEP: u32 = 4;
/// Smallest face size the cascade accepts.
const CASCADE_MIN_WINDOW: u32 = 20;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("cascade model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load cascade model {path}: {source}")]
    ModelLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid detector parameters: {0}")]
    InvalidParams(String),
}

/// Anything that finds faces in a grayscale frame.
///
/// Zero faces is an empty vector, never an error. Box order carries no meaning.
pub trait FaceDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        (**self).detect(frame)
    }
}

impl<D: FaceDetector + ?Sized> FaceDetector for &mut D {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        (**self).detect(frame)
    }
}

/// Multi-scale scan configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeParams {
    /// Size ratio between two consecutive scanned scales (> 1.0).
    pub scale_factor: f32,
    /// Smallest face edge in pixels.
    pub min_size: u32,
    /// Largest face edge in pixels; 0 means no limit.
    pub max_size: u32,
    /// Cascade score a window must reach to count as a face.
    pub score_threshold: f64,
    /// Sliding-window step in pixels, both axes.
    pub window_step: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_size: DEFAULT_MIN_FACE_SIZE,
            max_size: 0,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            window_step: DEFAULT_WINDOW_STEP,
        }
    }
}

impl CascadeParams {
    fn validate(&self) -> Result<(), DetectorError> {
        if !(self.scale_factor > 1.0) {
            return Err(DetectorError::InvalidParams(format!(
                "scale factor must be > 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.min_size < CASCADE_MIN_WINDOW {
            return Err(DetectorError::InvalidParams(format!(
                "minimum face size must be >= {CASCADE_MIN_WINDOW}, got {}",
                self.min_size
            )));
        }
        if self.max_size != 0 && self.max_size < self.min_size {
            return Err(DetectorError::InvalidParams(format!(
                "maximum face size {} is below minimum {}",
                self.max_size, self.min_size
            )));
        }
        if self.window_step == 0 {
            return Err(DetectorError::InvalidParams("window step must be > 0".into()));
        }
        Ok(())
    }
}

/// Pretrained cascade detector.
pub struct CascadeDetector {
    inner: Box<dyn rustface::Detector>,
    params: CascadeParams,
}

impl CascadeDetector {
    /// Load the cascade model file and apply `params`.
    pub fn load(model_path: &Path, params: CascadeParams) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }
        params.validate()?;

        let path_str = model_path.to_string_lossy();
        let mut inner =
            rustface::create_detector(&path_str).map_err(|source| DetectorError::ModelLoad {
                path: path_str.to_string(),
                source,
            })?;

        inner.set_min_face_size(params.min_size);
        if params.max_size > 0 {
            inner.set_max_face_size(params.max_size);
        }
        // rustface takes the shrink ratio between pyramid levels.
        inner.set_pyramid_scale_factor(1.0 / params.scale_factor);
        inner.set_score_thresh(params.score_threshold);
        inner.set_slide_window_step(params.window_step, params.window_step);

        tracing::info!(
            path = %model_path.display(),
            scale_factor = params.scale_factor,
            min_size = params.min_size,
            max_size = params.max_size,
            score_threshold = params.score_threshold,
            "loaded cascade model"
        );

        Ok(Self { inner, params })
    }

    pub fn params(&self) -> &CascadeParams {
        &self.params
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = frame.dimensions();
        // Frames smaller than one minimum window cannot hold a face.
        if width.min(height) < self.params.min_size {
            return Ok(Vec::new());
        }

        let image = ImageData::new(frame.as_raw(), width, height);
        let faces = self.inner.detect(&image);

        let boxes: Vec<BoundingBox> = faces
            .iter()
            .filter_map(|face| {
                let rect = face.bbox();
                BoundingBox::clamped(
                    rect.x() as i64,
                    rect.y() as i64,
                    rect.width() as i64,
                    rect.height() as i64,
                    face.score() as f32,
                    width,
                    height,
                )
            })
            .collect();

        tracing::trace!(count = boxes.len(), "cascade detections");
        Ok(boxes)
    }
}
