//! Eigenface recognizer model.
//!
//! Holds the PCA basis (mean face + principal components) learned from the
//! training crops, the projection of every training crop onto that basis and its
//! label. Prediction is nearest neighbour in projection space.

use crate::eigen::symmetric_eigen;
use crate::types::Prediction;
use chrono::{DateTime, Utc};
use image::GrayImage;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const MODEL_FORMAT_VERSION: u32 = 1;
/// Eigenvalues below this fraction of the largest one are treated as zero.
const EIGENVALUE_EPSILON: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    NotFound(String),
    #[error("malformed model file {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("unsupported model format version {found} (expected {MODEL_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("face crop must be {expected}x{expected} grayscale, got {width}x{height}")]
    InputSize {
        expected: u32,
        width: u32,
        height: u32,
    },
    #[error("cannot fit a model without training images")]
    NoTrainingData,
    #[error("{images} training images but {labels} labels")]
    LabelCountMismatch { images: usize, labels: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Something that maps a canonical face crop to a label.
pub trait Recognizer {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, ModelError>;
}

impl<R: Recognizer + ?Sized> Recognizer for &R {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, ModelError> {
        (**self).predict(face)
    }
}

/// Trained eigenface model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EigenModel {
    format_version: u32,
    /// Canonical crop edge length; every input must be `face_size` × `face_size`.
    face_size: u32,
    /// Mean face, one entry per pixel.
    mean: Array1<f64>,
    /// Eigenvalues of the kept components, descending.
    eigenvalues: Array1<f64>,
    /// Principal components as rows (K × pixels).
    components: Array2<f64>,
    /// Training crops projected onto the components (N × K).
    projections: Array2<f64>,
    labels: Vec<i32>,
    trained_at: DateTime<Utc>,
}

impl EigenModel {
    /// Fit a model to canonical face crops.
    ///
    /// `num_components` caps the number of kept components; 0 keeps every
    /// non-degenerate one (at most N - 1 for N crops).
    pub fn fit(
        faces: &[GrayImage],
        labels: &[i32],
        face_size: u32,
        num_components: usize,
    ) -> Result<Self, ModelError> {
        if faces.is_empty() {
            return Err(ModelError::NoTrainingData);
        }
        if faces.len() != labels.len() {
            return Err(ModelError::LabelCountMismatch {
                images: faces.len(),
                labels: labels.len(),
            });
        }

        for face in faces {
            check_size(face, face_size)?;
        }
        let pixels = pixel_count(face_size).ok_or(ModelError::InputSize {
            expected: face_size,
            width: faces[0].width(),
            height: faces[0].height(),
        })?;

        let mut data = Array2::<f64>::zeros((faces.len(), pixels));
        for (mut row, face) in data.axis_iter_mut(Axis(0)).zip(faces) {
            row.assign(&to_vector(face));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(ModelError::NoTrainingData)?;
        let centered = &data - &mean;

        // Eigenvectors of the small N×N Gram matrix A·Aᵀ map onto eigenvectors of
        // the pixel covariance Aᵀ·A through Aᵀ.
        let gram = centered.dot(&centered.t());
        let (values, vectors) = symmetric_eigen(&gram);

        let largest = values.first().copied().unwrap_or(0.0).max(0.0);
        let limit = if num_components == 0 { usize::MAX } else { num_components };

        let mut kept_values = Vec::new();
        let mut kept_components: Vec<f64> = Vec::new();
        for (i, &value) in values.iter().enumerate() {
            if kept_values.len() >= limit || value <= EIGENVALUE_EPSILON * largest.max(1.0) {
                break;
            }
            let component = centered.t().dot(&vectors.column(i));
            let norm = component.dot(&component).sqrt();
            if norm <= 0.0 {
                continue;
            }
            kept_values.push(value);
            kept_components.extend(component.iter().map(|x| x / norm));
        }

        let k = kept_values.len();
        let components = Array2::from_shape_vec((k, pixels), kept_components).map_err(|e| {
            ModelError::Malformed {
                path: "<training>".into(),
                reason: e.to_string(),
            }
        })?;
        let projections = centered.dot(&components.t());

        tracing::info!(
            samples = faces.len(),
            components = k,
            face_size,
            "fitted eigenface model"
        );

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            face_size,
            mean,
            eigenvalues: Array1::from(kept_values),
            components,
            projections,
            labels: labels.to_vec(),
            trained_at: Utc::now(),
        })
    }

    /// Read a model previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.display().to_string()));
        }

        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader).map_err(|e| ModelError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: model.format_version,
            });
        }
        model.validate().map_err(|reason| ModelError::Malformed {
            path: path.display().to_string(),
            reason,
        })?;

        tracing::info!(
            path = %path.display(),
            samples = model.labels.len(),
            components = model.num_components(),
            trained_at = %model.trained_at,
            "loaded eigenface model"
        );
        Ok(model)
    }

    /// Write the model to `path`, replacing any previous file.
    ///
    /// The data goes to a sibling temporary file first, so a crash mid-write never
    /// leaves a truncated model behind.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        let written = self
            .write_json(&tmp_path)
            .and_then(|()| std::fs::rename(&tmp_path, path).map_err(ModelError::from));
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                tracing::debug!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "temp model not removed"
                );
            }
            return Err(e);
        }

        tracing::info!(path = %path.display(), "saved eigenface model");
        Ok(())
    }

    fn write_json(&self, path: &Path) -> Result<(), ModelError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    pub fn num_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Project a canonical crop onto the eigenface basis.
    pub fn project(&self, face: &GrayImage) -> Result<Array1<f64>, ModelError> {
        check_size(face, self.face_size)?;
        let centered = to_vector(face) - &self.mean;
        Ok(self.components.dot(&centered))
    }

    fn validate(&self) -> Result<(), String> {
        if self.face_size == 0 {
            return Err("face size is zero".into());
        }
        let pixels = pixel_count(self.face_size)
            .ok_or_else(|| format!("face size {} is too large", self.face_size))?;
        let k = self.components.nrows();
        let n = self.labels.len();

        if n == 0 {
            return Err("model has no training samples".into());
        }
        if self.mean.len() != pixels {
            return Err(format!("mean has {} entries, expected {pixels}", self.mean.len()));
        }
        if self.components.ncols() != pixels {
            return Err(format!(
                "components have {} columns, expected {pixels}",
                self.components.ncols()
            ));
        }
        if self.eigenvalues.len() != k {
            return Err(format!("{} eigenvalues for {k} components", self.eigenvalues.len()));
        }
        if self.projections.dim() != (n, k) {
            return Err(format!(
                "projections are {:?}, expected ({n}, {k})",
                self.projections.dim()
            ));
        }
        Ok(())
    }
}

impl Recognizer for EigenModel {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, ModelError> {
        let query = self.project(face)?;

        let mut best_distance = f64::INFINITY;
        let mut best_label = self.labels[0];

        // Every stored projection is compared; ties keep the earliest sample.
        for (projection, &label) in self.projections.axis_iter(Axis(0)).zip(&self.labels) {
            let distance = euclidean(projection, query.view());
            if distance < best_distance {
                best_distance = distance;
                best_label = label;
            }
        }

        Ok(Prediction {
            label: best_label,
            distance: best_distance,
        })
    }
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn check_size(face: &GrayImage, face_size: u32) -> Result<(), ModelError> {
    let (width, height) = face.dimensions();
    if width != face_size || height != face_size {
        return Err(ModelError::InputSize {
            expected: face_size,
            width,
            height,
        });
    }
    Ok(())
}

/// Pixels in a `face_size` × `face_size` crop, if that fits in memory indexing.
fn pixel_count(face_size: u32) -> Option<usize> {
    let edge = usize::try_from(face_size).ok()?;
    edge.checked_mul(edge)
}

fn to_vector(face: &GrayImage) -> Array1<f64> {
    face.as_raw().iter().map(|&p| p as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const SIZE: u32 = 100;

    /// Distinct, non-uniform synthetic "faces".
    fn pattern(seed: u32) -> GrayImage {
        GrayImage::from_fn(SIZE, SIZE, |x, y| {
            let v = (x * (seed + 1) + y * (2 * seed + 3) + seed * 37) % 256;
            Luma([v as u8])
        })
    }

    fn scratch_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("likeness-model-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_training_sample_predicts_own_label() {
        let faces: Vec<GrayImage> = (0..5).map(pattern).collect();
        let labels = vec![10, 11, 12, 13, 14];
        let model = EigenModel::fit(&faces, &labels, SIZE, 0).unwrap();

        for (face, &label) in faces.iter().zip(&labels) {
            let p = model.predict(face).unwrap();
            assert_eq!(p.label, label);
            assert!(p.distance < 1e-6, "distance {} should be ~0", p.distance);
        }
    }

    #[test]
    fn test_keeps_at_most_n_minus_one_components() {
        let faces: Vec<GrayImage> = (0..4).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1, 2, 3], SIZE, 0).unwrap();
        assert_eq!(model.num_components(), 3);

        let eig = model.eigenvalues().to_vec();
        assert!(eig.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_component_cap() {
        let faces: Vec<GrayImage> = (0..4).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1, 2, 3], SIZE, 2).unwrap();
        assert_eq!(model.num_components(), 2);
    }

    #[test]
    fn test_nearest_neighbour_for_perturbed_input() {
        let faces: Vec<GrayImage> = (0..3).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1, 2], SIZE, 0).unwrap();

        let mut noisy = faces[1].clone();
        for (i, p) in noisy.pixels_mut().enumerate() {
            if i % 97 == 0 {
                p[0] = p[0].saturating_add(3);
            }
        }
        let p = model.predict(&noisy).unwrap();
        assert_eq!(p.label, 1);
        assert!(p.distance > 0.0);
    }

    #[test]
    fn test_every_prediction_has_a_label() {
        let faces: Vec<GrayImage> = (0..3).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[4, 5, 6], SIZE, 0).unwrap();

        let stranger = GrayImage::from_pixel(SIZE, SIZE, Luma([255]));
        let p = model.predict(&stranger).unwrap();
        assert!([4, 5, 6].contains(&p.label));
    }

    #[test]
    fn test_rejects_wrong_input_size() {
        let faces: Vec<GrayImage> = (0..2).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1], SIZE, 0).unwrap();
        let result = model.predict(&GrayImage::new(64, 64));
        assert!(matches!(result, Err(ModelError::InputSize { width: 64, .. })));
    }

    #[test]
    fn test_fit_without_data() {
        let result = EigenModel::fit(&[], &[], SIZE, 0);
        assert!(matches!(result, Err(ModelError::NoTrainingData)));
    }

    #[test]
    fn test_fit_label_mismatch() {
        let faces: Vec<GrayImage> = (0..2).map(pattern).collect();
        let result = EigenModel::fit(&faces, &[0], SIZE, 0);
        assert!(matches!(result, Err(ModelError::LabelCountMismatch { .. })));
    }

    #[test]
    fn test_single_sample_model() {
        let faces = vec![pattern(3)];
        let model = EigenModel::fit(&faces, &[9], SIZE, 0).unwrap();
        assert_eq!(model.num_components(), 0);
        let p = model.predict(&faces[0]).unwrap();
        assert_eq!(p.label, 9);
        assert_eq!(p.distance, 0.0);
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let faces: Vec<GrayImage> = (0..4).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[7, 8, 9, 10], SIZE, 0).unwrap();

        let path = scratch_file("faceRecognizer.json");
        model.save(&path).unwrap();
        let loaded = EigenModel::load(&path).unwrap();

        assert_eq!(loaded.labels(), model.labels());
        assert_eq!(loaded.num_components(), model.num_components());
        let p = loaded.predict(&faces[2]).unwrap();
        assert_eq!(p.label, 9);
        assert!(p.distance < 1e-6);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let result = EigenModel::load(Path::new("/nonexistent/faceRecognizer.json"));
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }

    /// Save a fitted model, then rewrite one field of its JSON.
    fn tampered_model(field: &str, value: serde_json::Value) -> std::path::PathBuf {
        let faces: Vec<GrayImage> = (0..2).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1], SIZE, 0).unwrap();
        let path = scratch_file("faceRecognizer.json");
        model.save(&path).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json[field] = value;
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_rejects_oversized_face_size() {
        let path = tampered_model("face_size", serde_json::json!(70_000));

        let result = EigenModel::load(&path);
        assert!(matches!(result, Err(ModelError::Malformed { .. })));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_rejects_zero_face_size() {
        let path = tampered_model("face_size", serde_json::json!(0));

        let result = EigenModel::load(&path);
        assert!(matches!(result, Err(ModelError::Malformed { .. })));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_pixel_count() {
        assert_eq!(pixel_count(100), Some(10_000));
        assert_eq!(pixel_count(70_000), 70_000usize.checked_mul(70_000));
        assert_eq!(pixel_count(u32::MAX), (u32::MAX as usize).checked_mul(u32::MAX as usize));
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let faces: Vec<GrayImage> = (0..2).map(pattern).collect();
        let model = EigenModel::fit(&faces, &[0, 1], SIZE, 0).unwrap();

        // A non-empty directory sits where the model should go, so the rename fails.
        let path = scratch_file("faceRecognizer.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let result = model.save(&path);
        assert!(matches!(result, Err(ModelError::Io(_))));
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.is_dir());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_malformed_file() {
        let path = scratch_file("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"not\": \"a model\"}").unwrap();

        let result = EigenModel::load(&path);
        assert!(matches!(result, Err(ModelError::Malformed { .. })));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
