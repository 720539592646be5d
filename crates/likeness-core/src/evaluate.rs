//! Batch accuracy over a directory of labelled test images (`image_<label>.jpg`).

use crate::detector::{DetectorError, FaceDetector};
use crate::model::{ModelError, Recognizer};
use crate::normalize::normalize_face;
use crate::samples::jpeg_files;
use crate::types::{label_from_file_name, LabelParseError};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("test set {0} contains no .jpg images")]
    EmptyTestSet(String),
    #[error("malformed test file name: {0}")]
    MalformedFileName(#[from] LabelParseError),
    #[error("test directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read test image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Outcome of one evaluation run. `total` is the number of test images and is
/// never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    /// Faces found across all images; can differ from `total`.
    pub faces: usize,
}

impl Evaluation {
    /// Correct predictions per test image, in percent.
    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / self.total as f64 * 100.0
    }
}

/// Detect and recognize every face of every test image in `dir`.
///
/// A prediction counts as correct when its label equals the label parsed from the
/// image's file name. Any file whose name does not carry a label aborts the run.
pub fn evaluate<D, R>(
    dir: &Path,
    detector: &mut D,
    recognizer: &R,
    face_size: u32,
) -> Result<Evaluation, EvalError>
where
    D: FaceDetector + ?Sized,
    R: Recognizer + ?Sized,
{
    let files = jpeg_files(dir).map_err(|source| EvalError::Directory {
        path: dir.display().to_string(),
        source,
    })?;
    if files.is_empty() {
        return Err(EvalError::EmptyTestSet(dir.display().to_string()));
    }

    let mut correct = 0usize;
    let mut faces = 0usize;

    for path in &files {
        let expected = label_from_file_name(path)?;
        let gray = image::open(path)
            .map_err(|source| EvalError::Image {
                path: path.display().to_string(),
                source,
            })?
            .to_luma8();

        for face in detector.detect(&gray)? {
            faces += 1;
            let crop = normalize_face(&gray, &face, face_size);
            let prediction = recognizer.predict(&crop)?;
            tracing::debug!(
                file = %path.display(),
                expected,
                predicted = prediction.label,
                distance = prediction.distance,
                "evaluated face"
            );
            if prediction.label == expected {
                correct += 1;
            }
        }
    }

    let evaluation = Evaluation {
        correct,
        total: files.len(),
        faces,
    };
    tracing::info!(
        correct,
        total = evaluation.total,
        faces,
        accuracy = evaluation.accuracy(),
        "evaluation finished"
    );
    Ok(evaluation)
}
