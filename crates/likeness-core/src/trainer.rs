//! Builds an [`EigenModel`] from the sample store and persists it.

use crate::model::{EigenModel, ModelError};
use crate::normalize::normalize_image;
use crate::types::{Sample, CANONICAL_FACE_SIZE};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("no training images found; capture some samples first")]
    NoSamples,
    #[error("failed to read sample {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Full-rebuild trainer. Every run reads all samples again; nothing is incremental.
#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    face_size: u32,
    num_components: usize,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(CANONICAL_FACE_SIZE, 0)
    }
}

impl Trainer {
    pub fn new(face_size: u32, num_components: usize) -> Self {
        Self {
            face_size,
            num_components,
        }
    }

    /// Load, normalize and fit every sample.
    pub fn train(&self, samples: &[Sample]) -> Result<EigenModel, TrainError> {
        if samples.is_empty() {
            return Err(TrainError::NoSamples);
        }

        let mut faces = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());

        for sample in samples {
            let gray = image::open(&sample.path)
                .map_err(|source| TrainError::Image {
                    path: sample.path.display().to_string(),
                    source,
                })?
                .to_luma8();
            faces.push(normalize_image(&gray, self.face_size));
            labels.push(sample.label);
        }

        tracing::debug!(samples = faces.len(), "training images loaded");
        Ok(EigenModel::fit(&faces, &labels, self.face_size, self.num_components)?)
    }

    /// Train and write the model to `model_path`, replacing any previous model.
    ///
    /// Nothing is written when training fails, so an existing model stays usable.
    pub fn train_and_save(
        &self,
        samples: &[Sample],
        model_path: &Path,
    ) -> Result<EigenModel, TrainError> {
        let model = self.train(samples)?;
        model.save(model_path)?;
        tracing::info!(
            path = %model_path.display(),
            samples = samples.len(),
            "training complete"
        );
        Ok(model)
    }
}
