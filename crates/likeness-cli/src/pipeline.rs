//! Live recognition loop: frames → detection → normalization → recognition →
//! annotated preview.

use crate::preview::{Key, Overlay, Preview, PreviewError};
use likeness_core::detector::DetectorError;
use likeness_core::model::ModelError;
use likeness_core::samples::SampleError;
use likeness_core::trainer::TrainError;
use likeness_core::{
    normalize_face, EigenModel, FaceDetector, LabelPolicy, Recognizer, SampleStore, Trainer,
};
use likeness_hw::Frame;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no recognizer model loaded")]
    NotReady,
    #[error("frame source: {0}")]
    FrameSource(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Model(#[from] ModelError),
    #[error("training failed: {0}")]
    Train(#[from] TrainError),
    #[error("sample store: {0}")]
    Samples(#[from] SampleError),
    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),
}

/// Lifecycle of a [`LivePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No recognizer yet.
    AwaitingModel,
    /// Recognizer loaded, not looping.
    Ready,
    Running,
    /// The last run ended; a new frame source can start another one.
    Stopped,
}

/// What the stop predicate sees once per loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based index of the presented (non-empty) frame.
    pub iteration: u64,
    pub key: Option<Key>,
}

/// The default stop predicate: the ESC key.
pub fn stop_on_escape(tick: &Tick) -> bool {
    tick.key.is_some_and(Key::is_escape)
}

/// Counters for one [`LivePipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub empty_frames: u64,
    pub faces: u64,
}

pub struct LivePipeline<D, R> {
    detector: D,
    recognizer: Option<R>,
    face_size: u32,
    threshold_distance: f64,
    state: PipelineState,
}

impl<D: FaceDetector, R: Recognizer> LivePipeline<D, R> {
    /// A pipeline waiting for its recognizer.
    pub fn new(detector: D, face_size: u32, threshold_distance: f64) -> Self {
        Self {
            detector,
            recognizer: None,
            face_size,
            threshold_distance,
            state: PipelineState::AwaitingModel,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Attach a recognizer; the pipeline becomes `Ready`.
    pub fn install(&mut self, recognizer: R) {
        self.recognizer = Some(recognizer);
        self.state = PipelineState::Ready;
    }

    /// Run until `stop` says so, the frame source ends, or something fails.
    ///
    /// `frames` is consumed: whatever owns the camera is dropped exactly once when
    /// this returns, on every path.
    pub fn run<I, E, P, S>(
        &mut self,
        frames: I,
        preview: &mut P,
        mut stop: S,
    ) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = Result<Frame, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Preview + ?Sized,
        S: FnMut(&Tick) -> bool,
    {
        if self.recognizer.is_none() {
            return Err(PipelineError::NotReady);
        }

        self.state = PipelineState::Running;
        tracing::info!("live recognition started");

        let frames = frames.into_iter();
        let result = self.run_loop(frames, preview, &mut stop);

        self.state = PipelineState::Stopped;
        match &result {
            Ok(summary) => tracing::info!(
                frames = summary.frames,
                empty_frames = summary.empty_frames,
                faces = summary.faces,
                "live recognition stopped"
            ),
            Err(e) => tracing::error!(error = %e, "live recognition aborted"),
        }
        result
    }

    fn run_loop<I, E, P, S>(
        &mut self,
        frames: I,
        preview: &mut P,
        stop: &mut S,
    ) -> Result<RunSummary, PipelineError>
    where
        I: Iterator<Item = Result<Frame, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Preview + ?Sized,
        S: FnMut(&Tick) -> bool,
    {
        let mut summary = RunSummary::default();

        for frame in frames {
            let frame = frame.map_err(|e| PipelineError::FrameSource(Box::new(e)))?;
            if frame.is_empty() {
                summary.empty_frames += 1;
                continue;
            }

            let overlays = self.annotate(&frame)?;
            summary.faces += overlays.len() as u64;

            let key = preview.present(&frame.image, &overlays)?;
            let tick = Tick {
                iteration: summary.frames,
                key,
            };
            summary.frames += 1;

            if stop(&tick) {
                break;
            }
        }

        Ok(summary)
    }

    /// Detect, normalize and recognize every face of one frame.
    fn annotate(&mut self, frame: &Frame) -> Result<Vec<Overlay>, PipelineError> {
        let recognizer = self.recognizer.as_ref().ok_or(PipelineError::NotReady)?;
        let gray = frame.to_gray();

        let mut overlays = Vec::new();
        for face in self.detector.detect(&gray)? {
            let crop = normalize_face(&gray, &face, self.face_size);
            let prediction = recognizer.predict(&crop)?;
            let confidence = prediction.confidence(self.threshold_distance);

            println!(
                "Predicted label: {} with distance: {:.2}",
                prediction.label, prediction.distance
            );
            tracing::debug!(
                seq = frame.sequence,
                label = prediction.label,
                distance = prediction.distance,
                confidence,
                "face recognized"
            );

            overlays.push(Overlay {
                bbox: face,
                caption: Some(format!("ID: {}, Conf: {confidence:.2}%", prediction.label)),
            });
        }
        Ok(overlays)
    }
}

impl<D: FaceDetector> LivePipeline<D, EigenModel> {
    /// Load the model from `model_path`, or train one from `store` if the file
    /// does not exist yet. Blocks until the pipeline is `Ready`.
    pub fn load_or_train(
        &mut self,
        model_path: &Path,
        store: &SampleStore,
        policy: LabelPolicy,
        trainer: &Trainer,
    ) -> Result<(), PipelineError> {
        let model = if model_path.exists() {
            EigenModel::load(model_path)?
        } else {
            tracing::info!(
                path = %model_path.display(),
                "no model on disk, training from samples"
            );
            let samples = store.list(policy)?;
            trainer.train_and_save(&samples, model_path)?
        };
        self.install(model);
        Ok(())
    }
}
