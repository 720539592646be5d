//! Interactive enrollment: show the feed and save a face sample on each trigger.

use crate::pipeline::{PipelineError, Tick};
use crate::preview::{Overlay, Preview};
use likeness_core::{BoundingBox, FaceDetector, SampleStore};
use likeness_hw::Frame;

/// Counters for one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub saved: u32,
    pub failed: u32,
    pub frames: u64,
}

/// Default trigger: any key other than ESC.
pub fn trigger_on_key(tick: &Tick) -> bool {
    tick.key.is_some_and(|k| !k.is_escape())
}

pub struct CaptureSession<'a, D> {
    detector: D,
    store: &'a SampleStore,
    label: Option<i32>,
    max_samples: Option<u32>,
}

impl<'a, D: FaceDetector> CaptureSession<'a, D> {
    pub fn new(detector: D, store: &'a SampleStore) -> Self {
        Self {
            detector,
            store,
            label: None,
            max_samples: None,
        }
    }

    /// Name saved samples `image_<label>_<n>.jpg`.
    pub fn with_label(mut self, label: Option<i32>) -> Self {
        self.label = label;
        self
    }

    /// End the session once this many samples were saved.
    pub fn with_max_samples(mut self, max: Option<u32>) -> Self {
        self.max_samples = max;
        self
    }

    /// Loop over `frames` until `stop`, the sample limit, or the end of the
    /// source. On every frame where `trigger` fires the largest detected face is
    /// saved (the whole frame when none is found).
    ///
    /// A failed write is logged and the session continues.
    pub fn run<I, E, P, T, S>(
        &mut self,
        frames: I,
        preview: &mut P,
        mut trigger: T,
        mut stop: S,
    ) -> Result<CaptureSummary, PipelineError>
    where
        I: IntoIterator<Item = Result<Frame, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Preview + ?Sized,
        T: FnMut(&Tick) -> bool,
        S: FnMut(&Tick) -> bool,
    {
        let mut summary = CaptureSummary::default();
        tracing::info!(
            dir = %self.store.dir().display(),
            label = ?self.label,
            "capture session started"
        );

        for frame in frames {
            let frame = frame.map_err(|e| PipelineError::FrameSource(Box::new(e)))?;
            if frame.is_empty() {
                continue;
            }

            let gray = frame.to_gray();
            let faces = self.detector.detect(&gray)?;
            let target = largest(&faces);

            let overlays: Vec<Overlay> = target
                .iter()
                .map(|&bbox| Overlay {
                    bbox,
                    caption: None,
                })
                .collect();
            let key = preview.present(&frame.image, &overlays)?;
            let tick = Tick {
                iteration: summary.frames,
                key,
            };
            summary.frames += 1;

            if stop(&tick) {
                break;
            }
            if !trigger(&tick) {
                continue;
            }

            let crop = match target {
                Some(b) => image::imageops::crop_imm(&gray, b.x, b.y, b.width, b.height).to_image(),
                None => {
                    tracing::debug!(seq = frame.sequence, "no face found, saving whole frame");
                    gray
                }
            };

            match self.store.capture(&crop, self.label) {
                Ok(path) => {
                    summary.saved += 1;
                    println!("Saved image: {}", path.display());
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(error = %e, "failed to save sample");
                }
            }

            if self.max_samples.is_some_and(|max| summary.saved >= max) {
                tracing::info!(saved = summary.saved, "sample limit reached");
                break;
            }
        }

        tracing::info!(
            saved = summary.saved,
            failed = summary.failed,
            frames = summary.frames,
            "capture session finished"
        );
        Ok(summary)
    }
}

fn largest(faces: &[BoundingBox]) -> Option<BoundingBox> {
    faces.iter().copied().max_by_key(BoundingBox::area)
}

/// Trigger for sessions without a window: every frame.
pub fn trigger_always(_: &Tick) -> bool {
    true
}
