//! likeness-core: face detection, eigenface training and recognition.
//!
//! Faces are found with a pretrained funnel-structured cascade (`rustface`),
//! normalized to a 100×100 grayscale crop and classified by nearest neighbour in
//! an eigenface (PCA) space learned from the enrolled samples.

pub mod detector;
pub mod eigen;
pub mod evaluate;
pub mod model;
pub mod normalize;
pub mod samples;
pub mod trainer;
pub mod types;

pub use detector::{CascadeDetector, CascadeParams, FaceDetector};
pub use evaluate::{evaluate, Evaluation};
pub use model::{EigenModel, Recognizer};
pub use normalize::{normalize_face, normalize_image};
pub use samples::SampleStore;
pub use trainer::Trainer;
pub use types::{
    confidence_percent, BoundingBox, LabelPolicy, Prediction, Sample, CANONICAL_FACE_SIZE,
    DEFAULT_THRESHOLD_DISTANCE,
};
