//! likeness-hw: webcam capture for the recognition pipeline.
//!
//! Opens a V4L2 device and exposes it as a lazy, effectively endless iterator of
//! RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraFrames, PixelFormat};
pub use frame::Frame;
