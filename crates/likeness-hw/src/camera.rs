//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, the usual uncompressed webcam format.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"MJPG" => Some(Self::Mjpg),
            _ => None,
        }
    }

    /// Turn one dequeued buffer into an RGB image.
    pub fn convert(self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
        match self {
            Self::Yuyv => frame::yuyv_to_rgb(buf, width, height),
            Self::Grey => frame::grey_to_rgb(buf, width, height),
            Self::Mjpg => frame::decode_mjpg(buf),
        }
    }
}

/// V4L2 camera device handle. The device is closed when the handle (or the
/// [`CameraFrames`] it was turned into) is dropped.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for uncompressed YUYV; accept MJPG or GREY if the driver insists.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG or GREY)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start streaming and hand the camera over to a frame iterator.
    ///
    /// The iterator never ends on its own; the camera is released when it is
    /// dropped.
    pub fn into_frames(self) -> Result<CameraFrames, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        Ok(CameraFrames {
            stream,
            camera: self,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Pull-based frame source over a streaming camera.
///
/// Each `next()` blocks until the driver hands out a buffer. Buffers without
/// payload, or that fail to decode, come out as [`Frame::empty`].
pub struct CameraFrames {
    // Declared before `camera` so the stream stops before the device closes.
    stream: MmapStream<'static>,
    camera: Camera,
}

impl CameraFrames {
    pub fn camera(&self) -> &Camera {
        &self.camera
    }
}

impl Iterator for CameraFrames {
    type Item = Result<Frame, CameraError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (buf, meta) = match self.stream.next() {
            Ok(item) => item,
            Err(e) => {
                return Some(Err(CameraError::CaptureFailed(format!(
                    "failed to dequeue buffer: {e}"
                ))))
            }
        };

        let sequence = meta.sequence;
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            tracing::trace!(seq = sequence, "empty buffer");
            return Some(Ok(Frame::empty(sequence)));
        }

        let camera = &self.camera;
        let frame = match camera
            .pixel_format
            .convert(&buf[..used], camera.width, camera.height)
        {
            Ok(image) => Frame::new(image, sequence),
            Err(e) => {
                tracing::debug!(seq = sequence, error = %e, "dropping undecodable frame");
                Frame::empty(sequence)
            }
        };
        Some(Ok(frame))
    }
}

impl Drop for CameraFrames {
    fn drop(&mut self) {
        tracing::info!(device = %self.camera.device_path, "camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_convert_grey_buffer() {
        let img = PixelFormat::Grey.convert(&[9; 12], 4, 3).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
    }

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open("/dev/video-does-not-exist");
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }
}
