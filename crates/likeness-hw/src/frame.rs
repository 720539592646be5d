//! Frame type and pixel-format conversion from YUYV, GREY and MJPG to RGB.

use image::{GrayImage, RgbImage};

/// A captured camera frame.
///
/// Drivers occasionally hand out buffers with no payload; those become empty
/// frames (zero-sized image) that consumers skip.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    pub fn empty(sequence: u32) -> Self {
        Self::new(RgbImage::new(0, 0), sequence)
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Luma copy of the frame for detection.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(to_u8(y + 1.402 * v));
            rgb.push(to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(to_u8(y + 1.772 * u));
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Expand 8-bit grayscale to RGB.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    let gray = GrayImage::from_raw(width, height, grey[..expected].to_vec()).ok_or(
        FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        },
    )?;
    Ok(image::DynamicImage::ImageLuma8(gray).to_rgb8())
}

/// Decode one Motion-JPEG frame.
pub fn decode_mjpg(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([100, 100, 100]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // Strong V pushes red up and green down.
        let yuyv = vec![128, 128, 128, 228];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let px = rgb.get_pixel(0, 0);
        assert!(px[0] > 200, "red = {}", px[0]);
        assert!(px[1] < 100, "green = {}", px[1]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[0, 50, 255, 7], 2, 2).unwrap();
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([50, 50, 50]));
        assert_eq!(rgb.get_pixel(0, 1), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_grey_invalid_length() {
        assert!(grey_to_rgb(&[1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_decode_mjpg_rejects_garbage() {
        assert!(matches!(decode_mjpg(b"definitely not jpeg"), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_decode_mjpg_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(32, 24, Rgb([10, 120, 200]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        let decoded = decode_mjpg(buf.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty(3);
        assert!(frame.is_empty());
        assert!(!Frame::new(RgbImage::new(4, 4), 0).is_empty());
    }

    #[test]
    fn test_to_gray_dimensions() {
        let frame = Frame::new(RgbImage::from_pixel(6, 4, Rgb([90, 90, 90])), 0);
        let gray = frame.to_gray();
        assert_eq!(gray.dimensions(), (6, 4));
        assert!(gray.pixels().all(|p| p[0].abs_diff(90) <= 1));
    }
}
