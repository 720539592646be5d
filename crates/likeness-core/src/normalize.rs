//! Face normalization: crop a detection out of a grayscale frame and bring it to
//! the canonical square resolution the eigenface model works in.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::GrayImage;

/// Crop `face` out of `frame` and resize it to `size` × `size` (bilinear).
///
/// The box is clamped to the frame first; a box entirely outside the frame yields
/// a resize of the whole frame.
pub fn normalize_face(frame: &GrayImage, face: &BoundingBox, size: u32) -> GrayImage {
    let (width, height) = frame.dimensions();
    let clamped = BoundingBox::clamped(
        face.x as i64,
        face.y as i64,
        face.width as i64,
        face.height as i64,
        face.score,
        width,
        height,
    );

    match clamped {
        Some(b) => {
            let crop = imageops::crop_imm(frame, b.x, b.y, b.width, b.height).to_image();
            normalize_image(&crop, size)
        }
        None => normalize_image(frame, size),
    }
}

/// Resize a whole grayscale image to `size` × `size` (bilinear). No-op copy when it
/// already has that shape.
pub fn normalize_image(image: &GrayImage, size: u32) -> GrayImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_normalize_face_output_size() {
        let frame = GrayImage::from_pixel(640, 480, Luma([128]));
        let face = BoundingBox { x: 100, y: 80, width: 60, height: 70, score: 1.0 };
        let out = normalize_face(&frame, &face, 100);
        assert_eq!(out.dimensions(), (100, 100));
    }

    #[test]
    fn test_normalize_face_takes_the_boxed_region() {
        // Left half black, right half white; a box on the right half must come out white.
        let frame = GrayImage::from_fn(200, 100, |x, _| Luma([if x < 100 { 0 } else { 255 }]));
        let face = BoundingBox { x: 120, y: 10, width: 50, height: 50, score: 1.0 };
        let out = normalize_face(&frame, &face, 100);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_normalize_face_clamps_overhanging_box() {
        let frame = GrayImage::from_pixel(50, 50, Luma([77]));
        let face = BoundingBox { x: 30, y: 30, width: 100, height: 100, score: 1.0 };
        let out = normalize_face(&frame, &face, 100);
        assert_eq!(out.dimensions(), (100, 100));
        assert!(out.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn test_normalize_image_keeps_canonical_input() {
        let img = GrayImage::from_fn(100, 100, |x, y| Luma([((x + y) % 256) as u8]));
        assert_eq!(normalize_image(&img, 100), img);
    }
}
