//! Debug preview of the annotated camera feed.
//!
//! The default build is headless: overlays go to the log and no key is ever
//! reported. With the `highgui` feature the frame is shown in an OpenCV window and
//! the key pressed during the short wait is handed back to the loop.

use image::RgbImage;
use likeness_core::BoundingBox;
use thiserror::Error;

/// Failures of a display backend. The headless preview never fails.
#[derive(Error, Debug)]
pub enum PreviewError {
    #[cfg(feature = "highgui")]
    #[error("highgui: {0}")]
    Highgui(#[from] opencv::Error),
}

/// Key code reported by the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key(pub i32);

impl Key {
    pub const ESC: Key = Key(27);

    pub fn is_escape(self) -> bool {
        self == Self::ESC
    }
}

/// A box to draw, with an optional caption above it.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub caption: Option<String>,
}

pub trait Preview {
    /// Show one frame with its overlays; returns the key pressed, if any.
    fn present(
        &mut self,
        frame: &RgbImage,
        overlays: &[Overlay],
    ) -> Result<Option<Key>, PreviewError>;
}

impl<P: Preview + ?Sized> Preview for Box<P> {
    fn present(
        &mut self,
        frame: &RgbImage,
        overlays: &[Overlay],
    ) -> Result<Option<Key>, PreviewError> {
        (**self).present(frame, overlays)
    }
}

#[cfg(any(test, feature = "highgui"))]
pub use draw::draw_overlays;

#[cfg(any(test, feature = "highgui"))]
mod draw {
    use super::Overlay;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_hollow_rect_mut;
    use imageproc::rect::Rect;

    pub(super) const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
    const BOX_THICKNESS: u32 = 2;

    /// Draw green face boxes onto `image`.
    pub fn draw_overlays(image: &mut RgbImage, overlays: &[Overlay]) {
        for overlay in overlays {
            let b = &overlay.bbox;
            for inset in 0..BOX_THICKNESS {
                let w = b.width.saturating_sub(2 * inset);
                let h = b.height.saturating_sub(2 * inset);
                if w == 0 || h == 0 {
                    break;
                }
                let rect = Rect::at((b.x + inset) as i32, (b.y + inset) as i32).of_size(w, h);
                draw_hollow_rect_mut(image, rect, BOX_COLOR);
            }
        }
    }
}

/// Preview without a display: logs overlays at debug level.
#[derive(Debug, Default)]
pub struct HeadlessPreview {
    frames: u64,
}

impl HeadlessPreview {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preview for HeadlessPreview {
    fn present(
        &mut self,
        frame: &RgbImage,
        overlays: &[Overlay],
    ) -> Result<Option<Key>, PreviewError> {
        self.frames += 1;
        for overlay in overlays {
            tracing::debug!(
                frame = self.frames,
                x = overlay.bbox.x,
                y = overlay.bbox.y,
                width = overlay.bbox.width,
                height = overlay.bbox.height,
                caption = overlay.caption.as_deref().unwrap_or(""),
                "face"
            );
        }
        tracing::trace!(
            frame = self.frames,
            width = frame.width(),
            height = frame.height(),
            "frame presented"
        );
        Ok(None)
    }
}

#[cfg(feature = "highgui")]
pub use window::HighguiPreview;

#[cfg(feature = "highgui")]
mod window {
    use super::{draw_overlays, Key, Overlay, Preview, PreviewError};
    use image::RgbImage;
    use opencv::core::{Mat, Point, Scalar, CV_8UC3};
    use opencv::prelude::*;
    use opencv::{highgui, imgproc};

    /// Milliseconds to wait for a key after each frame.
    const KEY_WAIT_MS: i32 = 10;

    /// OpenCV highgui window.
    pub struct HighguiPreview {
        window: String,
    }

    impl HighguiPreview {
        pub fn new(window: &str) -> Result<Self, PreviewError> {
            highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
            tracing::info!(window, "preview window opened");
            Ok(Self {
                window: window.to_string(),
            })
        }
    }

    impl Preview for HighguiPreview {
        fn present(
            &mut self,
            frame: &RgbImage,
            overlays: &[Overlay],
        ) -> Result<Option<Key>, PreviewError> {
            let mut annotated = frame.clone();
            draw_overlays(&mut annotated, overlays);
            let mut mat = to_bgr_mat(&annotated)?;

            for overlay in overlays {
                let Some(caption) = overlay.caption.as_deref() else {
                    continue;
                };
                let origin = Point::new(overlay.bbox.x as i32, overlay.bbox.y as i32 - 10);
                imgproc::put_text(
                    &mut mat,
                    caption,
                    origin,
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.5,
                    Scalar::new(0.0, 0.0, 255.0, 0.0),
                    1,
                    imgproc::LINE_8,
                    false,
                )?;
            }

            highgui::imshow(&self.window, &mat)?;
            let key = highgui::wait_key(KEY_WAIT_MS)?;
            Ok((key >= 0).then_some(Key(key & 0xff)))
        }
    }

    impl Drop for HighguiPreview {
        fn drop(&mut self) {
            if let Err(e) = highgui::destroy_window(&self.window) {
                tracing::warn!(error = %e, "failed to close preview window");
            }
        }
    }

    fn to_bgr_mat(image: &RgbImage) -> Result<Mat, PreviewError> {
        let mut mat = Mat::new_rows_cols_with_default(
            image.height() as i32,
            image.width() as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        let bytes = mat.data_bytes_mut()?;
        for (dst, px) in bytes.chunks_exact_mut(3).zip(image.pixels()) {
            dst[0] = px[2];
            dst[1] = px[1];
            dst[2] = px[0];
        }
        Ok(mat)
    }
}
