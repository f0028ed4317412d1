// Aspect-preserving resize onto a square grey canvas (YOLOv8 input convention)

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use tracing::trace;

/// Canvas fill value used by the Ultralytics exporter
const PAD_VALUE: u8 = 114;

/// Geometry of one letterboxed image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub orig_width: u32,
    pub orig_height: u32,
    pub target: u32,
    pub scale: f32,
    pub new_width: u32,
    pub new_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(orig_width: u32, orig_height: u32, target: u32) -> Self {
        let scale = (target as f32 / orig_width as f32).min(target as f32 / orig_height as f32);
        let new_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target);
        let new_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target);

        // Same rounding as the exporter's LetterBox transform
        let pad_x = ((target - new_width) as f32 / 2.0 - 0.1).round().max(0.0) as u32;
        let pad_y = ((target - new_height) as f32 / 2.0 - 0.1).round().max(0.0) as u32;

        Self {
            orig_width,
            orig_height,
            target,
            scale,
            new_width,
            new_height,
            pad_x,
            pad_y,
        }
    }

    /// Map a canvas point back to original-image pixels, clipped to the image
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let ox = (x - self.pad_x as f32) / self.scale;
        let oy = (y - self.pad_y as f32) / self.scale;
        (
            ox.clamp(0.0, self.orig_width as f32),
            oy.clamp(0.0, self.orig_height as f32),
        )
    }

    /// Build the `[1, 3, target, target]` RGB tensor scaled to `[0, 1]`
    pub fn tensor(&self, img: &DynamicImage) -> Array4<f32> {
        trace!(
            "Letterbox {}x{} -> {}x{} on {}x{} (pad {}, {})",
            self.orig_width,
            self.orig_height,
            self.new_width,
            self.new_height,
            self.target,
            self.target,
            self.pad_x,
            self.pad_y
        );

        let resized = img
            .resize_exact(self.new_width, self.new_height, FilterType::Triangle)
            .to_rgb8();

        let target = self.target as usize;
        let mut array = Array4::<f32>::from_elem((1, 3, target, target), PAD_VALUE as f32 / 255.0);

        let (x0, y0) = (self.pad_x as usize, self.pad_y as usize);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (cx, cy) = (x0 + x as usize, y0 + y as usize);
            if cx >= target || cy >= target {
                continue;
            }
            array[[0, 0, cy, cx]] = pixel[0] as f32 / 255.0;
            array[[0, 1, cy, cx]] = pixel[1] as f32 / 255.0;
            array[[0, 2, cy, cx]] = pixel[2] as f32 / 255.0;
        }

        array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn to_canvas(lb: &Letterbox, x: f32, y: f32) -> (f32, f32) {
        (x * lb.scale + lb.pad_x as f32, y * lb.scale + lb.pad_y as f32)
    }

    #[test]
    fn test_landscape_image_is_padded_vertically() {
        let lb = Letterbox::new(1280, 720, 640);
        assert_eq!(lb.new_width, 640);
        assert_eq!(lb.new_height, 360);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 140);
        assert!((lb.scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_within_a_pixel() {
        let lb = Letterbox::new(1000, 1500, 640);
        for &(x, y) in &[(0.0, 0.0), (500.0, 750.0), (999.0, 1499.0), (123.4, 987.6)] {
            let (cx, cy) = to_canvas(&lb, x, y);
            let (ox, oy) = lb.to_original(cx, cy);
            assert!((ox - x).abs() <= 1.0, "x: {} vs {}", ox, x);
            assert!((oy - y).abs() <= 1.0, "y: {} vs {}", oy, y);
        }
    }

    #[test]
    fn test_to_original_clips_to_image() {
        let lb = Letterbox::new(100, 50, 64);
        let (x, y) = lb.to_original(-10.0, 1000.0);
        assert_eq!(x, 0.0);
        assert_eq!(y, 50.0);
    }

    #[test]
    fn test_tensor_layout_and_padding() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let lb = Letterbox::new(64, 32, 64);
        let tensor = lb.tensor(&img);

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        // padded row above the image
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        // centre pixel is red
        assert!((tensor[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 32, 32]].abs() < 1e-6);
    }
}
