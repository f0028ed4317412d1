use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::core::types::Detection;

/// Box colours cycled by class id
const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
];

/// Decode an image from bytes on the blocking pool.
///
/// Image decoding is CPU-intensive, especially for large phone photos.
pub async fn load_image_from_memory_async(bytes: Vec<u8>) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).context("Failed to load image from memory")
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// Draw detection boxes onto a copy of `img`.
///
/// Each box is drawn `thickness` pixels wide with a small filled tab in the
/// top-left corner whose width grows with confidence.
pub fn draw_detections(img: &DynamicImage, detections: &[Detection], thickness: u32) -> RgbImage {
    let mut canvas = img.to_rgb8();
    let (width, height) = canvas.dimensions();

    for detection in detections {
        let color = class_color(detection.class_id);
        let x1 = detection.bbox[0].max(0.0) as i32;
        let y1 = detection.bbox[1].max(0.0) as i32;
        let x2 = (detection.bbox[2].min(width as f32) as i32).max(x1 + 1);
        let y2 = (detection.bbox[3].min(height as f32) as i32).max(y1 + 1);

        for t in 0..thickness as i32 {
            let w = x2 - x1 - 2 * t;
            let h = y2 - y1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32),
                color,
            );
        }

        let tab_w = ((x2 - x1) as f32 * detection.confidence).max(1.0) as u32;
        let tab_h = (thickness * 3).min((y2 - y1) as u32).max(1);
        draw_filled_rect_mut(&mut canvas, Rect::at(x1, y1).of_size(tab_w, tab_h), color);
    }

    canvas
}

/// YOLO label text for `detections`: `class cx cy w h conf`, normalised
pub fn to_yolo_labels(detections: &[Detection], width: u32, height: u32) -> String {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    detections
        .iter()
        .map(|d| {
            let cx = (d.bbox[0] + d.bbox[2]) / 2.0 / w;
            let cy = (d.bbox[1] + d.bbox[3]) / 2.0 / h;
            format!(
                "{} {:.6} {:.6} {:.6} {:.6} {:.6}\n",
                d.class_id,
                cx,
                cy,
                d.width() / w,
                d.height() / h,
                d.confidence
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_load_image_async() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
        let mut png_bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .unwrap();

        let result = load_image_from_memory_async(png_bytes).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_load_garbage_fails() {
        let result = load_image_from_memory_async(b"not an image".to_vec()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_draw_detections_marks_box_edges() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])));
        let detections = vec![Detection {
            class_id: 0,
            confidence: 0.5,
            bbox: [10.0, 10.0, 40.0, 40.0],
        }];

        let out = draw_detections(&img, &detections, 2);
        assert_eq!(*out.get_pixel(39, 25), class_color(0));
        assert_eq!(*out.get_pixel(25, 25), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_yolo_labels_are_normalised() {
        let detections = [Detection {
            class_id: 1,
            confidence: 0.5,
            bbox: [10.0, 20.0, 30.0, 60.0],
        }];

        let text = to_yolo_labels(&detections, 100, 200);

        assert_eq!(text, "1 0.200000 0.200000 0.200000 0.200000 0.500000\n");
        assert!(to_yolo_labels(&[], 10, 10).is_empty());
    }
}
