use crate::annotations::bounding_box::BoundingBoxGeometry;
use crate::annotations::detection::Detection;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const KEYPOINT_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const KEYPOINT_RADIUS: i32 = 2;

/// Keypoints at or below this visibility are not drawn.
pub const MIN_KEYPOINT_VISIBILITY: f32 = 0.5;

/// Draws every detection (normalized coordinates) onto the image it was detected in.
pub fn draw_detections(image: &mut RgbaImage, detections: &[Detection]) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    for detection in detections {
        draw_hollow_rect_mut(image, pixel_rect(detection, img_w, img_h), BOX_COLOR);
        for kp in detection
            .keypoints
            .iter()
            .filter(|kp| kp.visibility > MIN_KEYPOINT_VISIBILITY)
        {
            let cx = clamp_to_pixel(kp.x * img_w as f32, img_w);
            let cy = clamp_to_pixel(kp.y * img_h as f32, img_h);
            draw_filled_circle_mut(image, (cx, cy), KEYPOINT_RADIUS, KEYPOINT_COLOR);
        }
    }
}

/// Pixel rectangle of a normalized detection, clamped to the image.
pub fn pixel_rect(detection: &Detection, img_w: u32, img_h: u32) -> Rect {
    let (left, top, right, bottom) = detection.as_xyxy();
    let max_x = (img_w.max(1) - 1) as f32;
    let max_y = (img_h.max(1) - 1) as f32;

    let x1 = (left * img_w as f32).clamp(0.0, max_x);
    let y1 = (top * img_h as f32).clamp(0.0, max_y);
    let x2 = (right * img_w as f32).clamp(0.0, max_x);
    let y2 = (bottom * img_h as f32).clamp(0.0, max_y);

    let width = (x2 - x1).max(1.0).round() as u32;
    let height = (y2 - y1).max(1.0).round() as u32;
    Rect::at(x1.round() as i32, y1.round() as i32).of_size(width, height)
}

#[inline]
fn clamp_to_pixel(value: f32, extent: u32) -> i32 {
    value.clamp(0.0, (extent.max(1) - 1) as f32).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::keypoint::Keypoint;

    #[test]
    fn rect_maps_normalized_box_to_pixels() {
        let det = Detection::new(0, 0.9, 0.5, 0.5, 0.5, 0.25);
        let rect = pixel_rect(&det, 200, 100);
        assert_eq!((rect.left(), rect.top()), (50, 38));
        assert_eq!((rect.width(), rect.height()), (100, 25));
    }

    #[test]
    fn rect_is_clamped_to_image() {
        let det = Detection::new(0, 0.9, 0.0, 1.0, 0.5, 0.5);
        let rect = pixel_rect(&det, 100, 100);
        assert_eq!((rect.left(), rect.top()), (0, 75));
        assert!(rect.right() <= 99 && rect.bottom() <= 99);
    }

    #[test]
    fn draws_box_outline_and_visible_keypoints() {
        let mut image = RgbaImage::new(100, 100);
        let det = Detection::new(0, 0.9, 0.5, 0.5, 0.4, 0.4).with_keypoints(vec![
            Keypoint::new(0.5, 0.5, 0.9),
            Keypoint::new(0.6, 0.6, 0.1),
        ]);
        draw_detections(&mut image, &[det]);

        assert_eq!(image.get_pixel(30, 30), &BOX_COLOR);
        assert_eq!(image.get_pixel(30, 50), &BOX_COLOR);
        assert_eq!(image.get_pixel(50, 50), &KEYPOINT_COLOR);
        assert_eq!(image.get_pixel(60, 60), &Rgba([0, 0, 0, 0]));
    }
}
