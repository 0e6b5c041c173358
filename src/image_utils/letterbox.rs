use crate::image_utils::rgba_view::RgbaImageView;
use ndarray::ArrayViewMut3;

/// Gray used by YOLO models for the letterbox border.
pub const PAD_VALUE: f32 = 114.0 / 255.0;

/// Number of planes written into the model input. Alpha is dropped.
pub const MODEL_CHANNELS: usize = 3;

/// The forward letterbox mapping of one image.
///
/// A point `p` of the original image lands at `p * scale + pad` in model-input pixels. The
/// decoder applies the exact inverse. The same `scale` is used on both axes because the
/// aspect ratio is preserved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeometricTransform {
    pub scale: f32,
    pub pad_left: u32,
    pub pad_top: u32,
}

impl GeometricTransform {
    /// Maps a model-input x coordinate back to the original image, normalized by its width.
    #[inline]
    pub fn unmap_x(&self, x: f32, image_width: u32) -> f32 {
        (x - self.pad_left as f32) / self.scale / image_width as f32
    }

    #[inline]
    pub fn unmap_y(&self, y: f32, image_height: u32) -> f32 {
        (y - self.pad_top as f32) / self.scale / image_height as f32
    }

    /// Extents are not shifted by the padding, only rescaled.
    #[inline]
    pub fn unmap_width(&self, width: f32, image_width: u32) -> f32 {
        width / self.scale / image_width as f32
    }

    #[inline]
    pub fn unmap_height(&self, height: f32, image_height: u32) -> f32 {
        height / self.scale / image_height as f32
    }

    /// Forward mapping of an original-image pixel coordinate into model-input space.
    #[inline]
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_left as f32,
            y * self.scale + self.pad_top as f32,
        )
    }
}

/// Letterbox geometry, before any pixel is touched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LetterboxGeometry {
    pub transform: GeometricTransform,
    pub new_width: u32,
    pub new_height: u32,
}

/// Computes where a `src_width x src_height` image lands inside a `target_width x target_height`
/// canvas. Returns `None` for images the preprocessor refuses (either side at or below 1) and
/// for empty targets.
pub fn letterbox_geometry(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> Option<LetterboxGeometry> {
    if src_width <= 1 || src_height <= 1 || target_width == 0 || target_height == 0 {
        return None;
    }
    let scale = (target_width as f32 / src_width as f32)
        .min(target_height as f32 / src_height as f32);

    let new_width = ((src_width as f32 * scale) as u32).min(target_width);
    let new_height = ((src_height as f32 * scale) as u32).min(target_height);

    Some(LetterboxGeometry {
        transform: GeometricTransform {
            scale,
            pad_left: (target_width - new_width) / 2,
            pad_top: (target_height - new_height) / 2,
        },
        new_width,
        new_height,
    })
}

/// Letterboxes one RGBA image into a planar `[3, H, W]` view of the model input.
///
/// The whole view is first filled with [`PAD_VALUE`]; the scaled image is then written with
/// bilinear sampling. At the last source row/column the sample base is clamped one pixel back
/// and the fraction forced to 1.0, which reads the edge pixel exactly.
///
/// Degenerate inputs leave `out` untouched and return the all-zero transform.
pub fn letterbox_into(image: &RgbaImageView, mut out: ArrayViewMut3<f32>) -> GeometricTransform {
    let (channels, target_height, target_width) = out.dim();
    if channels != MODEL_CHANNELS || !image.is_valid() {
        return GeometricTransform::default();
    }
    let geometry = match letterbox_geometry(
        image.width(),
        image.height(),
        target_width as u32,
        target_height as u32,
    ) {
        Some(g) => g,
        None => return GeometricTransform::default(),
    };
    let transform = geometry.transform;
    let src_width = image.width() as usize;
    let src_height = image.height() as usize;
    let pad_left = transform.pad_left as usize;
    let pad_top = transform.pad_top as usize;

    out.fill(PAD_VALUE);

    for y in 0..geometry.new_height as usize {
        let (src_y, y_lerp) = source_coordinate(y, transform.scale, src_height);
        for x in 0..geometry.new_width as usize {
            let (src_x, x_lerp) = source_coordinate(x, transform.scale, src_width);
            for c in 0..MODEL_CHANNELS {
                let v00 = image.sample(src_x, src_y, c);
                let v01 = image.sample(src_x + 1, src_y, c);
                let v10 = image.sample(src_x, src_y + 1, c);
                let v11 = image.sample(src_x + 1, src_y + 1, c);

                let v0 = v00 * (1.0 - x_lerp) + v01 * x_lerp;
                let v1 = v10 * (1.0 - x_lerp) + v11 * x_lerp;
                out[[c, y + pad_top, x + pad_left]] = v0 * (1.0 - y_lerp) + v1 * y_lerp;
            }
        }
    }
    transform
}

/// Source sample base and interpolation fraction for destination index `dst`.
#[inline]
fn source_coordinate(dst: usize, scale: f32, src_len: usize) -> (usize, f32) {
    let src_f = dst as f32 / scale;
    let src = src_f as usize;
    if src >= src_len - 1 {
        (src_len - 2, 1.0)
    } else {
        (src, src_f - src as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, s};

    fn solid_rgba(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    #[test]
    fn geometry_touches_long_axis() {
        for &(w, h) in &[(1920_u32, 1080_u32), (1280, 720), (800, 600), (300, 600), (640, 480)] {
            let g = letterbox_geometry(w, h, 640, 640).unwrap();
            assert!(g.new_width <= 640 && g.new_height <= 640);
            assert!(g.new_width == 640 || g.new_height == 640, "{}x{}", w, h);
            assert_eq!(g.transform.pad_left, (640 - g.new_width) / 2);
            assert_eq!(g.transform.pad_top, (640 - g.new_height) / 2);
        }
    }

    #[test]
    fn geometry_of_wide_image() {
        let g = letterbox_geometry(1280, 720, 640, 640).unwrap();
        assert_eq!(g.transform.scale, 0.5);
        assert_eq!((g.new_width, g.new_height), (640, 360));
        assert_eq!((g.transform.pad_left, g.transform.pad_top), (0, 140));
    }

    #[test]
    fn geometry_rejects_degenerate() {
        assert!(letterbox_geometry(1, 10, 640, 640).is_none());
        assert!(letterbox_geometry(10, 1, 640, 640).is_none());
        assert!(letterbox_geometry(10, 10, 0, 640).is_none());
    }

    #[test]
    fn padding_is_gray_and_image_is_normalized() {
        let data = solid_rgba(8, 4, [255, 0, 51, 7]);
        let view = RgbaImageView::new(&data, 8, 4);
        let mut out = Array3::<f32>::zeros((3, 16, 16));
        let t = letterbox_into(&view, out.view_mut());

        assert_eq!(t.scale, 2.0);
        assert_eq!((t.pad_left, t.pad_top), (0, 4));
        // Top and bottom borders.
        assert!(out.slice(s![.., 0..4, ..]).iter().all(|&v| v == PAD_VALUE));
        assert!(out.slice(s![.., 12..16, ..]).iter().all(|&v| v == PAD_VALUE));
        // Scaled region keeps the solid colour, alpha dropped.
        for y in 4..12 {
            for x in 0..16 {
                assert!((out[[0, y, x]] - 1.0).abs() < 1e-6);
                assert!(out[[1, y, x]].abs() < 1e-6);
                assert!((out[[2, y, x]] - 0.2).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn bilinear_interpolates_between_columns() {
        // Two columns, black then white, upscaled 4x horizontally.
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend_from_slice(&[0, 0, 0, 255, 255, 255, 255, 255]);
        }
        let view = RgbaImageView::new(&data, 2, 2);
        let mut out = Array3::<f32>::zeros((3, 8, 8));
        letterbox_into(&view, out.view_mut());

        assert_eq!(out[[0, 0, 0]], 0.0);
        assert!((out[[0, 0, 1]] - 0.25).abs() < 1e-6);
        assert!((out[[0, 0, 2]] - 0.5).abs() < 1e-6);
        // Past the last full source column the edge pixel is read exactly.
        assert_eq!(out[[0, 0, 4]], 1.0);
        assert_eq!(out[[0, 0, 7]], 1.0);
    }

    #[test]
    fn degenerate_image_leaves_buffer_untouched() {
        let data = solid_rgba(1, 1, [1, 2, 3, 4]);
        let view = RgbaImageView::new(&data, 1, 1);
        let mut out = Array3::<f32>::zeros((3, 4, 4));
        let t = letterbox_into(&view, out.view_mut());
        assert_eq!(t, GeometricTransform::default());
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn forward_and_inverse_agree() {
        let g = letterbox_geometry(1920, 1080, 640, 640).unwrap();
        let t = g.transform;
        let (mx, my) = t.map_point(960.0, 540.0);
        assert!((t.unmap_x(mx, 1920) - 0.5).abs() < 1e-4);
        assert!((t.unmap_y(my, 1080) - 0.5).abs() < 1e-4);
    }
}
