use crate::error::{DetectError, Result};

pub const RGBA_CHANNELS: usize = 4;

/// A borrowed, tightly packed RGBA8 image.
///
/// This is the only pixel format the pipeline accepts: callers on the C side hand over
/// `width * height * 4` bytes, row-major, no stride padding.
#[derive(Clone, Copy, Debug)]
pub struct RgbaImageView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> RgbaImageView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        RgbaImageView {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes a `width x height` RGBA image occupies, if it fits in memory.
    pub fn required_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(RGBA_CHANNELS)
    }

    /// Rejects images the letterbox cannot sample (anything at or below 1x1 on either axis)
    /// and buffers that are shorter than the declared geometry.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 1 || self.height <= 1 {
            return Err(DetectError::invalid(format!(
                "invalid image size ({} x {})",
                self.width, self.height
            )));
        }
        let required = Self::required_len(self.width, self.height).ok_or_else(|| {
            DetectError::invalid(format!(
                "image size ({} x {}) overflows the address space",
                self.width, self.height
            ))
        })?;
        if self.data.len() < required {
            return Err(DetectError::invalid(format!(
                "image buffer holds {} bytes, {} x {} RGBA needs {}",
                self.data.len(),
                self.width,
                self.height,
                required
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Channel `c` of pixel (`x`, `y`) normalized to [0, 1].
    #[inline]
    pub(crate) fn sample(&self, x: usize, y: usize, c: usize) -> f32 {
        let idx = (y * self.width as usize + x) * RGBA_CHANNELS + c;
        self.data[idx] as f32 / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_sizes() {
        let data = vec![0_u8; 64];
        assert!(RgbaImageView::new(&data, 1, 4).validate().is_err());
        assert!(RgbaImageView::new(&data, 4, 1).validate().is_err());
        assert!(RgbaImageView::new(&data, 0, 0).validate().is_err());
        assert!(RgbaImageView::new(&data, 2, 2).validate().is_ok());
    }

    #[test]
    fn rejects_short_buffers() {
        let data = vec![0_u8; 15];
        let err = RgbaImageView::new(&data, 2, 2).validate().unwrap_err();
        assert!(err.to_string().contains("needs 16"));
    }

    #[test]
    fn sample_reads_rgba_layout() {
        let data: Vec<u8> = vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 0, 0, 0, 0];
        let view = RgbaImageView::new(&data, 2, 2);
        assert_eq!(view.sample(0, 0, 0), 1.0);
        assert_eq!(view.sample(1, 0, 1), 1.0);
        assert_eq!(view.sample(0, 1, 2), 1.0);
        assert_eq!(view.sample(1, 1, 0), 0.0);
    }
}
