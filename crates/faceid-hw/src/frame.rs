//! Frame type and pixel conversion: YUYV, GREY and MJPG to RGB, dark detection, ROI crop.

use image::{ImageFormat, RgbImage};

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = (self.width() * self.height()) as usize;
        if pixels == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p.0)).sum::<f32>() / pixels as f32
    }

    /// Check whether more than `threshold_pct` of pixels have luma below 32.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        let pixels = (self.width() * self.height()) as usize;
        if pixels == 0 {
            return true;
        }
        let dark = self.image.pixels().filter(|p| luma(p.0) < 32.0).count();
        (dark as f32 / pixels as f32) > threshold_pct
    }

    /// Copy out the region of interest, clamped to the frame bounds.
    ///
    /// Fails only when the region and the frame do not overlap at all.
    pub fn crop(&self, roi: Roi) -> Result<RgbImage, FrameError> {
        let (w, h) = self.image.dimensions();
        let x1 = roi.x.saturating_add(roi.width).min(w);
        let y1 = roi.y.saturating_add(roi.height).min(h);
        if roi.x >= x1 || roi.y >= y1 {
            return Err(FrameError::RoiOutsideFrame {
                roi,
                width: w,
                height: h,
            });
        }
        Ok(image::imageops::crop_imm(&self.image, roi.x, roi.y, x1 - roi.x, y1 - roi.y).to_image())
    }
}

/// Rectangular region of interest in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Convert packed YUYV (4:2:2) to RGB24.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344_136 * u - 0.714_136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

/// Replicate 8-bit grayscale into RGB24.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}

/// Decode a motion-JPEG frame.
pub fn mjpg_to_rgb(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8())
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("region {roi:?} lies outside the {width}x{height} frame")]
    RoiOutsideFrame { roi: Roi, width: u32, height: u32 },
    #[error("failed to decode MJPG frame: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(image: RgbImage) -> Frame {
        Frame {
            image,
            sequence: 0,
        }
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 255], 2, 1).unwrap();
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 128);
        assert_eq!(rgb[2], 128);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_ignores_trailing_bytes() {
        let rgb = yuyv_to_rgb(&[10, 128, 20, 128, 99, 99], 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
    }

    #[test]
    fn test_grey_to_rgb() {
        assert_eq!(grey_to_rgb(&[7, 9], 2, 1).unwrap(), vec![7, 7, 7, 9, 9, 9]);
        assert!(grey_to_rgb(&[7], 2, 1).is_err());
    }

    #[test]
    fn test_mjpg_decode() {
        let img = RgbImage::from_pixel(16, 8, Rgb([200, 200, 200]));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        img.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();

        let decoded = mjpg_to_rgb(jpeg.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
        assert!(mjpg_to_rgb(b"garbage").is_err());
    }

    #[test]
    fn test_crop_inside_frame() {
        let img = RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]));
        let roi = Roi { x: 200, y: 120, width: 250, height: 250 };
        let crop = frame(img).crop(roi).unwrap();
        assert_eq!(crop.dimensions(), (250, 250));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([200, 120, 0]));
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let img = RgbImage::new(320, 240);
        let roi = Roi { x: 200, y: 120, width: 250, height: 250 };
        let crop = frame(img).crop(roi).unwrap();
        assert_eq!(crop.dimensions(), (120, 120));
    }

    #[test]
    fn test_crop_outside_frame_fails() {
        let img = RgbImage::new(160, 120);
        let roi = Roi { x: 200, y: 120, width: 250, height: 250 };
        assert!(matches!(
            frame(img).crop(roi),
            Err(FrameError::RoiOutsideFrame { width: 160, height: 120, .. })
        ));
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(frame(RgbImage::new(10, 10)).is_dark(0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        let f = frame(RgbImage::from_pixel(10, 10, Rgb([128, 128, 128])));
        assert!(!f.is_dark(0.95));
        assert!((f.avg_brightness() - 128.0).abs() < 0.5);
    }

    #[test]
    fn test_dark_frame_borderline() {
        // 94 dark pixels, 6 bright: not dark at 95%.
        let img = RgbImage::from_fn(10, 10, |x, y| {
            if y * 10 + x < 94 { Rgb([5, 5, 5]) } else { Rgb([200, 200, 200]) }
        });
        assert!(!frame(img).is_dark(0.95));
    }

    #[test]
    fn test_empty_frame() {
        let f = frame(RgbImage::new(0, 0));
        assert!(f.is_dark(0.95));
        assert_eq!(f.avg_brightness(), 0.0);
    }
}
