//! Image preprocessing for the siamese model.
//!
//! Every image fed to the model (probe and gallery alike) goes through the
//! same path: decode, bilinear resize to 100×100, scale intensities to [0, 1].
//!
//! The resize samples at half-pixel centres with no antialiasing and keeps
//! interpolated values in `f32`, matching the bilinear resize the network was
//! trained with. Shrinking therefore reads only the four nearest source
//! pixels per output pixel.

use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use std::path::Path;
use thiserror::Error;

/// Spatial resolution the model was trained on.
pub const INPUT_SIZE: usize = 100;
const PIXEL_SCALE: f32 = 255.0;

/// NHWC `[1, 100, 100, 3]` float tensor, RGB order, values in [0, 1].
pub type ImageTensor = Array4<f32>;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Read and preprocess an image file.
pub fn preprocess_file(path: &Path) -> Result<ImageTensor, PreprocessError> {
    let bytes = std::fs::read(path)?;
    preprocess_bytes(&bytes)
}

/// Decode encoded image bytes (format sniffed from content) and preprocess.
pub fn preprocess_bytes(bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
    let img = image::load_from_memory(bytes)?;
    Ok(preprocess_image(&img))
}

/// Resize and normalize an already decoded image.
pub fn preprocess_image(img: &DynamicImage) -> ImageTensor {
    let rgb = img.to_rgb8();
    let mut tensor = Array4::<f32>::zeros((1, INPUT_SIZE, INPUT_SIZE, 3));
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return tensor;
    }

    let columns: Vec<Tap> = (0..INPUT_SIZE).map(|x| Tap::new(x, width)).collect();
    for y in 0..INPUT_SIZE {
        let row = Tap::new(y, height);
        for (x, col) in columns.iter().enumerate() {
            for c in 0..3 {
                let top = col.lerp(sample(&rgb, col.lo, row.lo, c), sample(&rgb, col.hi, row.lo, c));
                let bottom = col.lerp(sample(&rgb, col.lo, row.hi, c), sample(&rgb, col.hi, row.hi, c));
                tensor[[0, y, x, c]] = row.lerp(top, bottom) / PIXEL_SCALE;
            }
        }
    }

    tensor
}

/// Source neighbours and weight for one output coordinate.
struct Tap {
    lo: u32,
    hi: u32,
    frac: f32,
}

impl Tap {
    fn new(out: usize, src_len: u32) -> Self {
        let scale = src_len as f32 / INPUT_SIZE as f32;
        let src = ((out as f32 + 0.5) * scale - 0.5).max(0.0);
        let lo = (src.floor() as u32).min(src_len - 1);
        let hi = (lo + 1).min(src_len - 1);
        Self {
            lo,
            hi,
            frac: src - lo as f32,
        }
    }

    fn lerp(&self, a: f32, b: f32) -> f32 {
        a + (b - a) * self.frac
    }
}

fn sample(img: &RgbImage, x: u32, y: u32, c: usize) -> f32 {
    img.get_pixel(x, y)[c] as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_output_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(250, 250));
        let tensor = preprocess_image(&img);
        assert_eq!(tensor.shape(), &[1, INPUT_SIZE, INPUT_SIZE, 3]);
    }

    #[test]
    fn test_non_square_input_is_stretched() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 360));
        let tensor = preprocess_image(&img);
        assert_eq!(tensor.shape(), &[1, INPUT_SIZE, INPUT_SIZE, 3]);
    }

    #[test]
    fn test_normalization_range() {
        let img = RgbImage::from_fn(120, 80, |x, y| Rgb([(x % 256) as u8, (y * 3 % 256) as u8, 255]));
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img));
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_uniform_pixel_values() {
        let img = RgbImage::from_pixel(64, 64, Rgb([255, 0, 51]));
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img));
        assert!((tensor[[0, 50, 50, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 50, 50, 1]], 0.0);
        assert!((tensor[[0, 50, 50, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_greyscale_is_expanded_to_rgb() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(32, 32, image::Luma([102])));
        let tensor = preprocess_image(&img);
        let r = tensor[[0, 10, 10, 0]];
        assert_eq!(r, tensor[[0, 10, 10, 1]]);
        assert_eq!(r, tensor[[0, 10, 10, 2]]);
        assert!((r - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_upscale_interpolates_between_columns() {
        // Left column black, right column white.
        let img = RgbImage::from_fn(2, 2, |x, _| if x == 0 { Rgb([0; 3]) } else { Rgb([255; 3]) });
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img));
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 0, 99, 0]] - 1.0).abs() < 1e-6);
        // Output column 50 maps to source x = 0.51.
        assert!((tensor[[0, 0, 50, 0]] - 0.51).abs() < 1e-4);
    }

    #[test]
    fn test_downscale_does_not_average_neighbourhood() {
        // Stripes two pixels wide. Halving lands each output sample between
        // two same-coloured columns, so stripes survive unblurred.
        let img = RgbImage::from_fn(200, 200, |x, _| {
            if (x / 2) % 2 == 0 { Rgb([0; 3]) } else { Rgb([255; 3]) }
        });
        let tensor = preprocess_image(&DynamicImage::ImageRgb8(img));
        for x in 0..INPUT_SIZE {
            let expected = if x % 2 == 0 { 0.0 } else { 1.0 };
            assert_eq!(tensor[[0, 40, x, 0]], expected, "column {x}");
        }
    }

    #[test]
    fn test_decode_png_bytes() {
        let img = RgbImage::from_pixel(40, 40, Rgb([0, 255, 0]));
        let tensor = preprocess_bytes(&encode(&img, ImageFormat::Png)).unwrap();
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = preprocess_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = preprocess_file(Path::new("/nonexistent/faceid/probe.jpg")).unwrap_err();
        assert!(matches!(err, PreprocessError::Io(_)));
    }
}
