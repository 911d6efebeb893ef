//! Image conditioning for the classical (tesseract) engine.
//!
//! Fixed order: grayscale → Gaussian smoothing → adaptive Gaussian threshold
//! → non-local-means denoising. The binarised result is only fed to the
//! printed-text engine's uniform-block pass; the vision engines and the other
//! tesseract passes see the raw or grayscale image, because binarisation
//! erases the stroke-width and glyph-shape cues they rely on.
//!
//! Pure Rust on `image` buffers. Parameters follow the usual OpenCV defaults
//! for phone photos of paper: 5×5 blur, 11 px threshold neighbourhood with an
//! offset of 2, NL-means with h = 10, 7 px template and 21 px search window.

use crate::error::ExtractError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageError, Luma};
use std::path::Path;
use tracing::debug;

/// Gaussian smoothing kernel size.
pub const BLUR_KERNEL: u32 = 5;
/// Neighbourhood of the adaptive threshold (odd, in pixels).
pub const THRESHOLD_BLOCK: u32 = 11;
/// Constant subtracted from the local weighted mean.
pub const THRESHOLD_OFFSET: f32 = 2.0;
/// NL-means filter strength.
pub const NLM_STRENGTH: f32 = 10.0;
/// NL-means patch size (odd).
pub const NLM_TEMPLATE: u32 = 7;
/// NL-means search window (odd).
pub const NLM_SEARCH: u32 = 21;

/// Both inputs the printed-text engine needs, from a single decode.
#[derive(Debug, Clone)]
pub struct PreparedImages {
    /// Grayscale only.
    pub grayscale: GrayImage,
    /// Full conditioning pipeline.
    pub binarized: GrayImage,
}

/// Decode `path` and cap its longest edge at `max_dimension` pixels.
pub fn load_image(path: &Path, max_dimension: u32) -> Result<DynamicImage, ExtractError> {
    let img = image::open(path).map_err(|e| match e {
        ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            ExtractError::FileNotFound {
                path: path.to_path_buf(),
            }
        }
        other => ExtractError::UnreadableImage {
            path: path.to_path_buf(),
            detail: other.to_string(),
        },
    })?;

    if img.width().max(img.height()) > max_dimension {
        let resized = img.resize(max_dimension, max_dimension, FilterType::Triangle);
        debug!(
            "Downscaled {} from {}x{} to {}x{}",
            path.display(),
            img.width(),
            img.height(),
            resized.width(),
            resized.height()
        );
        Ok(resized)
    } else {
        Ok(img)
    }
}

/// Grayscale-only version of the image at `path`.
pub fn grayscale_image(path: &Path, max_dimension: u32) -> Result<GrayImage, ExtractError> {
    Ok(load_image(path, max_dimension)?.to_luma8())
}

/// Full conditioning pipeline for the image at `path`.
///
/// Any failure (missing or undecodable file) is returned immediately.
pub fn preprocess_image(path: &Path, max_dimension: u32) -> Result<GrayImage, ExtractError> {
    Ok(condition(&grayscale_image(path, max_dimension)?))
}

/// Decode once and produce both the grayscale and the conditioned image.
pub fn prepare_for_ocr(path: &Path, max_dimension: u32) -> Result<PreparedImages, ExtractError> {
    let grayscale = grayscale_image(path, max_dimension)?;
    let binarized = condition(&grayscale);
    Ok(PreparedImages {
        grayscale,
        binarized,
    })
}

/// Blur → adaptive threshold → NL-means on an already grayscale image.
pub fn condition(gray: &GrayImage) -> GrayImage {
    let blurred = imageops::blur(gray, kernel_sigma(BLUR_KERNEL));
    let thresholded = adaptive_threshold(&blurred, THRESHOLD_BLOCK, THRESHOLD_OFFSET);
    non_local_means(&thresholded, NLM_STRENGTH, NLM_TEMPLATE, NLM_SEARCH)
}

/// Sigma OpenCV derives for a Gaussian kernel of size `ksize` when none is given.
fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Binarise against a Gaussian-weighted local mean.
///
/// A pixel becomes white when it is brighter than the weighted mean of its
/// `block`-sized neighbourhood minus `offset`, black otherwise. Unlike a
/// global threshold this tolerates shadows and uneven lighting across a page.
pub fn adaptive_threshold(gray: &GrayImage, block: u32, offset: f32) -> GrayImage {
    let local_mean = imageops::blur(gray, kernel_sigma(block));
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let value = gray.get_pixel(x, y).0[0] as f32;
        let threshold = local_mean.get_pixel(x, y).0[0] as f32 - offset;
        *pixel = Luma([if value > threshold { 255 } else { 0 }]);
    }
    out
}

/// Non-local-means denoising.
///
/// Every pixel becomes a weighted average of the pixels in its search window,
/// weighted by how similar their surrounding `template`-sized patches are:
/// `w = exp(-d² / h²)` with `d²` the mean squared patch difference.
///
/// Patch distances are computed per search offset with an integral image, so
/// the cost is `O(search² · pixels)` rather than `O(search² · template² · pixels)`.
pub fn non_local_means(img: &GrayImage, h: f32, template: u32, search: u32) -> GrayImage {
    let (width, height) = (img.width() as usize, img.height() as usize);
    if width == 0 || height == 0 {
        return img.clone();
    }

    let t = (template / 2) as isize;
    let s = (search / 2) as isize;
    let h2 = (h as f64) * (h as f64);
    let src: Vec<f32> = img.as_raw().iter().map(|&p| p as f32).collect();
    let n = width * height;

    let mut weight_sum = vec![0f64; n];
    let mut value_sum = vec![0f64; n];
    let mut diff = vec![0f64; n];
    let mut integral = vec![0f64; (width + 1) * (height + 1)];

    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    for dy in -s..=s {
        for dx in -s..=s {
            for y in 0..height {
                let sy = clamp(y as isize + dy, height);
                for x in 0..width {
                    let sx = clamp(x as isize + dx, width);
                    let d = (src[y * width + x] - src[sy * width + sx]) as f64;
                    diff[y * width + x] = d * d;
                }
            }
            build_integral(&diff, width, height, &mut integral);

            for y in 0..height {
                let sy = clamp(y as isize + dy, height);
                let y0 = clamp(y as isize - t, height);
                let y1 = clamp(y as isize + t, height);
                for x in 0..width {
                    let sx = clamp(x as isize + dx, width);
                    let x0 = clamp(x as isize - t, width);
                    let x1 = clamp(x as isize + t, width);
                    let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
                    let dist = box_sum(&integral, width, x0, y0, x1, y1) / area;
                    let w = (-dist / h2).exp();
                    let i = y * width + x;
                    weight_sum[i] += w;
                    value_sum[i] += w * src[sy * width + sx] as f64;
                }
            }
        }
    }

    let data: Vec<u8> = value_sum
        .iter()
        .zip(&weight_sum)
        .map(|(v, w)| (v / w).round().clamp(0.0, 255.0) as u8)
        .collect();

    GrayImage::from_raw(img.width(), img.height(), data).unwrap_or_else(|| img.clone())
}

/// Summed-area table with a zero row and column at the top-left.
fn build_integral(values: &[f64], width: usize, height: usize, integral: &mut [f64]) {
    let stride = width + 1;
    for y in 0..height {
        let mut row = 0.0;
        for x in 0..width {
            row += values[y * width + x];
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }
}

/// Inclusive sum over `[x0, x1] × [y0, y1]`.
fn box_sum(integral: &[f64], width: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
    let stride = width + 1;
    integral[(y1 + 1) * stride + x1 + 1] - integral[y0 * stride + x1 + 1]
        - integral[(y1 + 1) * stride + x0]
        + integral[y0 * stride + x0]
}
