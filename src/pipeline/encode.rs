//! Image encoding: homework photo → base64 payload for the vision engines.
//!
//! Both vision engines send the page inline in a JSON body. PNG and JPEG
//! files within the size cap are forwarded byte-for-byte, since re-encoding a
//! phone JPEG as PNG triples the payload without adding information. Anything
//! else (BMP, TIFF, oversized photos) is decoded, scaled down and re-encoded
//! as lossless PNG so the model still sees crisp strokes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// A base64-encoded image plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub mime_type: &'static str,
}

impl EncodedImage {
    /// Wrap for the edgequake-llm vision API.
    ///
    /// `detail: "high"` lets GPT-4-class models tile the full image; with the
    /// single low-detail tile, superscripts and fraction bars disappear.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), self.mime_type).with_detail("high")
    }
}

/// Read the image at `path` and encode it for a vision model.
pub fn encode_image_file(path: &Path, max_dimension: u32) -> Result<EncodedImage, image::ImageError> {
    let bytes = std::fs::read(path)?;
    encode_image_bytes(&bytes, max_dimension)
}

/// Encode in-memory image bytes for a vision model.
pub fn encode_image_bytes(bytes: &[u8], max_dimension: u32) -> Result<EncodedImage, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions()?;
    let fits = width.max(height) <= max_dimension;

    let passthrough = match format {
        Some(ImageFormat::Png) if fits => Some("image/png"),
        Some(ImageFormat::Jpeg) if fits => Some("image/jpeg"),
        _ => None,
    };

    if let Some(mime_type) = passthrough {
        let base64 = STANDARD.encode(bytes);
        debug!("Encoded {width}x{height} {mime_type} as-is → {} bytes base64", base64.len());
        return Ok(EncodedImage { base64, mime_type });
    }

    let mut img = image::load_from_memory(bytes)?;
    if !fits {
        img = img.resize(max_dimension, max_dimension, FilterType::Triangle);
    }
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    let base64 = STANDARD.encode(&buf);
    debug!(
        "Re-encoded {width}x{height} {:?} as {}x{} PNG → {} bytes base64",
        format,
        img.width(),
        img.height(),
        base64.len()
    );
    Ok(EncodedImage {
        base64,
        mime_type: "image/png",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([180])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn png_within_cap_is_forwarded_unchanged() {
        let bytes = image_bytes(20, 10, ImageFormat::Png);
        let encoded = encode_image_bytes(&bytes, 2000).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&encoded.base64).unwrap(), bytes);
    }

    #[test]
    fn jpeg_keeps_its_mime_type() {
        let bytes = image_bytes(20, 10, ImageFormat::Jpeg);
        let encoded = encode_image_bytes(&bytes, 2000).unwrap();
        assert_eq!(encoded.mime_type, "image/jpeg");
    }

    #[test]
    fn bmp_is_reencoded_as_png() {
        let bytes = image_bytes(20, 10, ImageFormat::Bmp);
        let encoded = encode_image_bytes(&bytes, 2000).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.base64).unwrap();
        assert_eq!(image::guess_format(&decoded).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn oversized_image_is_scaled_down() {
        let bytes = image_bytes(300, 100, ImageFormat::Png);
        let encoded = encode_image_bytes(&bytes, 150).unwrap();
        let decoded = STANDARD.decode(&encoded.base64).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (150, 50));
    }

    #[test]
    fn image_data_carries_high_detail() {
        let bytes = image_bytes(4, 4, ImageFormat::Png);
        let data = encode_image_bytes(&bytes, 2000).unwrap().to_image_data();
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(encode_image_bytes(b"not an image", 2000).is_err());
    }
}
