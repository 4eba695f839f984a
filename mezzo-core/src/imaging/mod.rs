//! Image codec
//!
//! Two operations cover every need of the artwork service: decode bytes into
//! a raw image, and resize + re-encode to JPEG. SVG placeholders are never
//! decoded; their bytes are served as-is.

use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Not an SVG file: {0}")]
    NotSvg(String),
}

/// Maximum dimension (pixels) requested for a resized image
pub type ImageSize = u32;

/// An immutable encoded image ready to serve
#[derive(Debug, Clone, Serialize)]
pub struct EncodedImage {
    mime_type: String,
    data: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A decoded image, ready for resizing and re-encoding
pub struct RawImage(image::DynamicImage);

impl RawImage {
    /// Scale down so the largest dimension is at most `max_size`, keeping the
    /// aspect ratio. Images already small enough are returned unchanged.
    pub fn resize(self, max_size: ImageSize) -> RawImage {
        if self.0.width() <= max_size && self.0.height() <= max_size {
            return self;
        }
        RawImage(self.0.thumbnail(max_size, max_size))
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<EncodedImage, ImagingError> {
        let mut data = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut data), quality);
        encoder.encode_image(&self.0.to_rgb8())?;
        Ok(EncodedImage::new("image/jpeg", data))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

/// Decode an encoded image from memory
pub fn decode(data: &[u8]) -> Result<RawImage, ImagingError> {
    Ok(RawImage(image::load_from_memory(data)?))
}

/// Guess the mime type of encoded image bytes, for raw passthrough
pub fn guess_mime_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Load an SVG file verbatim. Only a cheap sanity check is performed; SVG
/// data is served as-is, never decoded or resized.
pub fn read_svg_file(path: &Path) -> Result<EncodedImage, ImagingError> {
    let data = std::fs::read(path)?;
    let head = String::from_utf8_lossy(&data[..data.len().min(512)]);
    if !head.contains("<svg") {
        return Err(ImagingError::NotSvg(path.display().to_string()));
    }
    Ok(EncodedImage::new("image/svg+xml", data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let mut data = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        data
    }

    #[test]
    fn test_decode_resize_encode() {
        let png = checkerboard(64, 32);
        let raw = decode(&png).unwrap();
        assert_eq!((raw.width(), raw.height()), (64, 32));

        let resized = raw.resize(16);
        assert!(resized.width() <= 16 && resized.height() <= 16);

        let encoded = resized.encode_jpeg(75).unwrap();
        assert_eq!(encoded.mime_type(), "image/jpeg");
        assert!(!encoded.data().is_empty());
    }

    #[test]
    fn test_resize_never_upscales() {
        let png = checkerboard(8, 8);
        let resized = decode(&png).unwrap().resize(128);
        assert_eq!((resized.width(), resized.height()), (8, 8));
    }

    #[test]
    fn test_guess_mime_type() {
        let png = checkerboard(4, 4);
        assert_eq!(guess_mime_type(&png), "image/png");
        assert_eq!(guess_mime_type(b"not an image"), "application/octet-stream");
    }

    #[test]
    fn test_read_svg_file_rejects_non_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.svg");
        std::fs::write(&path, b"<html></html>").unwrap();
        assert!(read_svg_file(&path).is_err());

        std::fs::write(&path, b"<?xml version=\"1.0\"?><svg></svg>").unwrap();
        let image = read_svg_file(&path).unwrap();
        assert_eq!(image.mime_type(), "image/svg+xml");
    }
}
