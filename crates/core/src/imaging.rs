//! Strip image validation.
//!
//! A downloaded payload is only archived if it decodes as an image of a
//! plausible strip size. The detected format decides the file extension.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};

use crate::Error;

/// Smallest width a real strip has.
pub const MIN_WIDTH: u32 = 100;

/// Smallest height a real strip has.
pub const MIN_HEIGHT: u32 = 50;

/// Largest payload accepted as a strip (10MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// File extensions the archive recognizes as strips.
pub const STRIP_EXTENSIONS: &[&str] = &["png", "jpg", "gif", "webp"];

/// Facts about a validated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageInfo {
    /// File extension for the archive.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

/// Archive file extension for an image format.
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        _ => "png",
    }
}

/// Sniff the format of `bytes` without decoding pixels.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check that `bytes` is a decodable image of at least strip size.
///
/// # Errors
///
/// Returns `Error::InvalidImage` if the payload is empty, larger than
/// `max_bytes`, in an unsupported format, fails to decode, or is smaller
/// than [`MIN_WIDTH`] x [`MIN_HEIGHT`].
pub fn validate(bytes: &[u8], max_bytes: usize) -> Result<ImageInfo, Error> {
    if bytes.is_empty() {
        return Err(Error::InvalidImage("empty payload".into()));
    }
    if bytes.len() > max_bytes {
        return Err(Error::InvalidImage(format!("{} bytes exceeds {max_bytes}", bytes.len())));
    }

    let format = sniff_format(bytes).ok_or_else(|| Error::InvalidImage("unrecognized image format".into()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP) {
        return Err(Error::InvalidImage(format!("unsupported format {format:?}")));
    }

    let reader = ImageReader::with_format(Cursor::new(bytes), format);
    let decoded = reader.decode().map_err(|e| Error::InvalidImage(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return Err(Error::InvalidImage(format!(
            "{width}x{height} is below the {MIN_WIDTH}x{MIN_HEIGHT} minimum"
        )));
    }

    Ok(ImageInfo { width, height, format })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    /// Encode a grayscale image produced by `pixel` as PNG.
    pub fn png(width: u32, height: u32, pixel: impl Fn(u32, u32) -> u8) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([pixel(x, y)]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Brightness rising left to right.
    pub fn rising(offset: u8) -> Vec<u8> {
        png(180, 90, move |x, _| (x * 200 / 180) as u8 + offset)
    }

    /// Brightness falling left to right.
    pub fn falling() -> Vec<u8> {
        png(180, 90, |x, _| 200 - (x * 200 / 180) as u8)
    }

    /// Vertical bands alternating every 10 pixels.
    pub fn bands() -> Vec<u8> {
        png(180, 90, |x, _| if (x / 10) % 2 == 0 { 20 } else { 230 })
    }

    /// Blocky pseudo-random pattern; different seeds hash far apart.
    pub fn noise(seed: u64) -> Vec<u8> {
        png(180, 90, move |x, y| {
            let cell = u64::from(y * 8 / 90) * 9 + u64::from(x / 20);
            (splitmix(seed.wrapping_mul(97).wrapping_add(cell)) >> 56) as u8
        })
    }

    fn splitmix(seed: u64) -> u64 {
        let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn test_validate_png() {
        let info = validate(&fixtures::rising(0), MAX_IMAGE_BYTES).unwrap();
        assert_eq!((info.width, info.height), (180, 90));
        assert_eq!(info.extension(), "png");
    }

    #[test]
    fn test_validate_empty() {
        assert!(matches!(validate(&[], MAX_IMAGE_BYTES), Err(Error::InvalidImage(_))));
    }

    #[test]
    fn test_validate_too_small() {
        let tiny = fixtures::png(40, 40, |_, _| 128);
        let err = validate(&tiny, MAX_IMAGE_BYTES).unwrap_err();
        assert!(err.to_string().contains("minimum"));
    }

    #[test]
    fn test_validate_too_large() {
        let bytes = fixtures::rising(0);
        assert!(validate(&bytes, bytes.len() - 1).is_err());
    }

    #[test]
    fn test_validate_not_an_image() {
        assert!(validate(b"<html>not a strip</html>", MAX_IMAGE_BYTES).is_err());
    }
}
