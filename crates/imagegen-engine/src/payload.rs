use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};
use imagegen_contracts::{GenerateError, Result};

/// Decoded upstream bytes. The format is sniffed from the magic bytes, if recognisable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImagePayload {
    bytes: Vec<u8>,
    format: Option<ImageFormat>,
}

impl RawImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let format = image::guess_format(&bytes).ok();
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        let reader = match self.format {
            Some(format) => ImageReader::with_format(Cursor::new(self.bytes.as_slice()), format),
            None => ImageReader::new(Cursor::new(self.bytes.as_slice()))
                .with_guessed_format()
                .map_err(undecodable)?,
        };
        reader.decode().map_err(undecodable)
    }

    pub fn dimensions(&self) -> Result<(u32, u32)> {
        ImageReader::new(Cursor::new(self.bytes.as_slice()))
            .with_guessed_format()
            .map_err(undecodable)?
            .into_dimensions()
            .map_err(undecodable)
    }
}

/// Final image handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl NormalizedImage {
    /// Wraps upstream bytes as-is, for callers that opted out of normalization.
    pub fn passthrough(payload: RawImagePayload) -> Result<Self> {
        let (width, height) = payload.dimensions()?;
        let format = payload.format.ok_or_else(|| GenerateError::UndecodableImage {
            reason: "unrecognised image format".to_string(),
        })?;
        Ok(Self {
            bytes: payload.bytes,
            width,
            height,
            format,
        })
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

fn undecodable(err: impl std::fmt::Display) -> GenerateError {
    GenerateError::UndecodableImage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};
    use imagegen_contracts::GenerateError;

    use super::{NormalizedImage, RawImagePayload};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_png_format_and_dimensions() {
        let payload = RawImagePayload::new(png(7, 3));
        assert_eq!(payload.format(), Some(ImageFormat::Png));
        assert_eq!(payload.dimensions().unwrap(), (7, 3));
    }

    #[test]
    fn garbage_is_undecodable() {
        let payload = RawImagePayload::new(b"not an image".to_vec());
        assert_eq!(payload.format(), None);
        assert!(matches!(
            payload.decode(),
            Err(GenerateError::UndecodableImage { .. })
        ));
    }

    #[test]
    fn passthrough_keeps_bytes_verbatim() {
        let bytes = png(5, 4);
        let image = NormalizedImage::passthrough(RawImagePayload::new(bytes.clone())).unwrap();
        assert_eq!(image.bytes, bytes);
        assert_eq!((image.width, image.height), (5, 4));
        assert_eq!(image.extension(), "png");
    }
}
