use std::io::Cursor;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use imagegen_contracts::{GenerateError, Result};
use log::debug;

use crate::payload::{NormalizedImage, RawImagePayload};

/// Aspect ratios closer than this are resized directly instead of cropped.
pub const ASPECT_TOLERANCE: f64 = 0.001;

const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// How a source of one size becomes the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizePlan {
    Unchanged,
    Resize {
        width: u32,
        height: u32,
    },
    /// Crop the source to the region the centered fit-and-crop would keep, then
    /// resize that region to the target. The fit-size canvas is never allocated.
    CropAndResize {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl NormalizePlan {
    pub fn for_dimensions(original: (u32, u32), target: (u32, u32)) -> Self {
        if original == target {
            return Self::Unchanged;
        }
        if aspect_ratios_match(aspect(original), aspect(target)) {
            return Self::Resize {
                width: target.0,
                height: target.1,
            };
        }
        let fit = fit_size(original, target);
        let origin = crop_origin(fit, target);
        let (x, width) = source_span(original.0, fit.0, origin.0, target.0);
        let (y, height) = source_span(original.1, fit.1, origin.1, target.1);
        Self::CropAndResize {
            x,
            y,
            width,
            height,
        }
    }
}

fn aspect((width, height): (u32, u32)) -> f64 {
    width as f64 / height as f64
}

pub fn aspect_ratios_match(a: f64, b: f64) -> bool {
    (a - b).abs() < ASPECT_TOLERANCE
}

/// Smallest uniform scale of `original` that covers `target` on both axes.
/// Wide in `u64`: extreme aspect ratios overflow `u32` here.
pub fn fit_size(original: (u32, u32), target: (u32, u32)) -> (u64, u64) {
    let original_aspect = aspect(original);
    let target_width = u64::from(target.0);
    let target_height = u64::from(target.1);
    if original_aspect > aspect(target) {
        let width = (target_height as f64 * original_aspect).round() as u64;
        (width.max(target_width), target_height)
    } else {
        let height = (target_width as f64 / original_aspect).round() as u64;
        (target_width, height.max(target_height))
    }
}

/// Top-left corner of a centered `target` rectangle inside `fit`. Floors odd leftovers.
pub fn crop_origin(fit: (u64, u64), target: (u32, u32)) -> (u64, u64) {
    (
        fit.0.saturating_sub(u64::from(target.0)) / 2,
        fit.1.saturating_sub(u64::from(target.1)) / 2,
    )
}

/// Maps one axis of the fit-space crop back onto the source axis.
/// Returns (offset, length), always inside `0..source`.
fn source_span(source: u32, fit: u64, crop_offset: u64, target: u32) -> (u32, u32) {
    let scale = source as f64 / fit as f64;
    let length = (target as f64 * scale).round().clamp(1.0, source as f64) as u32;
    let offset = (crop_offset as f64 * scale).round().min(source as f64) as u32;
    (offset.min(source - length), length)
}

/// Produces PNG bytes of exactly `target_width` x `target_height`.
pub fn normalize(
    image: &RawImagePayload,
    target_width: u32,
    target_height: u32,
) -> Result<NormalizedImage> {
    let decoded = image.decode()?;
    let original = (decoded.width(), decoded.height());
    let target = (target_width, target_height);
    let plan = NormalizePlan::for_dimensions(original, target);
    debug!(
        "normalizing {}x{} -> {}x{}: {:?}",
        original.0, original.1, target_width, target_height, plan
    );

    let output = match plan {
        NormalizePlan::Unchanged => {
            if image.format() == Some(ImageFormat::Png) {
                return Ok(NormalizedImage {
                    bytes: image.bytes().to_vec(),
                    width: target_width,
                    height: target_height,
                    format: ImageFormat::Png,
                });
            }
            decoded
        }
        NormalizePlan::Resize { width, height } => {
            decoded.resize_exact(width, height, RESIZE_FILTER)
        }
        NormalizePlan::CropAndResize {
            x,
            y,
            width,
            height,
        } => decoded
            .crop_imm(x, y, width, height)
            .resize_exact(target_width, target_height, RESIZE_FILTER),
    };

    Ok(NormalizedImage {
        bytes: encode_png(output)?,
        width: target_width,
        height: target_height,
        format: ImageFormat::Png,
    })
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>> {
    // The PNG encoder has no float color types.
    let image = match image.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => image,
    };
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| GenerateError::EncodeFailed {
            reason: err.to_string(),
        })?;
    Ok(out.into_inner())
}
