//! Channel normalization: every stored avatar ends up RGBA.

use plaza_protocol::PixelFormat;

use crate::{Avatar, RegistryError};

const OPAQUE: u8 = u8::MAX;

/// Converts a submitted pixel buffer to RGBA, cropping to `max_dim`.
///
/// Per pixel:
/// - RGBA is copied as-is.
/// - RGB is copied with alpha forced to 255.
/// - Gray is replicated into R, G and B with alpha forced to 255.
///
/// If the source is wider or taller than `max_dim`, the top-left
/// `max_dim × max_dim` region is kept. Rows are still read with the
/// source's own stride, so a cropped avatar isn't sheared.
///
/// # Errors
/// - [`RegistryError::AvatarSizeMismatch`] if `src` isn't exactly
///   `width * height * channels` bytes.
/// - [`RegistryError::ResourceExhaustion`] if the output buffer can't be
///   allocated.
pub fn normalize_to_rgba(
    src: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    max_dim: u32,
) -> Result<Avatar, RegistryError> {
    let channels = usize::from(format.channels());
    let stride = width as usize * channels;
    let expected = stride * height as usize;
    if src.len() != expected {
        return Err(RegistryError::AvatarSizeMismatch {
            len: src.len(),
            expected,
        });
    }

    let out_w = width.min(max_dim);
    let out_h = height.min(max_dim);
    if out_w == 0 || out_h == 0 {
        return Ok(Avatar::default());
    }

    let mut rgba = Vec::new();
    rgba.try_reserve_exact(out_w as usize * out_h as usize * 4)?;

    for row in src.chunks_exact(stride).take(out_h as usize) {
        for px in row.chunks_exact(channels).take(out_w as usize) {
            let pixel = match format {
                PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
                PixelFormat::Rgb => [px[0], px[1], px[2], OPAQUE],
                PixelFormat::Gray => [px[0], px[0], px[0], OPAQUE],
            };
            rgba.extend_from_slice(&pixel);
        }
    }

    Ok(Avatar {
        width: out_w,
        height: out_h,
        rgba,
    })
}
