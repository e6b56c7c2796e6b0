//! Image encoding: `DynamicImage` → PNG bytes → base64 for the model request.
//!
//! PNG is lossless; JPEG artefacts around small digits are exactly what makes
//! a vision model read `8` as `3`. Image inputs (PNG/JPG uploads) skip the
//! PNG step and are base64-wrapped as they arrived.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Standard base64 with padding, as the generate endpoint expects.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
