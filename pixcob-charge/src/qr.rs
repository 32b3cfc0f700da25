//! QR bitmap rendering for EMV payable strings.

use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;

/// Rendered bitmaps are at least this many pixels per side.
pub const MIN_DIMENSION_PX: u32 = 256;

/// QR rendering failure.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    /// The payload does not fit a QR code.
    #[error("payload does not fit a QR code: {0}")]
    Encode(String),
    /// PNG encoding failed.
    #[error("failed to encode QR bitmap as PNG: {0}")]
    Render(String),
}

/// Renders a payable string as a PNG bitmap.
///
/// # Errors
///
/// Returns [`QrError`] when the payload exceeds QR capacity or the PNG
/// encoder fails.
pub fn render_png(payable_text: &str) -> Result<Vec<u8>, QrError> {
    let code = QrCode::new(payable_text.as_bytes()).map_err(|e| QrError::Encode(e.to_string()))?;
    let bitmap = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_DIMENSION_PX, MIN_DIMENSION_PX)
        .build();

    let mut bytes = Vec::new();
    bitmap
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| QrError::Render(e.to_string()))?;
    Ok(bytes)
}
