//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless, so a page decoded back from its encoding has exactly the
//! pixels that were rendered. Fax scans are already noisy; JPEG artefacts on
//! top of that blur small print such as lab values and fax headers.

use crate::error::TriageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PNG_MIME: &str = "image/png";

/// Encode a rasterised page as a base64 PNG ready for the classifier.
pub fn encode_page(img: &DynamicImage, page: usize) -> Result<ImageData, TriageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| TriageError::RasterisationFailed {
            page,
            detail: format!("PNG encoding failed: {e}"),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page {} → {} bytes base64", page, b64.len());

    Ok(ImageData::new(b64, PNG_MIME).with_detail("high"))
}

/// Decode the PNG bytes carried by an `ImageData`.
pub fn decode_png_bytes(data: &ImageData) -> Result<Vec<u8>, TriageError> {
    STANDARD
        .decode(&data.data)
        .map_err(|e| TriageError::ImageDecode {
            detail: format!("invalid base64: {e}"),
        })
}

/// Decode an `ImageData` back into a raster.
pub fn decode_page(data: &ImageData) -> Result<DynamicImage, TriageError> {
    let bytes = decode_png_bytes(data)?;
    image::load_from_memory(&bytes).map_err(|e| TriageError::ImageDecode {
        detail: e.to_string(),
    })
}
