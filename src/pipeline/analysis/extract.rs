//! Extract stage: serialize page images into a transmissible form.

use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, ImageOutputFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::convert::RenderedPage;
use super::PipelineError;

pub const PAGE_MEDIA_TYPE: &str = "image/jpeg";

/// A page as sent to the analyzer: base64 JPEG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPage {
    pub index: usize,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub data: String,
}

/// JPEG-encode every page at `quality` (clamped to 1-100) and base64 the
/// result. Any page that fails to encode fails the whole stage.
pub fn encode_pages(pages: &[RenderedPage], quality: u8) -> Result<Vec<EncodedPage>, PipelineError> {
    let quality = quality.clamp(1, 100);
    pages
        .iter()
        .map(|page| encode_page(page, quality))
        .collect()
}

fn encode_page(page: &RenderedPage, quality: u8) -> Result<EncodedPage, PipelineError> {
    let (width, height) = page.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::ExtractionFailed(format!(
            "Page {} has no pixels",
            page.index
        )));
    }

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(page.image.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| {
            PipelineError::ExtractionFailed(format!("JPEG encoding of page {} failed: {e}", page.index))
        })?;
    let jpeg = cursor.into_inner();

    let data = base64::engine::general_purpose::STANDARD.encode(&jpeg);
    debug!(
        page = page.index,
        width,
        height,
        jpeg_size = jpeg.len(),
        "Encoded page for analysis"
    );

    Ok(EncodedPage {
        index: page.index,
        media_type: PAGE_MEDIA_TYPE.to_string(),
        width,
        height,
        data,
    })
}
