//! Convert stage: turn a document into a bounded set of page images.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PipelineError;
use crate::pipeline::intake::MediaType;

// ═══════════════════════════════════════════════════════════
// Limits
// ═══════════════════════════════════════════════════════════

/// Caps applied while rasterizing and encoding pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionLimits {
    pub max_pages: usize,
    /// Longest side of a page image, in pixels.
    pub max_dimension_px: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for ConversionLimits {
    fn default() -> Self {
        Self {
            max_pages: 6,
            max_dimension_px: 1200,
            jpeg_quality: 65,
        }
    }
}

/// One rasterized page, already scaled to fit the dimension cap.
#[derive(Clone)]
pub struct RenderedPage {
    /// 0-based page number in the source document.
    pub index: usize,
    pub image: DynamicImage,
}

impl RenderedPage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("RenderedPage")
            .field("index", &self.index)
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Rasterizer trait
// ═══════════════════════════════════════════════════════════

/// Produces page images for a document. Synchronous and CPU-bound; the
/// pipeline runs it on a blocking thread.
pub trait PageRasterizer: Send + Sync {
    /// At most `limits.max_pages` pages, each within `limits.max_dimension_px`.
    /// Returning no pages is allowed; the pipeline treats it as a failure.
    fn rasterize(
        &self,
        media_type: MediaType,
        bytes: &[u8],
        limits: &ConversionLimits,
    ) -> Result<Vec<RenderedPage>, PipelineError>;
}

/// Scale `image` down so neither side exceeds `max_dimension`, keeping the
/// aspect ratio. Smaller images pass through untouched.
pub fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w <= max_dimension && h <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

// ═══════════════════════════════════════════════════════════
// Image documents
// ═══════════════════════════════════════════════════════════

/// PNG, JPEG and WEBP uploads: one page, orientation fixed from EXIF.
pub struct ImageRasterizer;

impl PageRasterizer for ImageRasterizer {
    fn rasterize(
        &self,
        media_type: MediaType,
        bytes: &[u8],
        limits: &ConversionLimits,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        if !media_type.is_image() {
            return Err(PipelineError::ConversionFailed(format!(
                "{media_type} is not an image"
            )));
        }
        if limits.max_pages == 0 {
            return Ok(Vec::new());
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::ConversionFailed(format!("Image decode failed: {e}")))?;
        let oriented = apply_orientation(decoded, read_exif_orientation(bytes));
        let image = fit_within(oriented, limits.max_dimension_px);

        let (width, height) = image.dimensions();
        debug!(media_type = %media_type, width, height, "Converted image to page");
        Ok(vec![RenderedPage { index: 0, image }])
    }
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Dispatch by media type
// ═══════════════════════════════════════════════════════════

/// Routes PDFs to a PDF renderer and images to `ImageRasterizer`.
/// Spreadsheets and CSV have no visual pages and yield none.
pub struct DocumentRasterizer {
    pdf: Box<dyn PageRasterizer>,
    image: ImageRasterizer,
}

impl DocumentRasterizer {
    pub fn new(pdf: Box<dyn PageRasterizer>) -> Self {
        Self {
            pdf,
            image: ImageRasterizer,
        }
    }
}

impl PageRasterizer for DocumentRasterizer {
    fn rasterize(
        &self,
        media_type: MediaType,
        bytes: &[u8],
        limits: &ConversionLimits,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        match media_type {
            MediaType::Pdf => self.pdf.rasterize(media_type, bytes, limits),
            MediaType::Png | MediaType::Jpeg | MediaType::Webp => {
                self.image.rasterize(media_type, bytes, limits)
            }
            MediaType::Xls | MediaType::Xlsx | MediaType::Csv => {
                debug!(media_type = %media_type, "No visual pages for spreadsheet input");
                Ok(Vec::new())
            }
        }
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Returns `page_count` blank 32x48 pages, regardless of input.
pub struct MockRasterizer {
    page_count: usize,
    width: u32,
    height: u32,
}

impl MockRasterizer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            width: 32,
            height: 48,
        }
    }
}

impl PageRasterizer for MockRasterizer {
    fn rasterize(
        &self,
        _media_type: MediaType,
        _bytes: &[u8],
        limits: &ConversionLimits,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        Ok((0..self.page_count.min(limits.max_pages))
            .map(|index| RenderedPage {
                index,
                image: fit_within(
                    DynamicImage::ImageRgb8(RgbImage::new(self.width, self.height)),
                    limits.max_dimension_px,
                ),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageOutputFormat;

    fn encoded(format: ImageOutputFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn default_limits() {
        let limits = ConversionLimits::default();
        assert_eq!(limits.max_pages, 6);
        assert_eq!(limits.max_dimension_px, 1200);
        assert_eq!(limits.jpeg_quality, 65);
    }

    #[test]
    fn fit_within_keeps_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2400, 1200));
        let fitted = fit_within(img, 1200);
        assert_eq!(fitted.dimensions(), (1200, 600));
    }

    #[test]
    fn fit_within_leaves_small_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        assert_eq!(fit_within(img, 1200).dimensions(), (300, 200));
    }

    #[test]
    fn image_rasterizer_scales_large_png() {
        let bytes = encoded(ImageOutputFormat::Png, 1600, 800);
        let pages = ImageRasterizer
            .rasterize(MediaType::Png, &bytes, &ConversionLimits::default())
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (1200, 600));
    }

    #[test]
    fn image_rasterizer_rejects_garbage() {
        let err = ImageRasterizer
            .rasterize(MediaType::Jpeg, b"not a jpeg", &ConversionLimits::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConversionFailed(_)));
    }

    #[test]
    fn spreadsheets_yield_no_pages() {
        let rasterizer = DocumentRasterizer::new(Box::new(MockRasterizer::new(3)));
        for media_type in [MediaType::Csv, MediaType::Xls, MediaType::Xlsx] {
            let pages = rasterizer
                .rasterize(media_type, b"a,b\n1,2\n", &ConversionLimits::default())
                .unwrap();
            assert!(pages.is_empty());
        }
    }

    #[test]
    fn pdfs_route_to_pdf_renderer() {
        let rasterizer = DocumentRasterizer::new(Box::new(MockRasterizer::new(3)));
        let pages = rasterizer
            .rasterize(MediaType::Pdf, b"%PDF", &ConversionLimits::default())
            .unwrap();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn mock_respects_page_cap() {
        let pages = MockRasterizer::new(10)
            .rasterize(MediaType::Pdf, b"", &ConversionLimits::default())
            .unwrap();
        assert_eq!(pages.len(), 6);
    }

    #[test]
    fn orientation_six_rotates_clockwise() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 10));
        assert_eq!(apply_orientation(img, 6).dimensions(), (10, 40));
    }

    #[test]
    fn missing_exif_is_normal() {
        let bytes = encoded(ImageOutputFormat::Png, 4, 4);
        assert_eq!(read_exif_orientation(&bytes), 1);
    }
}
