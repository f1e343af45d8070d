//! PDF page rendering via Google PDFium.
//!
//! `PdfiumRasterizer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::convert::{fit_within, ConversionLimits, PageRasterizer, RenderedPage};
use super::PipelineError;
use crate::pipeline::intake::MediaType;

/// Rendering DPI before the dimension cap applies. Slide decks are large
/// pages; 150 DPI is plenty once capped to the analyzer's input size.
pub const DEFAULT_RENDER_DPI: u32 = 150;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRasterizer {
    dpi: u32,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable, or in `lib/` next to it
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            PipelineError::ConversionFailed(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [exe_dir.to_path_buf(), exe_dir.join("lib")];
            for dir in &candidates {
                let lib_path =
                    Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        PipelineError::ConversionFailed(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, calling out encrypted files.
fn map_load_error(e: PdfiumError) -> PipelineError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        PipelineError::ConversionFailed("PDF is password-protected".into())
    } else {
        PipelineError::ConversionFailed(format!("Failed to load PDF: {e}"))
    }
}

/// Pixel size for a page at `dpi`, capped so the longer side is at most
/// `max_dimension`. Both sides are at least 1. Aspect ratio is preserved.
pub fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_dimension: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);
    let max_dim = raw_w.max(raw_h);
    let cap = max_dimension.max(1);

    if max_dim > cap as f32 {
        let ratio = cap as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, cap);
        let h = ((raw_h * ratio) as u32).clamp(1, cap);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        media_type: MediaType,
        bytes: &[u8],
        limits: &ConversionLimits,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        if media_type != MediaType::Pdf {
            return Err(PipelineError::ConversionFailed(format!(
                "{media_type} is not a PDF"
            )));
        }

        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();
        let page_total = pages.len() as usize;
        let render_count = page_total.min(limits.max_pages);

        if page_total > render_count {
            warn!(
                pages = page_total,
                rendered = render_count,
                "PDF longer than page cap; rendering the first pages only"
            );
        }

        let mut rendered = Vec::with_capacity(render_count);
        for index in 0..render_count {
            // render_count <= pages.len(), which is a u16
            let page = pages.get(index as u16).map_err(|e| {
                PipelineError::ConversionFailed(format!("Page {index} unavailable: {e}"))
            })?;

            let (target_w, target_h) = compute_render_dimensions(
                page.width().value,
                page.height().value,
                self.dpi,
                limits.max_dimension_px,
            );
            let config = PdfRenderConfig::new()
                .set_target_width(target_w as i32)
                .set_maximum_height(target_h as i32);

            let bitmap = page.render_with_config(&config).map_err(|e| {
                PipelineError::ConversionFailed(format!("Rendering page {index} failed: {e}"))
            })?;
            let image = fit_within(bitmap.as_image(), limits.max_dimension_px);

            debug!(
                page = index,
                width = target_w,
                height = target_h,
                "Rendered PDF page"
            );
            rendered.push(RenderedPage { index, image });
        }

        Ok(rendered)
    }
}
