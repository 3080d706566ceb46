//! Minimal built-in engine: probes raw PDF bytes for the page count and
//! page sizes, and reports surface geometry without rasterizing. The
//! page view draws a schematic page from that geometry, which is all
//! the overlay workflow needs. A real rasterizer can replace this
//! behind the same trait.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::geometry::PdfSize;
use crate::render::{DocumentInfo, PageRenderEngine, PageSurface, WorkerFault};

// \b keeps "/Pages" nodes from counting as pages.
static PAGE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/Page\b").unwrap());

static MEDIA_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/MediaBox\s*\[\s*(-?[0-9.]+)\s+(-?[0-9.]+)\s+(-?[0-9.]+)\s+(-?[0-9.]+)\s*\]")
        .unwrap()
});

pub struct OutlineEngine {
    pages: Vec<PdfSize>,
}

impl OutlineEngine {
    /// Builds the page table from raw PDF bytes. Documents that carry a
    /// single inherited MediaBox get that size for every page; a
    /// document we cannot read at all becomes one Letter page.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let boxes: Vec<PdfSize> = MEDIA_BOX
            .captures_iter(bytes)
            .filter_map(|caps| {
                let num = |i: usize| -> Option<f64> {
                    std::str::from_utf8(caps.get(i)?.as_bytes())
                        .ok()?
                        .parse()
                        .ok()
                };
                let (x0, y0, x1, y1) = (num(1)?, num(2)?, num(3)?, num(4)?);
                let size = PdfSize {
                    width: (x1 - x0).abs(),
                    height: (y1 - y0).abs(),
                };
                (size.width > 0.0 && size.height > 0.0).then_some(size)
            })
            .collect();

        let page_objects = PAGE_OBJECT.find_iter(bytes).count();
        let count = page_objects.max(boxes.len()).max(1);
        let fallback = boxes.first().copied().unwrap_or(PdfSize::LETTER);
        let pages = (0..count)
            .map(|i| boxes.get(i).copied().unwrap_or(fallback))
            .collect();
        OutlineEngine { pages }
    }

    pub fn document_info(&self) -> DocumentInfo {
        DocumentInfo {
            page_count: self.pages.len() as u32,
            first_page_size: self.pages[0],
        }
    }
}

impl PageRenderEngine for OutlineEngine {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page: u32) -> Result<PdfSize, WorkerFault> {
        self.pages
            .get(page.saturating_sub(1) as usize)
            .copied()
            .ok_or_else(|| WorkerFault::generic(format!("page {page} out of range")))
    }

    fn render(&mut self, page: u32, scale: f64) -> Result<PageSurface, WorkerFault> {
        let size = self.page_size(page)?;
        Ok(PageSurface {
            page,
            scale,
            width_px: (size.width * scale).round() as u32,
            height_px: (size.height * scale).round() as u32,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PAGE_PDF: &[u8] = b"%PDF-1.4\n\
        1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
        2 0 obj << /Type /Pages /MediaBox [0 0 612 792] /Kids [3 0 R 4 0 R] /Count 2 >> endobj\n\
        3 0 obj << /Type /Page /Parent 2 0 R >> endobj\n\
        4 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 595.28 841.89] >> endobj\n\
        %%EOF";

    #[test]
    fn counts_page_objects_not_the_pages_node() {
        let engine = OutlineEngine::from_bytes(TWO_PAGE_PDF);
        assert_eq!(engine.page_count(), 2);
    }

    #[test]
    fn media_boxes_assign_in_document_order() {
        let engine = OutlineEngine::from_bytes(TWO_PAGE_PDF);
        let first = engine.page_size(1).unwrap();
        assert_eq!(first.width, 612.0);
        assert_eq!(first.height, 792.0);
        let second = engine.page_size(2).unwrap();
        assert!((second.width - 595.28).abs() < 1e-9);
    }

    #[test]
    fn unreadable_bytes_become_one_letter_page() {
        let engine = OutlineEngine::from_bytes(b"not a pdf at all");
        assert_eq!(engine.page_count(), 1);
        assert_eq!(engine.page_size(1).unwrap(), PdfSize::LETTER);
    }

    #[test]
    fn surfaces_scale_pixel_dimensions() {
        let mut engine = OutlineEngine::from_bytes(TWO_PAGE_PDF);
        let surface = engine.render(1, 1.5).unwrap();
        assert_eq!(surface.width_px, 918);
        assert_eq!(surface.height_px, 1188);
        assert_eq!(surface.size, PdfSize::LETTER);
    }
}
