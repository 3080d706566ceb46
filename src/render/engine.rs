//! The page-render engine capability.
//!
//! We only require that, given a page number and a scale, an engine can
//! report pixel dimensions and draw to its surface. Everything else in
//! the crate works against this trait; the built-in [`OutlineEngine`]
//! is the no-rasterizer baseline.
//!
//! [`OutlineEngine`]: crate::render::OutlineEngine

use thiserror::Error;

use crate::geometry::PdfSize;

#[derive(Debug, Error)]
pub enum WorkerFault {
    #[error("render engine: {0}")]
    Engine(String),
    #[error("{detail}")]
    Generic { detail: String },
}

impl WorkerFault {
    pub fn generic(detail: impl Into<String>) -> Self {
        WorkerFault::Generic {
            detail: detail.into(),
        }
    }
}

/// A rendered page: pixel dimensions at the requested scale plus the
/// unscaled page size. The engine owns the actual raster; we only need
/// the geometry to lay out overlays on top of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSurface {
    /// 1-based page number this surface shows.
    pub page: u32,
    /// Scale it was rendered at.
    pub scale: f64,
    pub width_px: u32,
    pub height_px: u32,
    /// Unscaled page dimensions in PDF points.
    pub size: PdfSize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentInfo {
    pub page_count: u32,
    pub first_page_size: PdfSize,
}

pub trait PageRenderEngine: Send {
    fn page_count(&self) -> u32;

    /// Unscaled dimensions of a page, in PDF points.
    fn page_size(&self, page: u32) -> Result<PdfSize, WorkerFault>;

    /// Render one page at one scale and report the resulting surface.
    /// Implementations draw to their own target; two calls never run
    /// concurrently (the scheduler serializes them).
    fn render(&mut self, page: u32, scale: f64) -> Result<PageSurface, WorkerFault>;
}
