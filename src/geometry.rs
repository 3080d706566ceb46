//! Coordinate mapping between PDF space and screen space.
//!
//! PDF space is in points, scale-independent, origin at the top-left of
//! the unscaled page. Screen space is the same geometry multiplied by the
//! current zoom scale. The two are distinct types so they can never be
//! mixed without an explicit conversion.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("invalid scale {0}: must be finite and > 0")]
    InvalidScale(f64),
}

/// Rectangle in PDF points. This is the persisted form.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in screen pixels at some zoom scale. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Pointer position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Unscaled page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfSize {
    pub width: f64,
    pub height: f64,
}

impl PdfSize {
    /// US Letter, the fallback when the engine cannot report a size.
    pub const LETTER: PdfSize = PdfSize {
        width: 612.0,
        height: 792.0,
    };
}

fn check_scale(scale: f64) -> Result<f64, GeometryError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(GeometryError::InvalidScale(scale))
    }
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Absolute right edge (`x1` in edge form).
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Absolute bottom edge (`y1` in edge form).
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Componentwise multiply by `scale`. No clamping, no rounding;
    /// callers round only for display.
    #[must_use]
    pub fn to_screen(&self, scale: f64) -> ScreenRect {
        ScreenRect {
            x: self.x * scale,
            y: self.y * scale,
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Componentwise divide by `scale`. The scale must be finite and
    /// positive; zoom never lets it reach zero, so an error here means a
    /// caller bypassed the viewport.
    pub fn to_pdf(&self, scale: f64) -> Result<PdfRect, GeometryError> {
        let scale = check_scale(scale)?;
        Ok(PdfRect {
            x: self.x / scale,
            y: self.y / scale,
            width: self.width / scale,
            height: self.height / scale,
        })
    }

    /// Normalized rectangle spanned by two drag points. Width and height
    /// are non-negative whichever of the 4 directions the drag went.
    #[must_use]
    pub fn from_drag(p0: ScreenPoint, p1: ScreenPoint) -> Self {
        Self {
            x: p0.x.min(p1.x),
            y: p0.y.min(p1.y),
            width: (p1.x - p0.x).abs(),
            height: (p1.y - p0.y).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_rect_close(a: PdfRect, b: PdfRect) {
        assert!((a.x - b.x).abs() < EPS, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < EPS, "y: {} vs {}", a.y, b.y);
        assert!(
            (a.width - b.width).abs() < EPS,
            "width: {} vs {}",
            a.width,
            b.width
        );
        assert!(
            (a.height - b.height).abs() < EPS,
            "height: {} vs {}",
            a.height,
            b.height
        );
    }

    #[test]
    fn to_screen_multiplies_componentwise() {
        let r = PdfRect::new(10.0, 20.0, 100.0, 50.0);
        let s = r.to_screen(1.5);
        assert_eq!(s, ScreenRect::new(15.0, 30.0, 150.0, 75.0));
    }

    #[test]
    fn roundtrip_preserves_rect() {
        let scales = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 2.75, 3.0];
        let rects = [
            PdfRect::new(0.0, 0.0, 0.0, 0.0),
            PdfRect::new(10.0, 20.0, 100.0, 50.0),
            PdfRect::new(376.66, 69.14, 79.0, 18.0),
            PdfRect::new(0.1, 0.2, 611.9, 791.8),
        ];
        for &scale in &scales {
            for &r in &rects {
                let back = r.to_screen(scale).to_pdf(scale).unwrap();
                assert_rect_close(back, r);
            }
        }
    }

    #[test]
    fn to_pdf_rejects_non_positive_scale() {
        let s = ScreenRect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(s.to_pdf(0.0), Err(GeometryError::InvalidScale(0.0)));
        assert_eq!(s.to_pdf(-1.0), Err(GeometryError::InvalidScale(-1.0)));
        assert!(s.to_pdf(f64::NAN).is_err());
        assert!(s.to_pdf(f64::INFINITY).is_err());
    }

    #[test]
    fn drag_normalization_is_direction_invariant() {
        let corners = [
            (ScreenPoint::new(50.0, 50.0), ScreenPoint::new(150.0, 120.0)),
            (ScreenPoint::new(150.0, 120.0), ScreenPoint::new(50.0, 50.0)),
            (ScreenPoint::new(150.0, 50.0), ScreenPoint::new(50.0, 120.0)),
            (ScreenPoint::new(50.0, 120.0), ScreenPoint::new(150.0, 50.0)),
        ];
        for (p0, p1) in corners {
            let r = ScreenRect::from_drag(p0, p1);
            assert_eq!(r, ScreenRect::new(50.0, 50.0, 100.0, 70.0));
            assert_eq!(r, ScreenRect::from_drag(p1, p0));
        }
    }

    #[test]
    fn drag_to_same_point_is_zero_sized() {
        let p = ScreenPoint::new(33.0, 44.0);
        let r = ScreenRect::from_drag(p, p);
        assert_eq!(r, ScreenRect::new(33.0, 44.0, 0.0, 0.0));
    }

    #[test]
    fn completed_drag_converts_to_pdf_at_current_scale() {
        let r = ScreenRect::from_drag(
            ScreenPoint::new(50.0, 50.0),
            ScreenPoint::new(150.0, 120.0),
        );
        let pdf = r.to_pdf(2.0).unwrap();
        assert_rect_close(pdf, PdfRect::new(25.0, 25.0, 50.0, 35.0));
    }

    #[test]
    fn edge_accessors() {
        let r = PdfRect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.right(), 40.0);
        assert_eq!(r.bottom(), 60.0);
    }
}
