//! Page canvas: draws the rendered page footprint plus every overlay
//! (markers, table grids, the selection box, guide lines) in terminal
//! cells. Overlay geometry is computed in screen pixels by the core
//! modules; this widget only converts pixels to cells and paints.

use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::geometry::ScreenRect;
use crate::labels;
use crate::overlay::{APPROXIMATE_GRID_NOTE, Marker, Rgb};
use crate::render::PageSurface;
use crate::selection::{GuideLine, LineOrientation};
use crate::theme::current_theme;

/// Pixel footprint of one terminal cell. Mouse positions arrive in
/// cells while selection geometry is tracked in pixels, so both the
/// painter and the mouse mapping share one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width_px: f64,
    pub height_px: f64,
}

impl CellMetrics {
    /// Typical monospace raster when the terminal does not report one.
    pub const DEFAULT: CellMetrics = CellMetrics {
        width_px: 8.0,
        height_px: 16.0,
    };

    /// One pixel per cell. Keeps coordinate math transparent in tests.
    pub const UNIT: CellMetrics = CellMetrics {
        width_px: 1.0,
        height_px: 1.0,
    };

    /// Screen-pixel position of a cell's top-left corner relative to
    /// the page origin.
    pub fn cell_to_px(&self, origin: Rect, column: u16, row: u16) -> (f64, f64) {
        let dx = column.saturating_sub(origin.x) as f64;
        let dy = row.saturating_sub(origin.y) as f64;
        (dx * self.width_px, dy * self.height_px)
    }
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

/// Cell span covering the pixel range `[px0, px1)`. Always at least
/// one cell wide so thin markers stay visible.
fn px_span(px0: f64, px1: f64, cell_px: f64) -> (u16, u16) {
    let start = (px0 / cell_px).floor().max(0.0) as u16;
    let end = (px1 / cell_px).ceil().max(0.0) as u16;
    (start, end.max(start + 1))
}

fn px_offset(px: f64, cell_px: f64) -> u16 {
    (px / cell_px).round().max(0.0) as u16
}

pub struct PageView<'a> {
    pub surface: Option<&'a PageSurface>,
    pub markers: &'a [Marker],
    pub selection: Option<ScreenRect>,
    pub guides: &'a [GuideLine],
    pub scale: f64,
    pub metrics: CellMetrics,
    pub focused: bool,
    pub placeholder: &'a str,
}

impl PageView<'_> {
    /// Draws the view and returns the cell area occupied by the page
    /// itself, which the caller uses to map mouse positions back to
    /// screen pixels. Returns an empty rect while no page is rendered.
    pub fn render(&self, f: &mut Frame, area: Rect) -> Rect {
        let palette = current_theme();
        let border = if self.focused {
            palette.base_0c
        } else {
            palette.base_03
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" document ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let Some(surface) = self.surface else {
            let msg = Paragraph::new(Line::from(Span::styled(
                self.placeholder,
                Style::default().fg(palette.base_03),
            )))
            .alignment(Alignment::Center);
            let y = inner.y + inner.height / 2;
            let msg_area = Rect::new(inner.x, y.min(inner.bottom().saturating_sub(1)), inner.width, 1);
            f.render_widget(msg, msg_area);
            return Rect::default();
        };

        let cols = (surface.width_px as f64 / self.metrics.width_px).ceil() as u16;
        let rows = (surface.height_px as f64 / self.metrics.height_px).ceil() as u16;
        let page = Rect::new(
            inner.x,
            inner.y,
            cols.min(inner.width),
            rows.min(inner.height),
        );
        if page.width == 0 || page.height == 0 {
            return Rect::default();
        }

        let buf = f.buffer_mut();
        for y in page.top()..page.bottom() {
            for x in page.left()..page.right() {
                buf[(x, y)]
                    .set_symbol(" ")
                    .set_bg(palette.base_07)
                    .set_fg(palette.base_00);
            }
        }

        let mut any_approximate = false;
        for marker in self.markers {
            self.paint_marker(f, page, marker);
            if marker.grid.as_ref().is_some_and(|g| g.approximate) {
                any_approximate = true;
            }
        }
        if let Some(rect) = self.selection {
            self.paint_selection(f, page, rect);
        }
        for guide in self.guides {
            self.paint_guide(f, page, guide);
        }
        if any_approximate && inner.bottom() > page.bottom() {
            let note = Paragraph::new(Line::from(Span::styled(
                APPROXIMATE_GRID_NOTE,
                Style::default().fg(palette.base_0a),
            )));
            f.render_widget(note, Rect::new(inner.x, page.bottom(), inner.width, 1));
        }

        page
    }

    fn paint_marker(&self, f: &mut Frame, page: Rect, marker: &Marker) {
        let (cx0, cx1) = px_span(marker.rect.x, marker.rect.right(), self.metrics.width_px);
        let (cy0, cy1) = px_span(marker.rect.y, marker.rect.bottom(), self.metrics.height_px);
        let x0 = page.x.saturating_add(cx0).min(page.right());
        let x1 = page.x.saturating_add(cx1).min(page.right());
        let y0 = page.y.saturating_add(cy0).min(page.bottom());
        let y1 = page.y.saturating_add(cy1).min(page.bottom());
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let fill = to_color(marker.fill);
        let label_fg = to_color(marker.label_color);
        let buf = f.buffer_mut();
        for y in y0..y1 {
            for x in x0..x1 {
                buf[(x, y)].set_symbol(" ").set_bg(fill);
            }
        }

        if let Some(grid) = &marker.grid {
            let grid_style = Style::default().fg(label_fg).bg(fill);
            for &py in &grid.row_lines {
                let y = y0.saturating_add(px_offset(py, self.metrics.height_px));
                if y < y1 {
                    for x in x0..x1 {
                        buf[(x, y)].set_symbol("─").set_style(grid_style);
                    }
                }
            }
            for &px in &grid.col_lines {
                let x = x0.saturating_add(px_offset(px, self.metrics.width_px));
                if x < x1 {
                    for y in y0..y1 {
                        buf[(x, y)].set_symbol("│").set_style(grid_style);
                    }
                }
            }
            if let Some(py) = grid.header_line {
                let y = y0.saturating_add(px_offset(py, self.metrics.height_px));
                if y < y1 {
                    for x in x0..x1 {
                        buf[(x, y)].set_symbol("═").set_style(grid_style);
                    }
                }
            }
        }

        let mut label_style = Style::default().fg(label_fg).bg(fill);
        if marker.active {
            label_style = label_style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        }
        let width = (x1 - x0) as usize;
        for (i, ch) in marker.label.chars().take(width).enumerate() {
            let x = x0 + i as u16;
            buf[(x, y0)].set_symbol(&ch.to_string()).set_style(label_style);
        }
    }

    fn paint_selection(&self, f: &mut Frame, page: Rect, rect: ScreenRect) {
        let palette = current_theme();
        let (cx0, cx1) = px_span(rect.x, rect.right(), self.metrics.width_px);
        let (cy0, cy1) = px_span(rect.y, rect.bottom(), self.metrics.height_px);
        let x0 = page.x.saturating_add(cx0).min(page.right().saturating_sub(1));
        let x1 = page.x.saturating_add(cx1).min(page.right());
        let y0 = page.y.saturating_add(cy0).min(page.bottom().saturating_sub(1));
        let y1 = page.y.saturating_add(cy1).min(page.bottom());
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let style = Style::default().fg(palette.base_09);
        let buf = f.buffer_mut();
        let (xe, ye) = (x1 - 1, y1 - 1);
        for x in x0..x1 {
            buf[(x, y0)].set_symbol("┄").set_style(style);
            buf[(x, ye)].set_symbol("┄").set_style(style);
        }
        for y in y0..y1 {
            buf[(x0, y)].set_symbol("┆").set_style(style);
            buf[(xe, y)].set_symbol("┆").set_style(style);
        }
        buf[(x0, y0)].set_symbol("┌").set_style(style);
        buf[(xe, y0)].set_symbol("┐").set_style(style);
        buf[(x0, ye)].set_symbol("└").set_style(style);
        buf[(xe, ye)].set_symbol("┘").set_style(style);

        // Live readout in PDF points so the user sees what will be saved.
        if self.scale > 0.0 {
            let readout = format!(
                "{} {}",
                labels::format_point(rect.x / self.scale, rect.y / self.scale),
                labels::format_dims(rect.width / self.scale, rect.height / self.scale),
            );
            self.paint_label(f, page, x0, y1, &readout, style);
        }
    }

    fn paint_guide(&self, f: &mut Frame, page: Rect, guide: &GuideLine) {
        let palette = current_theme();
        let style = Style::default().fg(palette.base_0e);
        let label = guide.label();
        let buf = f.buffer_mut();
        match guide.orientation {
            LineOrientation::Vertical => {
                let x = page
                    .x
                    .saturating_add(px_offset(guide.position * self.scale, self.metrics.width_px));
                if x >= page.right() {
                    return;
                }
                for y in page.top()..page.bottom() {
                    buf[(x, y)].set_symbol("│").set_style(style);
                }
                self.paint_label(f, page, x.saturating_add(1), page.y, &label, style);
            }
            LineOrientation::Horizontal => {
                let y = page
                    .y
                    .saturating_add(px_offset(guide.position * self.scale, self.metrics.height_px));
                if y >= page.bottom() {
                    return;
                }
                for x in page.left()..page.right() {
                    buf[(x, y)].set_symbol("─").set_style(style);
                }
                self.paint_label(f, page, page.x, y, &label, style);
            }
        }
    }

    fn paint_label(&self, f: &mut Frame, page: Rect, x0: u16, y: u16, text: &str, style: Style) {
        if y >= page.bottom() {
            return;
        }
        let buf = f.buffer_mut();
        for (i, ch) in text.chars().enumerate() {
            let x = x0 + i as u16;
            if x >= page.right() {
                break;
            }
            buf[(x, y)].set_symbol(&ch.to_string()).set_style(style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_spans_cover_at_least_one_cell() {
        assert_eq!(px_span(0.0, 16.0, 8.0), (0, 2));
        assert_eq!(px_span(4.0, 6.0, 8.0), (0, 1));
        assert_eq!(px_span(20.0, 20.5, 8.0), (2, 3));
    }

    #[test]
    fn cell_to_px_is_relative_to_page_origin() {
        let metrics = CellMetrics::DEFAULT;
        let origin = Rect::new(3, 2, 40, 20);
        assert_eq!(metrics.cell_to_px(origin, 3, 2), (0.0, 0.0));
        assert_eq!(metrics.cell_to_px(origin, 5, 4), (16.0, 32.0));
    }

    #[test]
    fn unit_metrics_map_cells_directly() {
        let origin = Rect::new(0, 0, 100, 100);
        assert_eq!(CellMetrics::UNIT.cell_to_px(origin, 42, 7), (42.0, 7.0));
    }
}
