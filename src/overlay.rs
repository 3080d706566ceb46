//! Marker layout for field and table overlays.
//!
//! Layout is a pure recomputation: every call produces the full marker
//! set for one page at one scale, and the previous set is discarded
//! wholesale. Nothing here draws; widgets paint whatever this returns.

use crate::annotations::{Annotation, AnnotationId, AnnotationKind, TableGrid};
use crate::geometry::{PdfRect, ScreenPoint, ScreenRect};

/// Marker fill colors, assigned per annotation id. Order matters: the
/// id hash indexes into this table, and an id must keep its color for
/// the whole session.
pub const MARKER_PALETTE: [Rgb; 15] = [
    Rgb::from_hex(0xFF3366),
    Rgb::from_hex(0xFF6B6B),
    Rgb::from_hex(0xFFA502),
    Rgb::from_hex(0xFFCC00),
    Rgb::from_hex(0x47D990),
    Rgb::from_hex(0x2ED9C3),
    Rgb::from_hex(0x00A0FF),
    Rgb::from_hex(0x6C63FF),
    Rgb::from_hex(0xCC33FF),
    Rgb::from_hex(0xFF71CE),
    Rgb::from_hex(0x01CDFE),
    Rgb::from_hex(0x05FFA1),
    Rgb::from_hex(0xE11D74),
    Rgb::from_hex(0xFF9A00),
    Rgb::from_hex(0x00FFCC),
];

pub const DARK_LABEL: Rgb = Rgb::from_hex(0x333333);
pub const LIGHT_LABEL: Rgb = Rgb::from_hex(0xFFFFFF);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }

    /// Perceived brightness, 0..=255.
    #[must_use]
    pub fn brightness(&self) -> f64 {
        0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b)
    }

    /// Label color with enough contrast against this fill.
    #[must_use]
    pub fn contrast_label(&self) -> Rgb {
        if self.brightness() > 155.0 {
            DARK_LABEL
        } else {
            LIGHT_LABEL
        }
    }
}

/// 31-multiplier string hash in wrapping 32-bit arithmetic.
fn id_hash(id: AnnotationId) -> i32 {
    let mut hash: i32 = 0;
    for c in id.to_string().chars() {
        hash = (c as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    hash
}

/// Deterministic fill color for an annotation id. The same id always
/// lands on the same palette entry.
#[must_use]
pub fn marker_color(id: AnnotationId) -> Rgb {
    let index = (id_hash(id) % MARKER_PALETTE.len() as i32).unsigned_abs() as usize;
    MARKER_PALETTE[index]
}

/// Internal divider lines of a table marker, as offsets from the marker
/// origin in screen pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridLayout {
    pub row_lines: Vec<f64>,
    pub col_lines: Vec<f64>,
    /// Offset of the thicker line under the header row.
    pub header_line: Option<f64>,
    /// True when the grid is an evenly-spaced guess rather than exact
    /// cell boundaries. Painters must say so.
    pub approximate: bool,
}

pub const APPROXIMATE_GRID_NOTE: &str = "Approximate grid - exact cell positions unavailable";

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: AnnotationId,
    pub label: String,
    pub kind: AnnotationKind,
    pub rect: ScreenRect,
    pub fill: Rgb,
    pub label_color: Rgb,
    pub active: bool,
    pub grid: Option<GridLayout>,
}

impl Marker {
    #[must_use]
    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= self.rect.x
            && p.x <= self.rect.x + self.rect.width
            && p.y >= self.rect.y
            && p.y <= self.rect.y + self.rect.height
    }
}

/// Compute the full marker set for one page at one scale. Annotations on
/// other pages produce nothing.
pub fn layout_markers<'a>(
    annotations: impl Iterator<Item = &'a Annotation>,
    page: u32,
    scale: f64,
    active: Option<AnnotationId>,
) -> Vec<Marker> {
    annotations
        .filter(|a| a.page == page)
        .map(|a| {
            let fill = marker_color(a.id);
            let grid = a
                .table
                .as_ref()
                .and_then(|t| t.grid.as_ref())
                .map(|g| grid_layout(g, a.rect, scale));
            Marker {
                id: a.id,
                label: a.name.clone(),
                kind: a.kind,
                rect: a.rect.to_screen(scale),
                fill,
                label_color: fill.contrast_label(),
                active: active == Some(a.id),
                grid,
            }
        })
        .collect()
}

/// Topmost marker under a point. Later markers draw on top of earlier
/// ones, so the scan runs back to front.
#[must_use]
pub fn hit_marker(markers: &[Marker], p: ScreenPoint) -> Option<AnnotationId> {
    markers.iter().rev().find(|m| m.contains(p)).map(|m| m.id)
}

/// Divider lines for a table marker. Strategies in priority order:
/// exact row/column positions, cell bounding boxes, row bounding boxes,
/// then an evenly spaced `rows x cols` guess flagged as approximate.
#[must_use]
pub fn grid_layout(grid: &TableGrid, table: PdfRect, scale: f64) -> GridLayout {
    let width = table.width * scale;
    let height = table.height * scale;

    let mut layout = GridLayout::default();

    if grid.rows_positions.is_some() || grid.cols_positions.is_some() {
        if let Some(rows) = &grid.rows_positions {
            layout.row_lines = interior_offsets(rows, table.y, scale, height);
        }
        if let Some(cols) = &grid.cols_positions {
            layout.col_lines = interior_offsets(cols, table.x, scale, width);
        }
    } else if let Some(cells) = &grid.cell_boxes {
        let row_starts: Vec<f64> = cells.iter().map(|b| b[1]).collect();
        let col_starts: Vec<f64> = cells.iter().map(|b| b[0]).collect();
        layout.row_lines = interior_offsets(&dedup_sorted(row_starts), table.y, scale, height);
        layout.col_lines = interior_offsets(&dedup_sorted(col_starts), table.x, scale, width);
    } else if let Some(rows) = &grid.row_boxes {
        let row_starts: Vec<f64> = rows.iter().map(|b| b[1]).collect();
        layout.row_lines = interior_offsets(&dedup_sorted(row_starts), table.y, scale, height);
        layout.col_lines = even_offsets(grid.col_count, width);
    } else {
        layout.row_lines = even_offsets(grid.row_count, height);
        layout.col_lines = even_offsets(grid.col_count, width);
        layout.approximate = true;
    }

    if grid.has_header {
        layout.header_line = layout.row_lines.first().copied().or_else(|| {
            (grid.row_count > 1).then(|| height / f64::from(grid.row_count))
        });
    }

    layout
}

/// PDF-space boundary positions to screen offsets, keeping only lines
/// strictly inside the table.
fn interior_offsets(positions: &[f64], origin: f64, scale: f64, extent: f64) -> Vec<f64> {
    positions
        .iter()
        .map(|pos| (pos - origin) * scale)
        .filter(|&off| off > 0.0 && off < extent)
        .collect()
}

fn even_offsets(count: u32, extent: f64) -> Vec<f64> {
    if count < 2 {
        return Vec::new();
    }
    (1..count)
        .map(|i| extent * f64::from(i) / f64::from(count))
        .collect()
}

fn dedup_sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() < 0.5);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Annotation, TableDetails};

    fn field(id: i64, page: u32) -> Annotation {
        Annotation::field(
            AnnotationId(id),
            format!("f{id}"),
            page,
            PdfRect::new(10.0, 20.0, 100.0, 50.0),
        )
    }

    #[test]
    fn markers_only_for_the_current_page() {
        let anns = vec![field(1, 2), field(2, 2)];
        assert!(layout_markers(anns.iter(), 1, 1.0, None).is_empty());

        let markers = layout_markers(anns.iter(), 2, 1.5, None);
        assert_eq!(markers.len(), 2);
        for m in &markers {
            assert_eq!(m.rect, ScreenRect::new(15.0, 30.0, 150.0, 75.0));
        }
    }

    #[test]
    fn color_is_deterministic_per_id() {
        let a = marker_color(AnnotationId(1));
        let b = marker_color(AnnotationId(1));
        assert_eq!(a, b);
        // '1' is char code 49, 49 % 15 == 4.
        assert_eq!(a, MARKER_PALETTE[4]);
        // "10": 49*31 + 48 == 1567, 1567 % 15 == 7.
        assert_eq!(marker_color(AnnotationId(10)), MARKER_PALETTE[7]);
    }

    #[test]
    fn brightness_threshold_picks_label_color() {
        assert_eq!(Rgb::from_hex(0xFFFFFF).brightness(), 255.0);
        assert_eq!(Rgb::from_hex(0xFFFFFF).contrast_label(), DARK_LABEL);
        assert_eq!(Rgb::from_hex(0x000000).brightness(), 0.0);
        assert_eq!(Rgb::from_hex(0x000000).contrast_label(), LIGHT_LABEL);
        // Yellow is bright enough for dark text, the red is not.
        assert_eq!(Rgb::from_hex(0xFFCC00).contrast_label(), DARK_LABEL);
        assert_eq!(Rgb::from_hex(0xFF3366).contrast_label(), LIGHT_LABEL);
    }

    #[test]
    fn active_flag_is_exclusive() {
        let anns = vec![field(1, 1), field(2, 1)];
        let markers = layout_markers(anns.iter(), 1, 1.0, Some(AnnotationId(2)));
        assert!(!markers[0].active);
        assert!(markers[1].active);
    }

    #[test]
    fn hit_test_prefers_the_topmost_marker() {
        let mut a = field(1, 1);
        a.rect = PdfRect::new(0.0, 0.0, 100.0, 100.0);
        let mut b = field(2, 1);
        b.rect = PdfRect::new(50.0, 50.0, 100.0, 100.0);
        let markers = layout_markers([a, b].iter(), 1, 1.0, None);

        assert_eq!(
            hit_marker(&markers, ScreenPoint::new(75.0, 75.0)),
            Some(AnnotationId(2))
        );
        assert_eq!(
            hit_marker(&markers, ScreenPoint::new(10.0, 10.0)),
            Some(AnnotationId(1))
        );
        assert_eq!(hit_marker(&markers, ScreenPoint::new(500.0, 500.0)), None);
    }

    fn table_with_grid(grid: TableGrid) -> Annotation {
        let mut t = Annotation::table(
            AnnotationId(5),
            "t",
            1,
            PdfRect::new(100.0, 200.0, 200.0, 100.0),
        );
        t.table = Some(TableDetails {
            grid: Some(grid),
            ..TableDetails::default()
        });
        t
    }

    #[test]
    fn exact_positions_map_to_scaled_offsets() {
        let grid = TableGrid {
            row_count: 3,
            col_count: 2,
            rows_positions: Some(vec![200.0, 230.0, 260.0, 300.0]),
            cols_positions: Some(vec![150.0, 250.0]),
            ..TableGrid::default()
        };
        let ann = table_with_grid(grid);
        let markers = layout_markers(std::iter::once(&ann), 1, 2.0, None);
        let layout = markers[0].grid.as_ref().unwrap();

        // Boundaries on the table edge (200.0 and 300.0) are dropped.
        assert_eq!(layout.row_lines, vec![60.0, 120.0]);
        assert_eq!(layout.col_lines, vec![100.0, 300.0]);
        assert!(!layout.approximate);
    }

    #[test]
    fn cell_boxes_derive_both_axes() {
        let grid = TableGrid {
            row_count: 2,
            col_count: 2,
            cell_boxes: Some(vec![
                [100.0, 200.0, 200.0, 250.0],
                [200.0, 200.0, 300.0, 250.0],
                [100.0, 250.0, 200.0, 300.0],
                [200.0, 250.0, 300.0, 300.0],
            ]),
            ..TableGrid::default()
        };
        let ann = table_with_grid(grid);
        let markers = layout_markers(std::iter::once(&ann), 1, 1.0, None);
        let layout = markers[0].grid.as_ref().unwrap();

        assert_eq!(layout.row_lines, vec![50.0]);
        assert_eq!(layout.col_lines, vec![100.0]);
        assert!(!layout.approximate);
    }

    #[test]
    fn fallback_grid_is_even_and_flagged() {
        let grid = TableGrid {
            row_count: 4,
            col_count: 2,
            ..TableGrid::default()
        };
        let ann = table_with_grid(grid);
        let markers = layout_markers(std::iter::once(&ann), 1, 1.0, None);
        let layout = markers[0].grid.as_ref().unwrap();

        assert_eq!(layout.row_lines, vec![25.0, 50.0, 75.0]);
        assert_eq!(layout.col_lines, vec![100.0]);
        assert!(layout.approximate);
    }

    #[test]
    fn header_line_sits_under_the_first_row() {
        let grid = TableGrid {
            row_count: 2,
            col_count: 1,
            has_header: true,
            rows_positions: Some(vec![240.0]),
            ..TableGrid::default()
        };
        let ann = table_with_grid(grid);
        let markers = layout_markers(std::iter::once(&ann), 1, 1.0, None);
        let layout = markers[0].grid.as_ref().unwrap();
        assert_eq!(layout.header_line, Some(40.0));

        let even = TableGrid {
            row_count: 2,
            col_count: 1,
            has_header: true,
            ..TableGrid::default()
        };
        let ann = table_with_grid(even);
        let markers = layout_markers(std::iter::once(&ann), 1, 1.0, None);
        assert_eq!(markers[0].grid.as_ref().unwrap().header_line, Some(50.0));
    }
}
