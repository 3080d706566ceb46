//! Area selection and guide-line placement.
//!
//! One mode enum covers every pointer interaction, so area selection and
//! line drawing can never be armed at the same time. The drag itself is a
//! two-state machine: Idle until pointer-down, Dragging until pointer-up.
//! The selection box is transient UI state; the PDF-space rectangle it
//! collapses to on release is the only thing handed onward.

use crate::geometry::{GeometryError, PdfRect, PdfSize, ScreenPoint, ScreenRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Browse,
    SelectArea,
    DrawVerticalLine,
    DrawHorizontalLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrientation {
    Vertical,
    Horizontal,
}

/// A full-span table guide line, stored in PDF space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideLine {
    pub orientation: LineOrientation,
    /// X for vertical lines, Y for horizontal ones, in PDF points.
    pub position: f64,
}

impl GuideLine {
    /// Endpoint 4-tuple `[x1, y1, x2, y2]` spanning the whole page.
    #[must_use]
    pub fn points(&self, page: PdfSize) -> [f64; 4] {
        match self.orientation {
            LineOrientation::Vertical => [self.position, 0.0, self.position, page.height],
            LineOrientation::Horizontal => [0.0, self.position, page.width, self.position],
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self.orientation {
            LineOrientation::Vertical => format!("x: {:.0}", self.position),
            LineOrientation::Horizontal => format!("y: {:.0}", self.position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging { anchor: ScreenPoint },
}

/// What a pointer-down did, so the caller knows whether to repaint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOutcome {
    Ignored,
    DragStarted,
    LinePlaced(GuideLine),
}

#[derive(Debug)]
pub struct Interaction {
    mode: InteractionMode,
    drag: DragState,
    box_rect: ScreenRect,
    box_visible: bool,
    lines: Vec<GuideLine>,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            mode: InteractionMode::Browse,
            drag: DragState::Idle,
            box_rect: ScreenRect::default(),
            box_visible: false,
            lines: Vec::new(),
        }
    }
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Arm area selection. Forces line drawing off; re-arming while
    /// already armed resets the transient box.
    pub fn enter_select_area(&mut self) {
        self.mode = InteractionMode::SelectArea;
        self.reset_transient();
    }

    /// Toggle vertical guide-line placement. Arms it from any other
    /// mode, disarms back to browsing when already active.
    pub fn toggle_vertical_lines(&mut self) {
        self.toggle_line_mode(InteractionMode::DrawVerticalLine);
    }

    /// Toggle horizontal guide-line placement.
    pub fn toggle_horizontal_lines(&mut self) {
        self.toggle_line_mode(InteractionMode::DrawHorizontalLine);
    }

    fn toggle_line_mode(&mut self, mode: InteractionMode) {
        self.mode = if self.mode == mode {
            InteractionMode::Browse
        } else {
            mode
        };
        self.reset_transient();
    }

    pub fn exit_to_browse(&mut self) {
        self.mode = InteractionMode::Browse;
        self.reset_transient();
    }

    /// Abort any in-flight drag and hide the selection box. The armed
    /// mode and placed lines survive; page navigation calls this.
    pub fn reset_transient(&mut self) {
        self.drag = DragState::Idle;
        self.box_rect = ScreenRect::default();
        self.box_visible = false;
    }

    pub fn pointer_down(
        &mut self,
        p: ScreenPoint,
        scale: f64,
    ) -> Result<PointerOutcome, GeometryError> {
        match self.mode {
            InteractionMode::Browse => Ok(PointerOutcome::Ignored),
            InteractionMode::SelectArea => {
                self.drag = DragState::Dragging { anchor: p };
                self.box_rect = ScreenRect::from_drag(p, p);
                self.box_visible = true;
                Ok(PointerOutcome::DragStarted)
            }
            InteractionMode::DrawVerticalLine => {
                let pdf = ScreenRect::new(p.x, p.y, 0.0, 0.0).to_pdf(scale)?;
                let line = GuideLine {
                    orientation: LineOrientation::Vertical,
                    position: pdf.x,
                };
                self.lines.push(line);
                Ok(PointerOutcome::LinePlaced(line))
            }
            InteractionMode::DrawHorizontalLine => {
                let pdf = ScreenRect::new(p.x, p.y, 0.0, 0.0).to_pdf(scale)?;
                let line = GuideLine {
                    orientation: LineOrientation::Horizontal,
                    position: pdf.y,
                };
                self.lines.push(line);
                Ok(PointerOutcome::LinePlaced(line))
            }
        }
    }

    pub fn pointer_move(&mut self, p: ScreenPoint) {
        if let DragState::Dragging { anchor } = self.drag {
            self.box_rect = ScreenRect::from_drag(anchor, p);
        }
    }

    /// Finish the drag at `p`, converting through the scale active right
    /// now. Returns `None` when no drag was in progress. The box is
    /// hidden, not destroyed; the next drag reuses it.
    pub fn pointer_up(
        &mut self,
        p: ScreenPoint,
        scale: f64,
    ) -> Result<Option<PdfRect>, GeometryError> {
        let DragState::Dragging { anchor } = self.drag else {
            return Ok(None);
        };
        let rect = ScreenRect::from_drag(anchor, p);
        self.drag = DragState::Idle;
        self.box_rect = rect;
        self.box_visible = false;
        Ok(Some(rect.to_pdf(scale)?))
    }

    /// The transient box, only while it should be drawn.
    #[must_use]
    pub fn selection_box(&self) -> Option<ScreenRect> {
        self.box_visible.then_some(self.box_rect)
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    #[must_use]
    pub fn lines(&self) -> &[GuideLine] {
        &self.lines
    }

    pub fn clear_lines(&mut self) {
        self.lines.clear();
    }

    pub fn set_lines(&mut self, lines: Vec<GuideLine>) {
        self.lines = lines;
    }

    /// Endpoint 4-tuples for every placed line, in placement order.
    #[must_use]
    pub fn line_points(&self, page: PdfSize) -> Vec<[f64; 4]> {
        self.lines.iter().map(|l| l.points(page)).collect()
    }
}
