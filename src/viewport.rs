//! Viewport state machine: current page, zoom scale, page dimensions.
//!
//! Commands mutate the state and return effects for the caller to run.
//! The machine itself is pure and synchronous; rendering and network
//! traffic happen in whoever interprets the effects. After any effective
//! page or scale transition the effect list always ends with
//! [`Effect::RelayoutOverlays`]: markers for the previous page/scale must
//! never stay visible.

use crate::geometry::PdfSize;

pub const ZOOM_STEP: f64 = 0.25;
/// Authoritative upper bound for zoom-in.
pub const MAX_SCALE: f64 = 3.0;
/// Hard floor for zoom-out. Never reached: a step that would land on or
/// below it is refused, so with quarter steps the smallest reachable
/// scale is 0.5.
pub const MIN_SCALE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// A document finished loading; resets page and scale.
    LoadDocument { total_pages: u32, initial_scale: f64 },
    GoToPage(u32),
    NextPage,
    PrevPage,
    ZoomIn,
    ZoomOut,
    SetScale(f64),
    /// Engine reported the unscaled dimensions of the current page.
    SetPageSize(PdfSize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Schedule a page render at the given scale.
    RenderPage { page: u32, scale: f64 },
    /// Recompute all marker layouts for the current page and scale.
    RelayoutOverlays,
    /// Abort any in-flight drag or line placement.
    ResetInteraction,
    /// An out-of-range page was requested: put the current page number
    /// back into the visible input, no error message.
    RevertPageInput,
    /// Push unscaled page dimensions to the server, fire-and-forget.
    SyncDimensions(PdfSize),
}

#[derive(Debug, Clone)]
pub struct Viewport {
    page: u32,
    scale: f64,
    total_pages: u32,
    page_size: PdfSize,
    dims_synced: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            page: 1,
            scale: 1.0,
            total_pages: 0,
            page_size: PdfSize::LETTER,
            dims_synced: false,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    #[must_use]
    pub fn page_size(&self) -> PdfSize {
        self.page_size
    }

    /// Scale sanitizer for values coming from config files or saved
    /// sessions. Non-finite input falls back to 1.0, everything else is
    /// clamped to the reachable zoom range.
    #[must_use]
    pub fn clamp_scale(value: f64) -> f64 {
        if !value.is_finite() {
            return 1.0;
        }
        value.clamp(MIN_SCALE + ZOOM_STEP, MAX_SCALE)
    }

    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::LoadDocument {
                total_pages,
                initial_scale,
            } => {
                self.total_pages = total_pages;
                self.page = 1;
                self.scale = Self::clamp_scale(initial_scale);
                self.dims_synced = false;
                self.transition_effects()
            }
            Command::GoToPage(n) => {
                if n < 1 || n > self.total_pages {
                    return vec![Effect::RevertPageInput];
                }
                self.page = n;
                self.transition_effects()
            }
            Command::NextPage => {
                if self.page >= self.total_pages {
                    return vec![];
                }
                self.page += 1;
                self.transition_effects()
            }
            Command::PrevPage => {
                if self.page <= 1 {
                    return vec![];
                }
                self.page -= 1;
                self.transition_effects()
            }
            Command::ZoomIn => {
                if self.scale + ZOOM_STEP > MAX_SCALE {
                    return vec![];
                }
                self.scale += ZOOM_STEP;
                self.transition_effects()
            }
            Command::ZoomOut => {
                if self.scale - ZOOM_STEP <= MIN_SCALE {
                    return vec![];
                }
                self.scale -= ZOOM_STEP;
                self.transition_effects()
            }
            Command::SetScale(value) => {
                let clamped = Self::clamp_scale(value);
                if (clamped - self.scale).abs() < f64::EPSILON {
                    return vec![];
                }
                self.scale = clamped;
                self.transition_effects()
            }
            Command::SetPageSize(size) => {
                self.page_size = size;
                if self.dims_synced {
                    vec![]
                } else {
                    self.dims_synced = true;
                    vec![Effect::SyncDimensions(size)]
                }
            }
        }
    }

    fn transition_effects(&self) -> Vec<Effect> {
        vec![
            Effect::ResetInteraction,
            Effect::RenderPage {
                page: self.page,
                scale: self.scale,
            },
            Effect::RelayoutOverlays,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(total_pages: u32) -> Viewport {
        let mut vp = Viewport::new();
        vp.apply(Command::LoadDocument {
            total_pages,
            initial_scale: 1.0,
        });
        vp
    }

    fn render(page: u32, scale: f64) -> Vec<Effect> {
        vec![
            Effect::ResetInteraction,
            Effect::RenderPage { page, scale },
            Effect::RelayoutOverlays,
        ]
    }

    #[test]
    fn load_renders_first_page() {
        let mut vp = Viewport::new();
        let effects = vp.apply(Command::LoadDocument {
            total_pages: 5,
            initial_scale: 1.0,
        });
        assert_eq!(effects, render(1, 1.0));
        assert_eq!(vp.page(), 1);
        assert_eq!(vp.total_pages(), 5);
    }

    #[test]
    fn goto_valid_page_renders_it() {
        let mut vp = loaded(5);
        let effects = vp.apply(Command::GoToPage(3));
        assert_eq!(effects, render(3, 1.0));
        assert_eq!(vp.page(), 3);
    }

    #[test]
    fn goto_out_of_range_reverts_input_without_render() {
        let mut vp = loaded(5);
        vp.apply(Command::GoToPage(2));

        assert_eq!(vp.apply(Command::GoToPage(0)), vec![Effect::RevertPageInput]);
        assert_eq!(vp.page(), 2);
        assert_eq!(vp.apply(Command::GoToPage(6)), vec![Effect::RevertPageInput]);
        assert_eq!(vp.page(), 2);
    }

    #[test]
    fn next_prev_stop_silently_at_bounds() {
        let mut vp = loaded(2);
        assert_eq!(vp.apply(Command::PrevPage), vec![]);
        assert_eq!(vp.apply(Command::NextPage), render(2, 1.0));
        assert_eq!(vp.apply(Command::NextPage), vec![]);
        assert_eq!(vp.page(), 2);
    }

    #[test]
    fn zoom_in_then_out_restores_scale() {
        let mut vp = loaded(1);
        vp.apply(Command::ZoomIn);
        assert_eq!(vp.scale(), 1.25);
        vp.apply(Command::ZoomOut);
        assert!((vp.scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zoom_in_caps_at_max() {
        let mut vp = loaded(1);
        for _ in 0..20 {
            vp.apply(Command::ZoomIn);
        }
        assert_eq!(vp.scale(), MAX_SCALE);
        assert_eq!(vp.apply(Command::ZoomIn), vec![]);
        assert_eq!(vp.scale(), MAX_SCALE);
    }

    #[test]
    fn zoom_out_never_reaches_floor() {
        let mut vp = loaded(1);
        for _ in 0..20 {
            vp.apply(Command::ZoomOut);
        }
        assert_eq!(vp.scale(), 0.5);
        assert_eq!(vp.apply(Command::ZoomOut), vec![]);
    }

    #[test]
    fn zoom_transition_renders_current_page_at_new_scale() {
        let mut vp = loaded(4);
        vp.apply(Command::GoToPage(2));
        assert_eq!(vp.apply(Command::ZoomIn), render(2, 1.25));
    }

    #[test]
    fn set_scale_clamps_and_skips_no_ops() {
        let mut vp = loaded(1);
        assert_eq!(vp.apply(Command::SetScale(10.0)), render(1, MAX_SCALE));
        assert_eq!(vp.apply(Command::SetScale(MAX_SCALE)), vec![]);
        vp.apply(Command::SetScale(f64::NAN));
        assert_eq!(vp.scale(), 1.0);
    }

    #[test]
    fn first_page_size_triggers_dimension_sync_once() {
        let mut vp = loaded(1);
        let size = PdfSize {
            width: 595.0,
            height: 842.0,
        };
        assert_eq!(
            vp.apply(Command::SetPageSize(size)),
            vec![Effect::SyncDimensions(size)]
        );
        assert_eq!(vp.apply(Command::SetPageSize(size)), vec![]);
        assert_eq!(vp.page_size(), size);
    }

    #[test]
    fn reload_resets_page_and_sync_flag() {
        let mut vp = loaded(5);
        vp.apply(Command::GoToPage(4));
        vp.apply(Command::SetPageSize(PdfSize::LETTER));

        let effects = vp.apply(Command::LoadDocument {
            total_pages: 3,
            initial_scale: 2.0,
        });
        assert_eq!(effects, render(1, 2.0));
        assert_eq!(
            vp.apply(Command::SetPageSize(PdfSize::LETTER)),
            vec![Effect::SyncDimensions(PdfSize::LETTER)]
        );
    }
}
