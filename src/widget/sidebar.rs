//! Field list panel. Shows every configured annotation with the same
//! color it carries on the page, and tracks the row selection used by
//! keyboard navigation.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
};

use crate::annotations::{Annotation, AnnotationId, AnnotationKind};
use crate::overlay::marker_color;
use crate::theme::current_theme;

pub struct Sidebar {
    pub selected: usize,
    list_state: ListState,
    last_area: Option<Rect>,
}

impl Default for Sidebar {
    fn default() -> Self {
        Self::new()
    }
}

impl Sidebar {
    pub fn new() -> Self {
        Sidebar {
            selected: 0,
            list_state: ListState::default(),
            last_area: None,
        }
    }

    pub fn move_down(&mut self, len: usize) {
        if len > 0 && self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Keeps the selection inside the list after items are removed.
    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    /// Maps a click inside the panel to a row index, updating the
    /// selection. Returns the picked index when the click landed on an
    /// item.
    pub fn handle_mouse_click(&mut self, x: u16, y: u16, len: usize) -> Option<usize> {
        let area = self.last_area?;
        if x < area.x || x >= area.right() || y < area.y || y >= area.bottom() {
            return None;
        }
        let row = (y - area.y) as usize + self.list_state.offset();
        if row >= len {
            return None;
        }
        self.selected = row;
        Some(row)
    }

    pub fn render(
        &mut self,
        f: &mut Frame,
        area: Rect,
        is_focused: bool,
        items: &[&Annotation],
        active: Option<AnnotationId>,
    ) {
        let palette = current_theme();
        let (text_color, border_color, _bg) = palette.get_panel_colors(is_focused);
        let (selection_bg, selection_fg) = palette.get_selection_colors(is_focused);

        let rows: Vec<ListItem> = items
            .iter()
            .map(|ann| {
                let glyph = match ann.kind {
                    AnnotationKind::Table => "▦ ",
                    AnnotationKind::Field => "▭ ",
                };
                let rgb = marker_color(ann.id);
                let name_style = if active == Some(ann.id) {
                    Style::default().fg(palette.base_08)
                } else {
                    Style::default().fg(text_color)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(glyph, Style::default().fg(Color::Rgb(rgb.r, rgb.g, rgb.b))),
                    Span::styled(ann.name.clone(), name_style),
                    Span::styled(format!("  p{}", ann.page), Style::default().fg(palette.base_03)),
                ]))
            })
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .title(format!(" fields ({}) ", items.len()));
        self.last_area = Some(block.inner(area));

        self.clamp(items.len());
        if items.is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(self.selected));
        }

        let list = List::new(rows)
            .block(block)
            .highlight_style(Style::default().bg(selection_bg).fg(selection_fg));
        f.render_stateful_widget(list, area, &mut self.list_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_stays_in_bounds() {
        let mut sidebar = Sidebar::new();
        sidebar.move_down(3);
        sidebar.move_down(3);
        sidebar.move_down(3);
        assert_eq!(sidebar.selected, 2);
        sidebar.clamp(1);
        assert_eq!(sidebar.selected, 0);
        sidebar.move_up();
        assert_eq!(sidebar.selected, 0);
    }
}
