pub mod confirm;
pub mod edit_form;
pub mod help_popup;
pub mod images_popup;
pub mod page_view;
pub mod sidebar;
pub mod status_line;
pub mod table_form;

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Centers a popup of `percent_x` x `percent_y` of the surrounding area.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Centers a popup with a fixed column width, percentage height.
pub(crate) fn content_sized_rect(width: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    let available_width = r.width;
    let width = width.min(available_width);
    let margin = (available_width.saturating_sub(width)) / 2;

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(margin),
            Constraint::Length(width),
            Constraint::Length(margin),
        ])
        .split(popup_layout[1])[1]
}
