//! Small yes/no dialog. Destructive actions go through here.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::theme::current_theme;
use crate::widget::content_sized_rect;

pub fn render_confirm(f: &mut Frame, area: Rect, title: &str, message: &str) {
    let palette = current_theme();
    let width = (message.chars().count() + 6).max(30) as u16;
    let popup_area = content_sized_rect(width.min(area.width), 20, area);
    f.render_widget(Clear, popup_area);

    let lines = vec![
        Line::default(),
        Line::from(Span::styled(
            format!("  {message}"),
            Style::default().fg(palette.base_05),
        )),
        Line::default(),
        Line::from(vec![
            Span::styled("  y", Style::default().fg(palette.base_08).add_modifier(Modifier::BOLD)),
            Span::styled(" confirm   ", Style::default().fg(palette.base_03)),
            Span::styled("n", Style::default().fg(palette.base_0b).add_modifier(Modifier::BOLD)),
            Span::styled("/esc cancel", Style::default().fg(palette.base_03)),
        ]),
    ];

    let body = Paragraph::new(lines).block(
        Block::default()
            .title(format!(" {title} "))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.base_08))
            .style(Style::default().bg(palette.base_00)),
    );
    f.render_widget(body, popup_area);
}
