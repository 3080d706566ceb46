//! Bottom status bar: position, zoom, interaction mode, in-flight work
//! and the most recent notification.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::notification::{Notification, NotificationLevel};
use crate::selection::InteractionMode;
use crate::theme::current_theme;

pub struct StatusLine<'a> {
    pub page: u32,
    pub total_pages: u32,
    pub scale: f64,
    pub mode: InteractionMode,
    pub page_input: Option<&'a str>,
    pub busy: Option<&'a str>,
    pub overlays_visible: bool,
    pub notification: Option<&'a Notification>,
}

impl StatusLine<'_> {
    pub fn render(&self, f: &mut Frame, area: Rect) {
        let palette = current_theme();
        let dim = Style::default().fg(palette.base_03);
        let text = Style::default().fg(palette.base_05);

        let mut spans = vec![
            Span::styled(format!(" p {}/{} ", self.page, self.total_pages), text),
            Span::styled(format!(" {:.0}% ", self.scale * 100.0), text),
        ];

        let mode_badge = match self.mode {
            InteractionMode::Browse => None,
            InteractionMode::SelectArea => Some((" SELECT ", palette.base_09)),
            InteractionMode::DrawVerticalLine => Some((" X LINES ", palette.base_0e)),
            InteractionMode::DrawHorizontalLine => Some((" Y LINES ", palette.base_0e)),
        };
        if let Some((badge, color)) = mode_badge {
            spans.push(Span::styled(
                badge,
                Style::default().fg(palette.base_00).bg(color).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(" "));
        }
        if !self.overlays_visible {
            spans.push(Span::styled(" overlays off ", dim));
        }
        if let Some(input) = self.page_input {
            spans.push(Span::styled(
                format!(" go to page: {input}_ "),
                Style::default().fg(palette.base_0a),
            ));
        }
        if let Some(label) = self.busy {
            spans.push(Span::styled(format!(" …{label} "), dim));
        }

        if let Some(note) = self.notification {
            let color = match note.level {
                NotificationLevel::Info => palette.base_0b,
                NotificationLevel::Warning => palette.base_0a,
                NotificationLevel::Error => palette.base_08,
            };
            spans.push(Span::styled(
                format!("  {}", note.message),
                Style::default().fg(color),
            ));
        }

        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
