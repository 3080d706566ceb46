//! Saved template images popup: list, refresh and delete.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::api::TemplateImage;
use crate::theme::current_theme;
use crate::widget::centered_rect;

pub enum ImagesAction {
    Refresh,
    Delete(i64),
    Close,
}

pub struct ImagesPopup {
    pub images: Vec<TemplateImage>,
    pub loading: bool,
    selected: usize,
    last_area: Option<Rect>,
}

impl Default for ImagesPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagesPopup {
    pub fn new() -> Self {
        ImagesPopup {
            images: Vec::new(),
            loading: true,
            selected: 0,
            last_area: None,
        }
    }

    pub fn set_images(&mut self, images: Vec<TemplateImage>) {
        self.images = images;
        self.loading = false;
        if self.selected >= self.images.len() {
            self.selected = self.images.len().saturating_sub(1);
        }
    }

    pub fn is_outside_popup_area(&self, x: u16, y: u16) -> bool {
        match self.last_area {
            Some(area) => {
                x < area.x || x >= area.x + area.width || y < area.y || y >= area.y + area.height
            }
            None => true,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ImagesAction> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Some(ImagesAction::Close),
            KeyCode::Char('r') => Some(ImagesAction::Refresh),
            KeyCode::Char('d') | KeyCode::Delete => {
                self.images.get(self.selected).map(|img| ImagesAction::Delete(img.id))
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.images.is_empty() && self.selected + 1 < self.images.len() {
                    self.selected += 1;
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            _ => None,
        }
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect) {
        let palette = current_theme();
        let popup_area = centered_rect(44, 50, area);
        self.last_area = Some(popup_area);
        f.render_widget(Clear, popup_area);

        let mut lines = Vec::new();
        if self.loading {
            lines.push(Line::from(Span::styled(
                "  loading…",
                Style::default().fg(palette.base_03),
            )));
        } else if self.images.is_empty() {
            lines.push(Line::from(Span::styled(
                "  no images saved for this template",
                Style::default().fg(palette.base_03),
            )));
        } else {
            for (idx, img) in self.images.iter().enumerate() {
                let label = img
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("image #{}", img.id));
                let style = if idx == self.selected {
                    Style::default().fg(palette.base_06).bg(palette.base_02)
                } else {
                    Style::default().fg(palette.base_05)
                };
                lines.push(Line::from(Span::styled(format!("  {label}"), style)));
            }
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "  d delete · r refresh · esc close",
            Style::default().fg(palette.base_03),
        )));

        let body = Paragraph::new(lines).block(
            Block::default()
                .title(format!(" images ({}) ", self.images.len()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.base_0c))
                .style(Style::default().bg(palette.base_00)),
        );
        f.render_widget(body, popup_area);
    }
}
