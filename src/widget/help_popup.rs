use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::theme::current_theme;
use crate::widget::content_sized_rect;

const HELP_TEXT: &str = "\
Navigation
  n / ]          next page
  p / [          previous page
  1-9 then enter jump to page (esc cancels)
  + / =          zoom in (max 300%)
  -              zoom out (min 50%)
  tab            switch focus between fields and page

Marking regions
  s              toggle select-area mode, then drag with the mouse
  x              toggle vertical guide lines (click to place)
  y              toggle horizontal guide lines (click to place)
  c              clear guide lines
  click marker   open it for editing
  o              show or hide overlays

Fields
  j / k          move in the field list
  enter          open the selected field
  d              delete the selected field (asks first)
  r              reload fields from the server
  m              saved images

Editor
  enter          save
  ctrl+e         extract text from the region
  ctrl+p         extract images from the region
  ctrl+f         grow region to the whole page
  ctrl+t         table settings (tables only)

Other
  ?              this help
  q              quit
";

pub enum HelpPopupAction {
    Close,
}

pub struct HelpPopup {
    content: String,
    scroll_offset: usize,
    last_popup_area: Option<Rect>,
}

impl Default for HelpPopup {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpPopup {
    pub fn new() -> Self {
        HelpPopup {
            content: HELP_TEXT.to_string(),
            scroll_offset: 0,
            last_popup_area: None,
        }
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect) {
        let palette = current_theme();
        let max_content_width = self
            .content
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(80);
        let desired_width = (max_content_width + 6).min(area.width as usize);

        let popup_area = content_sized_rect(desired_width as u16, 90, area);
        self.last_popup_area = Some(popup_area);

        f.render_widget(Clear, popup_area);

        let lines: Vec<Line> = self
            .content
            .lines()
            .skip(self.scroll_offset)
            .map(|line| {
                Line::from(Span::styled(
                    format!("  {line}"),
                    Style::default().fg(palette.base_05),
                ))
            })
            .collect();

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(" Help - Press ? or ESC to close ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.base_0c))
                    .style(Style::default().bg(palette.base_00)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(paragraph, popup_area);
    }

    pub fn scroll_down(&mut self) {
        let max_lines = self.content.lines().count();
        if self.scroll_offset < max_lines.saturating_sub(1) {
            self.scroll_offset += 1;
        }
    }

    pub fn scroll_up(&mut self) {
        if self.scroll_offset > 0 {
            self.scroll_offset -= 1;
        }
    }

    pub fn is_outside_popup_area(&self, x: u16, y: u16) -> bool {
        if let Some(popup_area) = self.last_popup_area {
            x < popup_area.x
                || x >= popup_area.x + popup_area.width
                || y < popup_area.y
                || y >= popup_area.y + popup_area.height
        } else {
            true
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<HelpPopupAction> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => Some(HelpPopupAction::Close),
            KeyCode::Char('j') | KeyCode::Down => {
                self.scroll_down();
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.scroll_up();
                None
            }
            _ => None,
        }
    }
}
