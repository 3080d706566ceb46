//! Table extraction settings popup. Adjusts the pdfplumber-style
//! strategy knobs for one table annotation and triggers extraction.
//! Settings persist with the next field save.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::annotations::{TableGrid, TableSettings};
use crate::overlay::APPROXIMATE_GRID_NOTE;
use crate::theme::current_theme;
use crate::widget::centered_rect;

pub enum TableFormAction {
    Extract,
    SaveSettings,
    Close,
}

const STRATEGIES: [&str; 3] = ["lines", "lines_strict", "text"];

const ROW_COUNT: usize = 9;
const ROW_V_STRATEGY: usize = 0;
const ROW_H_STRATEGY: usize = 1;
const ROW_SNAP: usize = 2;
const ROW_JOIN: usize = 3;
const ROW_EDGE_MIN: usize = 4;
const ROW_INTERSECTION: usize = 5;
const ROW_TEXT: usize = 6;
const ROW_MIN_WORDS_V: usize = 7;
const ROW_MIN_WORDS_H: usize = 8;

pub struct TableSettingsForm {
    pub field_id: i64,
    pub settings: TableSettings,
    pub extracting: bool,
    selected: usize,
    last_area: Option<Rect>,
}

impl TableSettingsForm {
    pub fn new(field_id: i64, settings: TableSettings) -> Self {
        TableSettingsForm {
            field_id,
            settings,
            extracting: false,
            selected: 0,
            last_area: None,
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

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<TableFormAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('s') {
                return Some(TableFormAction::SaveSettings);
            }
            return None;
        }
        match key.code {
            KeyCode::Esc => Some(TableFormAction::Close),
            KeyCode::Enter | KeyCode::Char('e') => {
                if self.extracting {
                    None
                } else {
                    Some(TableFormAction::Extract)
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.selected = (self.selected + 1) % ROW_COUNT;
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = (self.selected + ROW_COUNT - 1) % ROW_COUNT;
                None
            }
            KeyCode::Char('h') | KeyCode::Left => {
                self.adjust(false);
                None
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.adjust(true);
                None
            }
            _ => None,
        }
    }

    fn adjust(&mut self, up: bool) {
        match self.selected {
            ROW_V_STRATEGY => cycle_strategy(&mut self.settings.vertical_strategy, up),
            ROW_H_STRATEGY => cycle_strategy(&mut self.settings.horizontal_strategy, up),
            ROW_SNAP => step_tolerance(&mut self.settings.snap_tolerance, up),
            ROW_JOIN => step_tolerance(&mut self.settings.join_tolerance, up),
            ROW_EDGE_MIN => step_tolerance(&mut self.settings.edge_min_length, up),
            ROW_INTERSECTION => step_tolerance(&mut self.settings.intersection_tolerance, up),
            ROW_TEXT => step_tolerance(&mut self.settings.text_tolerance, up),
            ROW_MIN_WORDS_V => step_words(&mut self.settings.min_words_vertical, up),
            ROW_MIN_WORDS_H => step_words(&mut self.settings.min_words_horizontal, up),
            _ => {}
        }
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect, grid: Option<&TableGrid>) {
        let palette = current_theme();
        let popup_area = centered_rect(50, 64, area);
        self.last_area = Some(popup_area);
        f.render_widget(Clear, popup_area);

        let value_style = Style::default().fg(palette.base_05);
        let focus_style = Style::default()
            .fg(palette.base_06)
            .bg(palette.base_02)
            .add_modifier(Modifier::BOLD);
        let row = |idx: usize, label: &str, value: String| {
            let style = if self.selected == idx { focus_style } else { value_style };
            Line::from(vec![
                Span::styled(format!("  {label:<22}"), Style::default().fg(palette.base_04)),
                Span::styled(value, style),
            ])
        };

        let s = &self.settings;
        let mut lines = vec![
            row(ROW_V_STRATEGY, "vertical strategy", s.vertical_strategy.clone()),
            row(ROW_H_STRATEGY, "horizontal strategy", s.horizontal_strategy.clone()),
            row(ROW_SNAP, "snap tolerance", format!("{:.1}", s.snap_tolerance)),
            row(ROW_JOIN, "join tolerance", format!("{:.1}", s.join_tolerance)),
            row(ROW_EDGE_MIN, "edge min length", format!("{:.1}", s.edge_min_length)),
            row(
                ROW_INTERSECTION,
                "intersection tolerance",
                format!("{:.1}", s.intersection_tolerance),
            ),
            row(ROW_TEXT, "text tolerance", format!("{:.1}", s.text_tolerance)),
            row(ROW_MIN_WORDS_V, "min words vertical", s.min_words_vertical.to_string()),
            row(ROW_MIN_WORDS_H, "min words horizontal", s.min_words_horizontal.to_string()),
        ];

        lines.push(Line::default());
        match grid {
            Some(g) => {
                lines.push(Line::from(Span::styled(
                    format!("  grid: {} rows x {} cols", g.row_count, g.col_count),
                    Style::default().fg(palette.base_0b),
                )));
                if g.has_header {
                    lines.push(Line::from(Span::styled(
                        "  first row is a header",
                        Style::default().fg(palette.base_0b),
                    )));
                }
                if g.rows_positions.is_none()
                    && g.cols_positions.is_none()
                    && g.cell_boxes.is_none()
                    && g.row_boxes.is_none()
                {
                    lines.push(Line::from(Span::styled(
                        format!("  {APPROXIMATE_GRID_NOTE}"),
                        Style::default().fg(palette.base_0a),
                    )));
                }
            }
            None => lines.push(Line::from(Span::styled(
                "  no grid extracted yet",
                Style::default().fg(palette.base_03),
            ))),
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "  enter extract · ^s save settings · esc close",
            Style::default().fg(palette.base_03),
        )));

        let title = if self.extracting {
            " table settings (extracting…) "
        } else {
            " table settings "
        };
        let body = Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.base_0c))
                .style(Style::default().bg(palette.base_00)),
        );
        f.render_widget(body, popup_area);
    }
}

fn cycle_strategy(value: &mut String, up: bool) {
    let here = STRATEGIES.iter().position(|s| s == value).unwrap_or(1);
    let next = if up {
        (here + 1) % STRATEGIES.len()
    } else {
        (here + STRATEGIES.len() - 1) % STRATEGIES.len()
    };
    *value = STRATEGIES[next].to_string();
}

fn step_tolerance(value: &mut f64, up: bool) {
    if up {
        *value += 0.5;
    } else {
        *value = (*value - 0.5).max(0.0);
    }
}

fn step_words(value: &mut u32, up: bool) {
    if up {
        *value += 1;
    } else {
        *value = value.saturating_sub(1).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_cycle_both_ways() {
        let mut v = "lines_strict".to_string();
        cycle_strategy(&mut v, true);
        assert_eq!(v, "text");
        cycle_strategy(&mut v, true);
        assert_eq!(v, "lines");
        cycle_strategy(&mut v, false);
        assert_eq!(v, "text");
    }

    #[test]
    fn tolerances_never_go_negative() {
        let mut t = 0.5;
        step_tolerance(&mut t, false);
        step_tolerance(&mut t, false);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn word_minimums_stay_at_least_one() {
        let mut w = 1;
        step_words(&mut w, false);
        assert_eq!(w, 1);
        step_words(&mut w, true);
        assert_eq!(w, 2);
    }

    #[test]
    fn adjusting_selected_row_touches_matching_setting() {
        let mut form = TableSettingsForm::new(7, TableSettings::default());
        form.selected = ROW_SNAP;
        form.adjust(true);
        assert_eq!(form.settings.snap_tolerance, 3.5);
        form.selected = ROW_V_STRATEGY;
        form.adjust(true);
        assert_eq!(form.settings.vertical_strategy, "text");
    }
}
