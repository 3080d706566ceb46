//! Field editor popup. Creates new annotations from a finished drag and
//! edits existing ones. All values are edited as text and parsed on
//! save; nothing is persisted until the backend confirms.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::annotations::Annotation;
use crate::api::{PythonFunction, SaveFieldRequest};
use crate::geometry::PdfRect;
use crate::labels;
use crate::theme::current_theme;
use crate::widget::centered_rect;

pub enum FormAction {
    Save,
    Cancel,
    ExtractText,
    ExtractImages,
    AutoFill,
    OpenTableSettings,
}

const FIELD_COUNT: usize = 8;
const FOCUS_NAME: usize = 0;
const FOCUS_PAGE: usize = 1;
const FOCUS_X: usize = 2;
const FOCUS_Y: usize = 3;
const FOCUS_WIDTH: usize = 4;
const FOCUS_HEIGHT: usize = 5;
const FOCUS_FUNCTION: usize = 6;
const FOCUS_IS_TABLE: usize = 7;

pub struct EditForm {
    pub field_id: Option<i64>,
    name: String,
    page: String,
    x: String,
    y: String,
    width: String,
    height: String,
    pub is_table: bool,
    function_idx: Option<usize>,
    pub extracted_text: Option<String>,
    pub saving: bool,
    focus: usize,
    error: Option<String>,
    last_area: Option<Rect>,
}

impl EditForm {
    pub fn for_new(page: u32, rect: PdfRect) -> Self {
        EditForm {
            field_id: None,
            name: String::new(),
            page: page.to_string(),
            x: format!("{:.2}", rect.x),
            y: format!("{:.2}", rect.y),
            width: format!("{:.2}", rect.width),
            height: format!("{:.2}", rect.height),
            is_table: false,
            function_idx: None,
            extracted_text: None,
            saving: false,
            focus: FOCUS_NAME,
            error: None,
            last_area: None,
        }
    }

    pub fn for_annotation(ann: &Annotation, functions: &[PythonFunction]) -> Self {
        let function_idx = ann
            .python_function
            .as_ref()
            .and_then(|name| functions.iter().position(|f| &f.name == name));
        EditForm {
            field_id: Some(ann.id.0),
            name: ann.name.clone(),
            page: ann.page.to_string(),
            x: format!("{:.2}", ann.rect.x),
            y: format!("{:.2}", ann.rect.y),
            width: format!("{:.2}", ann.rect.width),
            height: format!("{:.2}", ann.rect.height),
            is_table: ann.is_table(),
            function_idx,
            extracted_text: ann.extracted_text.clone(),
            saving: false,
            focus: FOCUS_NAME,
            error: None,
            last_area: None,
        }
    }

    pub fn set_rect(&mut self, rect: PdfRect) {
        self.x = format!("{:.2}", rect.x);
        self.y = format!("{:.2}", rect.y);
        self.width = format!("{:.2}", rect.width);
        self.height = format!("{:.2}", rect.height);
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.trim()
    }

    /// A point label pasted into `x` (like `"(376.66, 69.14)"`) fills
    /// both coordinates; a dims label in `width` (like `"79x18"`) fills
    /// both extents. Plain numbers work as before.
    pub fn rect(&self) -> Result<PdfRect, String> {
        let (x, y) = match labels::parse_point(&self.x) {
            Ok(pair) => pair,
            Err(_) => (parse_coord("x", &self.x)?, parse_coord("y", &self.y)?),
        };
        let (width, height) = match labels::parse_dims(&self.width) {
            Ok(pair) => pair,
            Err(_) => (
                parse_coord("width", &self.width)?,
                parse_coord("height", &self.height)?,
            ),
        };
        Ok(PdfRect {
            x,
            y,
            width,
            height,
        })
    }

    pub fn page_number(&self) -> Result<u32, String> {
        self.page
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("page is not a number: {:?}", self.page))
    }

    /// Validates the inputs and produces the save payload. Table
    /// settings and drawn lines are attached by the caller, which owns
    /// them.
    pub fn build_request(&self, functions: &[PythonFunction]) -> Result<SaveFieldRequest, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(SaveFieldRequest {
            name: name.to_string(),
            page: self.page_number()?,
            rect: self.rect()?,
            is_table: self.is_table,
            python_function: self.function_idx.and_then(|i| functions.get(i)).map(|f| f.name.clone()),
            table_settings: None,
            line_points: Vec::new(),
        })
    }

    pub fn is_outside_popup_area(&self, x: u16, y: u16) -> bool {
        match self.last_area {
            Some(area) => {
                x < area.x || x >= area.x + area.width || y < area.y || y >= area.y + area.height
            }
            None => true,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, functions_len: usize) -> Option<FormAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('e') => Some(FormAction::ExtractText),
                KeyCode::Char('p') => Some(FormAction::ExtractImages),
                KeyCode::Char('f') => Some(FormAction::AutoFill),
                KeyCode::Char('t') => Some(FormAction::OpenTableSettings),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Esc => Some(FormAction::Cancel),
            KeyCode::Enter => {
                if self.saving {
                    None
                } else {
                    Some(FormAction::Save)
                }
            }
            KeyCode::Tab | KeyCode::Down => {
                self.focus = (self.focus + 1) % FIELD_COUNT;
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = (self.focus + FIELD_COUNT - 1) % FIELD_COUNT;
                None
            }
            KeyCode::Left => {
                self.cycle(functions_len, false);
                None
            }
            KeyCode::Right => {
                self.cycle(functions_len, true);
                None
            }
            KeyCode::Char(' ') if self.focus == FOCUS_IS_TABLE => {
                self.is_table = !self.is_table;
                None
            }
            KeyCode::Char(c) => {
                self.insert_char(c);
                None
            }
            KeyCode::Backspace => {
                if let Some(buf) = self.focused_text_mut() {
                    buf.pop();
                }
                None
            }
            _ => None,
        }
    }

    fn cycle(&mut self, functions_len: usize, forward: bool) {
        match self.focus {
            FOCUS_IS_TABLE => self.is_table = !self.is_table,
            FOCUS_FUNCTION => {
                // None -> 0 -> .. -> len-1 -> None
                self.function_idx = match (self.function_idx, forward) {
                    (None, true) if functions_len > 0 => Some(0),
                    (None, false) if functions_len > 0 => Some(functions_len - 1),
                    (Some(i), true) if i + 1 < functions_len => Some(i + 1),
                    (Some(i), false) if i > 0 => Some(i - 1),
                    _ => None,
                };
            }
            _ => {}
        }
    }

    fn insert_char(&mut self, c: char) {
        let numeric = matches!(
            self.focus,
            FOCUS_PAGE | FOCUS_X | FOCUS_Y | FOCUS_WIDTH | FOCUS_HEIGHT
        );
        // Label punctuation stays typeable so pasted "(x, y)" and "WxH"
        // labels land intact.
        if numeric && !(c.is_ascii_digit() || ".-(), x×".contains(c)) {
            return;
        }
        if let Some(buf) = self.focused_text_mut() {
            buf.push(c);
        }
    }

    fn focused_text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            FOCUS_NAME => Some(&mut self.name),
            FOCUS_PAGE => Some(&mut self.page),
            FOCUS_X => Some(&mut self.x),
            FOCUS_Y => Some(&mut self.y),
            FOCUS_WIDTH => Some(&mut self.width),
            FOCUS_HEIGHT => Some(&mut self.height),
            _ => None,
        }
    }

    pub fn render(&mut self, f: &mut Frame, area: Rect, functions: &[PythonFunction]) {
        let palette = current_theme();
        let popup_area = centered_rect(54, 72, area);
        self.last_area = Some(popup_area);
        f.render_widget(Clear, popup_area);

        let title = match (self.field_id, self.saving) {
            (_, true) => " field (saving…) ",
            (Some(_), _) => " edit field ",
            (None, _) => " new field ",
        };
        let value_style = Style::default().fg(palette.base_05);
        let focus_style = Style::default()
            .fg(palette.base_06)
            .bg(palette.base_02)
            .add_modifier(Modifier::BOLD);
        let row = |idx: usize, label: &str, value: String| {
            let style = if self.focus == idx { focus_style } else { value_style };
            Line::from(vec![
                Span::styled(format!("  {label:<10}"), Style::default().fg(palette.base_04)),
                Span::styled(value, style),
            ])
        };

        let function_name = self
            .function_idx
            .and_then(|i| functions.get(i))
            .map(|func| func.name.clone())
            .unwrap_or_else(|| "(none)".to_string());
        let mut lines = vec![
            row(FOCUS_NAME, "name", self.name.clone()),
            row(FOCUS_PAGE, "page", self.page.clone()),
            row(FOCUS_X, "x", self.x.clone()),
            row(FOCUS_Y, "y", self.y.clone()),
            row(FOCUS_WIDTH, "width", self.width.clone()),
            row(FOCUS_HEIGHT, "height", self.height.clone()),
            row(FOCUS_FUNCTION, "function", function_name),
            row(
                FOCUS_IS_TABLE,
                "table",
                if self.is_table { "[x]" } else { "[ ]" }.to_string(),
            ),
        ];

        if let Some(text) = &self.extracted_text {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "  extracted text:",
                Style::default().fg(palette.base_04),
            )));
            for text_line in text.lines().take(6) {
                lines.push(Line::from(Span::styled(
                    format!("  {text_line}"),
                    Style::default().fg(palette.base_0b),
                )));
            }
        }
        if let Some(err) = &self.error {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                format!("  {err}"),
                Style::default().fg(palette.base_08),
            )));
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "  enter save · esc close · ^e text · ^p images · ^f fill page · ^t table",
            Style::default().fg(palette.base_03),
        )));

        let body = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.base_0c))
                    .style(Style::default().bg(palette.base_00)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(body, popup_area);
    }
}

fn parse_coord(label: &str, value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{label} is not a number: {value:?}"))?;
    if !parsed.is_finite() {
        return Err(format!("{label} is not finite"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::AnnotationId;

    fn functions() -> Vec<PythonFunction> {
        vec![
            PythonFunction {
                id: 1,
                name: "parse_date".to_string(),
            },
            PythonFunction {
                id: 2,
                name: "strip_currency".to_string(),
            },
        ]
    }

    #[test]
    fn new_form_prefills_drag_rect() {
        let form = EditForm::for_new(3, PdfRect::new(25.0, 30.0, 100.5, 40.25));
        assert_eq!(form.page_number().unwrap(), 3);
        let rect = form.rect().unwrap();
        assert!((rect.x - 25.0).abs() < 1e-9);
        assert!((rect.height - 40.25).abs() < 1e-9);
    }

    #[test]
    fn build_request_rejects_empty_name() {
        let form = EditForm::for_new(1, PdfRect::new(0.0, 0.0, 10.0, 10.0));
        let err = form.build_request(&functions()).unwrap_err();
        assert!(err.contains("name"));
    }

    #[test]
    fn function_cycles_through_none() {
        let mut form = EditForm::for_new(1, PdfRect::new(0.0, 0.0, 10.0, 10.0));
        form.focus = FOCUS_FUNCTION;
        form.cycle(2, true);
        assert_eq!(form.function_idx, Some(0));
        form.cycle(2, true);
        assert_eq!(form.function_idx, Some(1));
        form.cycle(2, true);
        assert_eq!(form.function_idx, None);
        form.cycle(2, false);
        assert_eq!(form.function_idx, Some(1));
    }

    #[test]
    fn numeric_fields_reject_letters() {
        let mut form = EditForm::for_new(1, PdfRect::new(0.0, 0.0, 10.0, 10.0));
        form.focus = FOCUS_X;
        form.insert_char('a');
        form.insert_char('7');
        assert_eq!(form.x, "0.007");
        form.focus = FOCUS_NAME;
        form.insert_char('a');
        assert_eq!(form.name, "a");
    }

    #[test]
    fn pasted_point_label_fills_both_coordinates() {
        let mut form = EditForm::for_new(1, PdfRect::new(0.0, 0.0, 10.0, 10.0));
        form.focus = FOCUS_X;
        form.x.clear();
        for c in "(376.66, 69.14)".chars() {
            form.insert_char(c);
        }
        let rect = form.rect().unwrap();
        assert!((rect.x - 376.66).abs() < 1e-9);
        assert!((rect.y - 69.14).abs() < 1e-9);
        assert!((rect.width - 10.0).abs() < 1e-9);
    }

    #[test]
    fn pasted_dims_label_fills_both_extents() {
        let mut form = EditForm::for_new(1, PdfRect::new(5.0, 6.0, 0.0, 0.0));
        form.focus = FOCUS_WIDTH;
        form.width.clear();
        for c in "79x18".chars() {
            form.insert_char(c);
        }
        let rect = form.rect().unwrap();
        assert!((rect.width - 79.0).abs() < 1e-9);
        assert!((rect.height - 18.0).abs() < 1e-9);
        assert!((rect.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn editing_existing_annotation_matches_its_function() {
        let mut ann = Annotation::field(
            AnnotationId(9),
            "total".to_string(),
            2,
            PdfRect::new(1.0, 2.0, 3.0, 4.0),
        );
        ann.python_function = Some("strip_currency".to_string());
        let form = EditForm::for_annotation(&ann, &functions());
        assert_eq!(form.field_id, Some(9));
        assert_eq!(form.function_idx, Some(1));
        let req = form.build_request(&functions()).unwrap();
        assert_eq!(req.python_function.as_deref(), Some("strip_currency"));
        assert!(!req.is_table);
    }
}
