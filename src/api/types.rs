//! Wire types for the template backend.
//!
//! One wart inherited from the backend and preserved on purpose: in
//! field records and the upsert form, `x1`/`y1` hold the WIDTH and
//! HEIGHT of the region. The extract-text and extract-tables bodies use
//! `x1`/`y1` as absolute right/bottom edges. Conversions in this module
//! are the only place allowed to know this.

use serde::{Deserialize, Serialize};

use crate::annotations::{
    Annotation, AnnotationId, AnnotationKind, TableDetails, TableGrid, TableSettings,
};
use crate::geometry::PdfRect;

/// `GET get-configuration-data` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigurationData {
    #[serde(default)]
    pub fields: Vec<FieldSummary>,
    #[serde(default)]
    pub tables: Vec<FieldSummary>,
    #[serde(default)]
    pub python_functions: Vec<PythonFunction>,
}

impl ConfigurationData {
    /// Flatten both lists into annotations, fields first, preserving
    /// server order within each list.
    #[must_use]
    pub fn into_annotations(self) -> Vec<Annotation> {
        let fields = self
            .fields
            .into_iter()
            .map(|s| s.into_annotation(AnnotationKind::Field));
        let tables = self
            .tables
            .into_iter()
            .map(|s| s.into_annotation(AnnotationKind::Table));
        fields.chain(tables).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSummary {
    pub id: i64,
    pub name: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    /// Width, despite the name.
    pub x1: f64,
    /// Height, despite the name.
    pub y1: f64,
}

impl FieldSummary {
    fn into_annotation(self, kind: AnnotationKind) -> Annotation {
        let rect = PdfRect::new(self.x, self.y, self.x1, self.y1);
        match kind {
            AnnotationKind::Field => Annotation::field(AnnotationId(self.id), self.name, self.page, rect),
            AnnotationKind::Table => Annotation::table(AnnotationId(self.id), self.name, self.page, rect),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PythonFunction {
    pub id: i64,
    pub name: String,
}

/// `GET fields/{id}` payload, the full record.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRecord {
    pub id: i64,
    pub name: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    /// Width, despite the name.
    pub x1: f64,
    /// Height, despite the name.
    pub y1: f64,
    #[serde(default)]
    pub is_table: bool,
    #[serde(default)]
    pub python_function: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub table_settings: Option<TableSettings>,
    #[serde(default)]
    pub table_drawn_cells: Option<TableGrid>,
    #[serde(default)]
    pub line_points: Option<Vec<[f64; 4]>>,
}

impl FieldRecord {
    #[must_use]
    pub fn into_annotation(self) -> Annotation {
        let rect = PdfRect::new(self.x, self.y, self.x1, self.y1);
        let kind = if self.is_table {
            AnnotationKind::Table
        } else {
            AnnotationKind::Field
        };
        let table = self.is_table.then(|| TableDetails {
            settings: self.table_settings.unwrap_or_default(),
            line_points: self.line_points.unwrap_or_default(),
            grid: self.table_drawn_cells,
        });
        Annotation {
            id: AnnotationId(self.id),
            name: self.name,
            page: self.page,
            rect,
            kind,
            python_function: self.python_function,
            extracted_text: self.extracted_text,
            table,
        }
    }
}

/// Field upsert, sent form-encoded to create/update.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFieldRequest {
    pub name: String,
    pub page: u32,
    pub rect: PdfRect,
    pub is_table: bool,
    pub python_function: Option<String>,
    pub table_settings: Option<TableSettings>,
    pub line_points: Vec<[f64; 4]>,
}

impl SaveFieldRequest {
    /// Form pairs in backend order. `x1`/`y1` carry width/height here.
    pub fn to_form(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        let mut form = vec![
            ("name".to_string(), self.name.clone()),
            ("page".to_string(), self.page.to_string()),
            ("x".to_string(), self.rect.x.to_string()),
            ("y".to_string(), self.rect.y.to_string()),
            ("x1".to_string(), self.rect.width.to_string()),
            ("y1".to_string(), self.rect.height.to_string()),
            (
                "is_table".to_string(),
                if self.is_table { "true" } else { "false" }.to_string(),
            ),
        ];
        if let Some(function) = &self.python_function {
            form.push(("python_function".to_string(), function.clone()));
        }
        if let Some(settings) = &self.table_settings {
            form.push((
                "table_settings".to_string(),
                serde_json::to_string(settings)?,
            ));
        }
        if !self.line_points.is_empty() {
            form.push((
                "line_points".to_string(),
                serde_json::to_string(&self.line_points)?,
            ));
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveFieldResponse {
    pub status: String,
    #[serde(default)]
    pub field_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Region payload for extract-text and extract-images. Absolute edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionRequest {
    pub x: f64,
    pub y: f64,
    pub x1: f64,
    pub y1: f64,
    pub page: u32,
}

impl RegionRequest {
    /// Build from a PDF rect, converting width/height to edges.
    #[must_use]
    pub fn from_rect(rect: PdfRect, page: u32) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            x1: rect.right(),
            y1: rect.bottom(),
            page,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractTextResponse {
    pub status: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractTablesRequest {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub settings: TableSettings,
    pub line_points: Vec<[f64; 4]>,
}

impl ExtractTablesRequest {
    #[must_use]
    pub fn new(
        rect: PdfRect,
        page: u32,
        settings: TableSettings,
        line_points: Vec<[f64; 4]>,
    ) -> Self {
        Self {
            page,
            x0: rect.x,
            y0: rect.y,
            x1: rect.right(),
            y1: rect.bottom(),
            settings,
            line_points,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractTablesResponse {
    #[serde(default)]
    pub tables: Vec<ExtractedTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTable {
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    pub row_count: u32,
    pub col_count: u32,
    #[serde(default)]
    pub has_header: bool,
    /// `[x0, y0, x1, y1]` of the detected table, PDF space.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub rows_positions: Option<Vec<f64>>,
    #[serde(default)]
    pub cols_positions: Option<Vec<f64>>,
}

impl ExtractedTable {
    #[must_use]
    pub fn bbox_rect(&self) -> PdfRect {
        PdfRect::new(
            self.bbox[0],
            self.bbox[1],
            self.bbox[2] - self.bbox[0],
            self.bbox[3] - self.bbox[1],
        )
    }

    #[must_use]
    pub fn to_grid(&self) -> TableGrid {
        TableGrid {
            row_count: self.row_count,
            col_count: self.col_count,
            has_header: self.has_header,
            rows_positions: self.rows_positions.clone(),
            cols_positions: self.cols_positions.clone(),
            cell_boxes: None,
            row_boxes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionsRequest {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TemplateImage {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveImageRequest {
    pub name: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub x1: f64,
    pub y1: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_record_width_height_quirk() {
        let record: FieldRecord = serde_json::from_str(
            r#"{"id": 7, "name": "total", "page": 2, "x": 10.0, "y": 20.0,
                "x1": 79.0, "y1": 18.0, "is_table": false}"#,
        )
        .unwrap();
        let ann = record.into_annotation();
        assert_eq!(ann.rect, PdfRect::new(10.0, 20.0, 79.0, 18.0));
        assert_eq!(ann.kind, AnnotationKind::Field);
        assert!(ann.table.is_none());
    }

    #[test]
    fn table_record_collects_table_details() {
        let record: FieldRecord = serde_json::from_str(
            r#"{"id": 3, "name": "items", "page": 1, "x": 0.0, "y": 0.0,
                "x1": 612.0, "y1": 792.0, "is_table": true,
                "line_points": [[50.0, 0.0, 50.0, 792.0]],
                "table_drawn_cells": {"row_count": 2, "col_count": 3}}"#,
        )
        .unwrap();
        let ann = record.into_annotation();
        let table = ann.table.unwrap();
        assert_eq!(table.line_points, vec![[50.0, 0.0, 50.0, 792.0]]);
        assert_eq!(table.grid.as_ref().unwrap().col_count, 3);
        assert_eq!(table.settings, TableSettings::default());
    }

    #[test]
    fn region_request_sends_absolute_edges() {
        let region = RegionRequest::from_rect(PdfRect::new(25.0, 25.0, 50.0, 35.0), 3);
        assert_eq!(region.x, 25.0);
        assert_eq!(region.y, 25.0);
        assert_eq!(region.x1, 75.0);
        assert_eq!(region.y1, 60.0);
        assert_eq!(region.page, 3);
    }

    #[test]
    fn save_form_keeps_width_height_in_x1_y1() {
        let req = SaveFieldRequest {
            name: "total".to_string(),
            page: 2,
            rect: PdfRect::new(10.0, 20.0, 79.0, 18.0),
            is_table: false,
            python_function: None,
            table_settings: None,
            line_points: vec![],
        };
        let form = req.to_form().unwrap();
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("x1"), "79");
        assert_eq!(get("y1"), "18");
        assert_eq!(get("is_table"), "false");
        assert!(!form.iter().any(|(k, _)| k == "line_points"));
    }

    #[test]
    fn save_form_serializes_table_payloads() {
        let req = SaveFieldRequest {
            name: "items".to_string(),
            page: 1,
            rect: PdfRect::new(0.0, 0.0, 612.0, 792.0),
            is_table: true,
            python_function: Some("parse_items".to_string()),
            table_settings: Some(TableSettings::default()),
            line_points: vec![[50.0, 0.0, 50.0, 792.0]],
        };
        let form = req.to_form().unwrap();
        let settings = form
            .iter()
            .find(|(k, _)| k == "table_settings")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(settings.contains("\"lines_strict\""));
        let lines = form
            .iter()
            .find(|(k, _)| k == "line_points")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(lines, "[[50.0,0.0,50.0,792.0]]");
    }

    #[test]
    fn extracted_table_bbox_to_rect_and_grid() {
        let table: ExtractedTable = serde_json::from_str(
            r#"{"row_count": 2, "col_count": 2, "has_header": true,
                "bbox": [100.0, 200.0, 300.0, 300.0],
                "rows_positions": [250.0]}"#,
        )
        .unwrap();
        assert_eq!(table.bbox_rect(), PdfRect::new(100.0, 200.0, 200.0, 100.0));
        let grid = table.to_grid();
        assert!(grid.has_header);
        assert_eq!(grid.rows_positions, Some(vec![250.0]));
    }

    #[test]
    fn configuration_data_flattens_fields_then_tables() {
        let data: ConfigurationData = serde_json::from_str(
            r#"{"fields": [{"id": 1, "name": "a", "page": 1, "x": 0, "y": 0, "x1": 10, "y1": 10}],
                "tables": [{"id": 2, "name": "b", "page": 1, "x": 0, "y": 0, "x1": 10, "y1": 10}],
                "python_functions": [{"id": 9, "name": "clean"}]}"#,
        )
        .unwrap();
        assert_eq!(data.python_functions[0].name, "clean");
        let anns = data.into_annotations();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].kind, AnnotationKind::Field);
        assert_eq!(anns[1].kind, AnnotationKind::Table);
    }
}
