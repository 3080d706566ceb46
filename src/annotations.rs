//! Annotation model and the in-memory store.
//!
//! The server owns annotations; this store is a read cache plus
//! optimistic local edits. It is only mutated after a server round trip
//! confirms success, so an interrupted save never leaves a phantom
//! annotation behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::PdfRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(pub i64);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationKind {
    #[default]
    Field,
    Table,
}

/// Extraction settings sent verbatim in the extract-tables request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    #[serde(default = "default_strategy")]
    pub vertical_strategy: String,
    #[serde(default = "default_strategy")]
    pub horizontal_strategy: String,
    #[serde(default = "default_tolerance")]
    pub snap_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub join_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub edge_min_length: f64,
    #[serde(default = "default_min_words_vertical")]
    pub min_words_vertical: u32,
    #[serde(default = "default_min_words_horizontal")]
    pub min_words_horizontal: u32,
    #[serde(default = "default_tolerance")]
    pub intersection_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub text_tolerance: f64,
}

fn default_strategy() -> String {
    "lines_strict".to_string()
}

fn default_tolerance() -> f64 {
    3.0
}

fn default_min_words_vertical() -> u32 {
    3
}

fn default_min_words_horizontal() -> u32 {
    1
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            vertical_strategy: default_strategy(),
            horizontal_strategy: default_strategy(),
            snap_tolerance: default_tolerance(),
            join_tolerance: default_tolerance(),
            edge_min_length: default_tolerance(),
            min_words_vertical: default_min_words_vertical(),
            min_words_horizontal: default_min_words_horizontal(),
            intersection_tolerance: default_tolerance(),
            text_tolerance: default_tolerance(),
        }
    }
}

/// Row/column structure of an extracted table, PDF-space positions.
/// Present only after extraction succeeded or when the server record
/// carried drawn cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableGrid {
    pub row_count: u32,
    pub col_count: u32,
    #[serde(default)]
    pub has_header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_positions: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols_positions: Option<Vec<f64>>,
    /// Per-cell bounding boxes `[x0, y0, x1, y1]`, row-major.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_boxes: Option<Vec<[f64; 4]>>,
    /// Per-row bounding boxes `[x0, y0, x1, y1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_boxes: Option<Vec<[f64; 4]>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDetails {
    pub settings: TableSettings,
    /// Guide lines drawn by the user, `[x1, y1, x2, y2]` in PDF points.
    pub line_points: Vec<[f64; 4]>,
    pub grid: Option<TableGrid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub name: String,
    /// 1-based page number.
    pub page: u32,
    pub rect: PdfRect,
    pub kind: AnnotationKind,
    pub python_function: Option<String>,
    pub extracted_text: Option<String>,
    pub table: Option<TableDetails>,
}

impl Annotation {
    pub fn field(id: AnnotationId, name: impl Into<String>, page: u32, rect: PdfRect) -> Self {
        Self {
            id,
            name: name.into(),
            page,
            rect,
            kind: AnnotationKind::Field,
            python_function: None,
            extracted_text: None,
            table: None,
        }
    }

    pub fn table(id: AnnotationId, name: impl Into<String>, page: u32, rect: PdfRect) -> Self {
        Self {
            id,
            name: name.into(),
            page,
            rect,
            kind: AnnotationKind::Table,
            python_function: None,
            extracted_text: None,
            table: Some(TableDetails::default()),
        }
    }

    #[must_use]
    pub fn is_table(&self) -> bool {
        self.kind == AnnotationKind::Table
    }
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    items: HashMap<AnnotationId, Annotation>,
    order: Vec<AnnotationId>,
    active: Option<AnnotationId>,
    last_synced: Option<DateTime<Utc>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with a fresh server fetch, preserving the
    /// server's ordering.
    pub fn replace_all(&mut self, annotations: Vec<Annotation>) {
        self.items.clear();
        self.order.clear();
        self.active = None;
        for a in annotations {
            self.order.push(a.id);
            self.items.insert(a.id, a);
        }
        self.last_synced = Some(Utc::now());
    }

    /// Insert or update one annotation after the server confirmed it.
    pub fn upsert(&mut self, annotation: Annotation) {
        if !self.items.contains_key(&annotation.id) {
            self.order.push(annotation.id);
        }
        self.items.insert(annotation.id, annotation);
    }

    /// Drop an annotation after the server confirmed the delete.
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        self.order.retain(|&other| other != id);
        if self.active == Some(id) {
            self.active = None;
        }
        self.items.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.items.get_mut(&id)
    }

    /// All annotations in server order.
    pub fn list(&self) -> impl Iterator<Item = &Annotation> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Annotations on one page, in server order.
    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.list().filter(move |a| a.page == page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Mark one annotation active. Mutual exclusion is structural: there
    /// is a single slot.
    pub fn set_active(&mut self, id: Option<AnnotationId>) {
        self.active = id.filter(|id| self.items.contains_key(id));
    }

    #[must_use]
    pub fn active(&self) -> Option<AnnotationId> {
        self.active
    }

    #[must_use]
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }
}
