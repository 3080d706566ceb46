//! Parsing and formatting of coordinate labels shown next to markers.
//!
//! These labels exist at the UI boundary only. In-memory geometry is the
//! source of truth; parsing is for user-entered values, never for reading
//! our own rendered output back.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LabelParseError {
    #[error("not a coordinate label: {0:?}")]
    BadPoint(String),
    #[error("not a dimension label: {0:?}")]
    BadDims(String),
}

static POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d+\.?\d*)\s*,\s*(\d+\.?\d*)\s*\)").unwrap()
});

static DIMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*[×x]\s*(\d+\.?\d*)").unwrap());

/// Parse a point label like `"(376.66, 69.14)"`. Integer and decimal
/// forms are both accepted.
pub fn parse_point(label: &str) -> Result<(f64, f64), LabelParseError> {
    let caps = POINT_RE
        .captures(label)
        .ok_or_else(|| LabelParseError::BadPoint(label.to_string()))?;
    Ok((number(&caps[1]), number(&caps[2])))
}

/// Parse a dimension label like `"79×18"` or `"79x18"`.
pub fn parse_dims(label: &str) -> Result<(f64, f64), LabelParseError> {
    let caps = DIMS_RE
        .captures(label)
        .ok_or_else(|| LabelParseError::BadDims(label.to_string()))?;
    Ok((number(&caps[1]), number(&caps[2])))
}

// The regexes only admit digits with an optional single dot, so this
// cannot fail on a captured group.
fn number(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

pub fn format_point(x: f64, y: f64) -> String {
    format!("({x:.2}, {y:.2})")
}

pub fn format_dims(width: f64, height: f64) -> String {
    format!("{:.0}\u{d7}{:.0}", width, height)
}
