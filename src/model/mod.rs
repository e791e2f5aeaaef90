//! # Data Model
//!
//! Source rows as they arrive from a spreadsheet reader, and the normalized
//! records the templates consume.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Blank,
}

impl CellValue {
    /// Blank cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
        }
    }

    /// The cell as display text. Whole numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// An ordered mapping of column name to cell value.
///
/// Column order is kept as read. Duplicate column names are allowed; lookups
/// return the first non-blank match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    cells: Vec<(String, CellValue)>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.push((column.into(), value.into()));
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_blank())
    }

    /// Exact column lookup.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = SourceRow::new();
        for (k, v) in iter {
            row.push(k, v);
        }
        row
    }
}

/// Which layout a render pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    Regular,
    Split,
    Nested,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::Regular,
        TemplateKind::Split,
        TemplateKind::Nested,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::Regular => "regular",
            TemplateKind::Split => "split",
            TemplateKind::Nested => "nested",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown template '{}', expected regular, split or nested", s))
    }
}

/// A typed field value after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Quantity(f64),
}

impl FieldValue {
    /// Display text, numbers in the given fixed-decimal format.
    pub fn display(&self, decimal_places: u8) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Quantity(q) => format_quantity(*q, decimal_places),
        }
    }
}

/// What a split sub-box shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBoxAssignment {
    /// The source field the content comes from.
    pub field: String,
    /// One-based part number.
    pub part: usize,
    /// Number of parts. 1 when the whole field is shown.
    pub of: usize,
    pub text: String,
}

/// One validated row, ready for a template.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Zero-based position of the source row.
    pub row_index: usize,
    pub kind: TemplateKind,
    pub fields: BTreeMap<String, FieldValue>,
    /// Split template only.
    pub sub_boxes: Vec<SubBoxAssignment>,
    /// Nested template only.
    pub children: Vec<String>,
}

impl NormalizedRecord {
    /// Text of a field, or "" when absent.
    pub fn text(&self, field: &str, decimal_places: u8) -> String {
        self.fields
            .get(field)
            .map(|v| v.display(decimal_places))
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.text("name", 0)
    }

    pub fn quantity(&self) -> f64 {
        match self.fields.get("qty") {
            Some(FieldValue::Quantity(q)) => *q,
            _ => 0.0,
        }
    }
}

/// Fixed-decimal formatting, independent of locale.
///
/// Values that round to zero print without a sign.
pub fn format_quantity(value: f64, decimal_places: u8) -> String {
    let places = decimal_places as usize;
    let formatted = format!("{:.*}", places, value);
    if formatted.starts_with('-') && formatted[1..].chars().all(|c| c == '0' || c == '.') {
        formatted[1..].to_string()
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_quantity_fixed_decimals() {
        assert_eq!(format_quantity(12.0, 0), "12");
        assert_eq!(format_quantity(12.5, 2), "12.50");
        assert_eq!(format_quantity(0.0, 0), "0");
    }

    #[test]
    fn test_format_quantity_never_negative_zero() {
        assert_eq!(format_quantity(-0.0, 0), "0");
        assert_eq!(format_quantity(-0.001, 2), "0.00");
        assert_eq!(format_quantity(-1.5, 1), "-1.5");
    }

    #[test]
    fn test_format_quantity_round_trip() {
        for places in 0..=6u8 {
            for value in [0.0, 1.0, 3.25, 1234.5678, 99999.0] {
                let text = format_quantity(value, places);
                let parsed: f64 = text.parse().unwrap();
                assert_eq!(format_quantity(parsed, places), text);
            }
        }
    }

    #[test]
    fn test_cell_text_of_whole_number() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(1.5).as_text(), "1.5");
        assert!(CellValue::Text("  ".into()).is_blank());
    }

    #[test]
    fn test_source_row_lookup_keeps_order() {
        let row = SourceRow::new().with("name", "Case").with("qty", 3.0);
        assert_eq!(row.cells()[0].0, "name");
        assert_eq!(row.get("qty"), Some(&CellValue::Number(3.0)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_template_kind_parse() {
        assert_eq!("Split".parse::<TemplateKind>(), Ok(TemplateKind::Split));
        assert!("grid".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_cell_value_untagged_json() {
        let cells: Vec<CellValue> = serde_json::from_str(r#"[1.5, "box", null]"#).unwrap();
        assert_eq!(cells[0], CellValue::Number(1.5));
        assert_eq!(cells[1], CellValue::Text("box".into()));
        assert_eq!(cells[2], CellValue::Blank);
    }
}
