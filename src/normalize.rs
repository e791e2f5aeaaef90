//! # Row Normalization
//!
//! Turns loosely typed spreadsheet rows into records a template can lay out
//! without further checks. Column names are matched through an alias table
//! so the same code reads English headers and the Chinese headers used on
//! production order sheets.

use std::collections::BTreeMap;

use crate::config::TemplateConfig;
use crate::error::LabelError;
use crate::model::{
    CellValue, FieldValue, NormalizedRecord, SourceRow, SubBoxAssignment, TemplateKind,
};

/// Upper bound on nested children per record.
const MAX_CHILDREN: f64 = 10_000.0;

/// What to do when a single record is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the whole pass at the first bad record.
    #[default]
    Abort,
    /// Leave the record out and keep going. The error is reported back.
    SkipRecord,
}

/// A record left out under [`ErrorPolicy::SkipRecord`].
#[derive(Debug)]
pub struct SkippedRecord {
    pub row: usize,
    pub error: LabelError,
}

/// Canonical field name and the column headers that map to it.
const ALIASES: &[(&str, &[&str])] = &[
    ("name", &["name", "title", "标签名称", "主题"]),
    ("qty", &["qty", "quantity", "count", "总张数", "数量"]),
    ("serial", &["serial", "开始号"]),
    ("remark", &["remark", "客户名称编码", "客户编码"]),
    ("description", &["description", "desc", "中文名称"]),
    ("code", &["code"]),
    ("children", &["children"]),
];

const OPTIONAL_TEXT: [&str; 3] = ["description", "serial", "remark"];

fn aliases_for(field: &str) -> Option<&'static [&'static str]> {
    ALIASES
        .iter()
        .find(|(canonical, _)| canonical.eq_ignore_ascii_case(field))
        .map(|(_, names)| *names)
}

fn header_matches(column: &str, names: &[&str]) -> bool {
    let column = column.trim().to_lowercase();
    names.iter().any(|n| n.to_lowercase() == column)
}

/// Converts [`SourceRow`]s into [`NormalizedRecord`]s for one template.
pub struct Normalizer<'a> {
    config: &'a TemplateConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a TemplateConfig) -> Self {
        Self { config }
    }

    /// Find a field by canonical name or alias. Blank cells are skipped in
    /// favour of a later non-blank column with the same meaning.
    fn lookup<'r>(&self, row: &'r SourceRow, field: &str) -> Option<&'r CellValue> {
        let fallback = [field];
        let names: &[&str] = match aliases_for(field) {
            Some(names) => names,
            None => &fallback,
        };
        let mut found = None;
        for (column, value) in row.cells() {
            if header_matches(column, names) {
                if !value.is_blank() {
                    return Some(value);
                }
                if found.is_none() {
                    found = Some(value);
                }
            }
        }
        found
    }

    fn required_text(&self, row: &SourceRow, field: &str, index: usize) -> Result<String, LabelError> {
        match self.lookup(row, field) {
            Some(value) if !value.is_blank() => Ok(value.as_text()),
            _ => Err(LabelError::validation(field, index, "is required but missing or blank")),
        }
    }

    fn optional_text(&self, row: &SourceRow, field: &str) -> String {
        self.lookup(row, field).map(CellValue::as_text).unwrap_or_default()
    }

    fn quantity(&self, row: &SourceRow, index: usize) -> Result<f64, LabelError> {
        let value = match self.lookup(row, "qty") {
            Some(value) if !value.is_blank() => value,
            _ => return Err(LabelError::validation("qty", index, "is required but missing or blank")),
        };
        let parsed = match value {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            CellValue::Blank => None,
        };
        match parsed {
            Some(q) if q.is_finite() => Ok(q),
            _ => Err(LabelError::validation(
                "qty",
                index,
                format!("is not a number: '{}'", value.as_text()),
            )),
        }
    }

    /// Normalize one row. `row_index` is its zero-based position in the input.
    pub fn normalize(&self, row: &SourceRow, row_index: usize) -> Result<NormalizedRecord, LabelError> {
        let kind = self.config.kind();
        let mut fields = BTreeMap::new();

        let name = self.required_text(row, "name", row_index)?;
        fields.insert("name".to_string(), FieldValue::Text(name));
        let qty = self.quantity(row, row_index)?;
        fields.insert("qty".to_string(), FieldValue::Quantity(qty));
        for field in OPTIONAL_TEXT {
            fields.insert(field.to_string(), FieldValue::Text(self.optional_text(row, field)));
        }

        let mut sub_boxes = Vec::new();
        let mut children = Vec::new();

        match kind {
            TemplateKind::Regular => {}
            TemplateKind::Split => {
                sub_boxes = self.split_assignments(row, row_index, &mut fields)?;
            }
            TemplateKind::Nested => {
                children = self.children(row, row_index, qty)?;
            }
        }

        Ok(NormalizedRecord {
            row_index,
            kind,
            fields,
            sub_boxes,
            children,
        })
    }

    fn split_assignments(
        &self,
        row: &SourceRow,
        row_index: usize,
        fields: &mut BTreeMap<String, FieldValue>,
    ) -> Result<Vec<SubBoxAssignment>, LabelError> {
        let options = self.config.options();
        let count = self.config.split_count();

        let mut texts = Vec::with_capacity(options.split_fields.len());
        for field in &options.split_fields {
            let field = field.trim();
            let text = self.required_text(row, field, row_index)?;
            fields.insert(field.to_string(), FieldValue::Text(text.clone()));
            texts.push((field.to_string(), text));
        }

        if let [(field, text)] = texts.as_slice() {
            Ok(split_chars(text, count)
                .into_iter()
                .enumerate()
                .map(|(i, part)| SubBoxAssignment {
                    field: field.clone(),
                    part: i + 1,
                    of: count,
                    text: part,
                })
                .collect())
        } else {
            Ok(texts
                .into_iter()
                .map(|(field, text)| SubBoxAssignment {
                    field,
                    part: 1,
                    of: 1,
                    text,
                })
                .collect())
        }
    }

    fn children(&self, row: &SourceRow, row_index: usize, qty: f64) -> Result<Vec<String>, LabelError> {
        if qty < 0.0 || qty.fract() != 0.0 {
            return Err(LabelError::validation(
                "qty",
                row_index,
                format!("must be a whole, non-negative child count, got {}", qty),
            ));
        }
        if qty > MAX_CHILDREN {
            return Err(LabelError::validation(
                "qty",
                row_index,
                format!("child count {} exceeds the limit of {}", qty, MAX_CHILDREN),
            ));
        }
        let count = qty as usize;

        let listed = self.optional_text(row, "children");
        if !listed.is_empty() {
            let list: Vec<String> = listed
                .split([';', ',', '|', '\n'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if list.len() != count {
                return Err(LabelError::validation(
                    "children",
                    row_index,
                    format!("lists {} children but qty is {}", list.len(), count),
                ));
            }
            return Ok(list);
        }

        let serial = self.optional_text(row, "serial");
        if serial.is_empty() {
            Ok((1..=count).map(|i| format!("{}/{}", i, count)).collect())
        } else {
            child_serials(&serial, count)
                .map_err(|reason| LabelError::validation("serial", row_index, reason))
        }
    }

    /// Normalize every row under `policy`.
    ///
    /// Returns the surviving records in input order, plus the skipped ones.
    pub fn normalize_all(
        &self,
        rows: &[SourceRow],
        policy: ErrorPolicy,
    ) -> Result<(Vec<NormalizedRecord>, Vec<SkippedRecord>), LabelError> {
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            match self.normalize(row, index) {
                Ok(record) => records.push(record),
                Err(error) if policy == ErrorPolicy::SkipRecord && error.is_record_level() => {
                    tracing::warn!(row = index, %error, "skipping invalid record");
                    skipped.push(SkippedRecord { row: index, error });
                }
                Err(error) => return Err(error),
            }
        }
        Ok((records, skipped))
    }
}

/// Divide `text` into `parts` contiguous character slices.
///
/// Earlier slices take the remainder, so lengths differ by at most one.
/// Concatenating the slices gives back `text`.
pub fn split_chars(text: &str, parts: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let parts = parts.max(1);
    let base = chars.len() / parts;
    let extra = chars.len() % parts;
    let mut out = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        out.push(chars[start..start + len].iter().collect());
        start += len;
    }
    out
}

/// Child labels derived from a start serial.
///
/// `BOX00001` numbers children `BOX00001-01`, `BOX00001-02`, ... and
/// `BOX00001-03` continues at `-03`. Suffix width is at least two digits.
/// A suffix too large for `u64`, or numbering that would run past it, is
/// an error.
pub fn child_serials(serial: &str, count: usize) -> Result<Vec<String>, String> {
    let serial = serial.trim();
    let (base, start, width) = match serial.rsplit_once('-') {
        Some((base, suffix))
            if !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_digit())
                && base.ends_with(|c: char| c.is_ascii_digit()) =>
        {
            let start = suffix
                .parse::<u64>()
                .map_err(|_| format!("suffix '{}' is out of range", suffix))?;
            (base, start, suffix.len().max(2))
        }
        _ => (serial, 1, 2),
    };
    (0..count as u64)
        .map(|i| -> Result<String, String> {
            let n = start.checked_add(i).ok_or_else(|| {
                format!("numbering {} children from suffix {} overflows", count, start)
            })?;
            Ok(format!("{}-{:0width$}", base, n, width = width))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;

    fn config(kind: TemplateKind) -> TemplateConfig {
        TemplateConfig::new(ConfigOptions {
            template: kind,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_regular_defaults_optional_fields() {
        let config = config(TemplateKind::Regular);
        let row = SourceRow::new().with("Name", "Carton A").with("qty", 12.0);
        let record = Normalizer::new(&config).normalize(&row, 0).unwrap();
        assert_eq!(record.name(), "Carton A");
        assert_eq!(record.quantity(), 12.0);
        assert_eq!(record.text("description", 0), "");
        assert_eq!(record.text("remark", 0), "");
    }

    #[test]
    fn test_chinese_headers_map_to_fields() {
        let config = config(TemplateKind::Regular);
        let row = SourceRow::new()
            .with("标签名称", "测试标签")
            .with("总张数", "1,200")
            .with("客户编码", "C-01");
        let record = Normalizer::new(&config).normalize(&row, 4).unwrap();
        assert_eq!(record.name(), "测试标签");
        assert_eq!(record.quantity(), 1200.0);
        assert_eq!(record.text("remark", 0), "C-01");
        assert_eq!(record.row_index, 4);
    }

    #[test]
    fn test_missing_name_reports_field_and_row() {
        let config = config(TemplateKind::Regular);
        let row = SourceRow::new().with("qty", 1.0);
        let err = Normalizer::new(&config).normalize(&row, 7).unwrap_err();
        match err {
            LabelError::Validation { field, row, .. } => {
                assert_eq!(field, "name");
                assert_eq!(row, 7);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_qty_rejected() {
        let config = config(TemplateKind::Regular);
        let row = SourceRow::new().with("name", "A").with("qty", "ten");
        let err = Normalizer::new(&config).normalize(&row, 0).unwrap_err();
        assert!(err.to_string().contains("field 'qty'"));
    }

    #[test]
    fn test_unknown_columns_dropped() {
        let config = config(TemplateKind::Regular);
        let row = SourceRow::new()
            .with("name", "A")
            .with("qty", 1.0)
            .with("warehouse", "B2");
        let record = Normalizer::new(&config).normalize(&row, 0).unwrap();
        assert!(!record.fields.contains_key("warehouse"));
    }

    #[test]
    fn test_split_single_field_slices() {
        let config = TemplateConfig::new(ConfigOptions {
            template: TemplateKind::Split,
            split_count: 3,
            split_fields: vec!["code".into()],
            ..Default::default()
        })
        .unwrap();
        let row = SourceRow::new()
            .with("name", "A")
            .with("qty", 1.0)
            .with("code", "ABCDEFGH");
        let record = Normalizer::new(&config).normalize(&row, 0).unwrap();
        let parts: Vec<&str> = record.sub_boxes.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(parts, vec!["ABC", "DEF", "GH"]);
        assert_eq!(record.sub_boxes[2].part, 3);
        assert_eq!(record.sub_boxes[2].of, 3);
    }

    #[test]
    fn test_split_requires_split_field() {
        let config = config(TemplateKind::Split);
        let row = SourceRow::new().with("name", "A").with("qty", 1.0);
        let err = Normalizer::new(&config).normalize(&row, 2).unwrap_err();
        assert!(err.to_string().contains("field 'code'"));
    }

    #[test]
    fn test_split_chars_cover_text_without_overlap() {
        for text in ["", "A", "ABCDE", "标签名称测试"] {
            for parts in 1..=4 {
                let slices = split_chars(text, parts);
                assert_eq!(slices.len(), parts);
                assert_eq!(slices.concat(), text);
            }
        }
    }

    #[test]
    fn test_child_serials_from_plain_serial() {
        assert_eq!(
            child_serials("DSK00001", 3).unwrap(),
            vec!["DSK00001-01", "DSK00001-02", "DSK00001-03"]
        );
    }

    #[test]
    fn test_child_serials_continue_suffix() {
        assert_eq!(
            child_serials("JAW01001-03", 2).unwrap(),
            vec!["JAW01001-03", "JAW01001-04"]
        );
    }

    #[test]
    fn test_child_serials_suffix_out_of_range() {
        assert!(child_serials("A1-99999999999999999999", 2).is_err());
    }

    #[test]
    fn test_child_serials_overflow_is_error() {
        assert!(child_serials("A1-18446744073709551615", 2).is_err());
        assert_eq!(
            child_serials("A1-18446744073709551615", 1).unwrap(),
            vec!["A1-18446744073709551615"]
        );
    }

    #[test]
    fn test_nested_serial_overflow_reports_row() {
        let config = config(TemplateKind::Nested);
        let row = SourceRow::new()
            .with("name", "Set")
            .with("qty", 2.0)
            .with("serial", "A1-18446744073709551615");
        let err = Normalizer::new(&config).normalize(&row, 4).unwrap_err();
        assert!(matches!(
            err,
            LabelError::Validation { ref field, row: 4, .. } if field == "serial"
        ));
    }

    #[test]
    fn test_nested_children_without_serial() {
        let config = config(TemplateKind::Nested);
        let row = SourceRow::new().with("name", "Set").with("qty", 2.0);
        let record = Normalizer::new(&config).normalize(&row, 0).unwrap();
        assert_eq!(record.children, vec!["1/2", "2/2"]);
    }

    #[test]
    fn test_nested_explicit_children_must_match_qty() {
        let config = config(TemplateKind::Nested);
        let row = SourceRow::new()
            .with("name", "Set")
            .with("qty", 3.0)
            .with("children", "a; b");
        let err = Normalizer::new(&config).normalize(&row, 0).unwrap_err();
        assert!(err.to_string().contains("field 'children'"));
    }

    #[test]
    fn test_nested_fractional_count_rejected() {
        let config = config(TemplateKind::Nested);
        let row = SourceRow::new().with("name", "Set").with("qty", 2.5);
        assert!(Normalizer::new(&config).normalize(&row, 0).is_err());
    }

    #[test]
    fn test_skip_policy_collects_errors() {
        let config = config(TemplateKind::Regular);
        let rows = vec![
            SourceRow::new().with("name", "A").with("qty", 1.0),
            SourceRow::new().with("name", "B"),
            SourceRow::new().with("name", "C").with("qty", 3.0),
        ];
        let normalizer = Normalizer::new(&config);
        let (records, skipped) = normalizer.normalize_all(&rows, ErrorPolicy::SkipRecord).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].row, 1);
        assert!(normalizer.normalize_all(&rows, ErrorPolicy::Abort).is_err());
    }
}
