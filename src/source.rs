//! # Spreadsheet Source
//!
//! Turns a CSV or XLSX/XLS/ODS file into [`SourceRow`]s. The first row with
//! any content is the header; every later non-empty row becomes one record,
//! its cells keyed by the header text above them. Columns with a blank
//! header are dropped.

use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::LabelError;
use crate::model::{CellValue, SourceRow};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Read all data rows from `path`.
///
/// `sheet` picks a worksheet by name; without it the first sheet is used.
/// It is ignored for CSV.
pub fn read_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<SourceRow>, LabelError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        read_workbook(path, sheet)?
    } else {
        let bytes = fs::read(path).map_err(|e| source_error(path, e))?;
        read_csv(&bytes).map_err(|reason| LabelError::Source {
            path: path.to_path_buf(),
            reason,
        })?
    };
    tracing::debug!(path = %path.display(), rows = rows.len(), "read source rows");
    Ok(rows)
}

/// Parse CSV bytes. Invalid UTF-8 is replaced rather than rejected.
pub fn read_csv(bytes: &[u8]) -> Result<Vec<SourceRow>, String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| format!("CSV parse error: {}", e))?;
        grid.push(
            record
                .iter()
                .map(|s| {
                    if s.trim().is_empty() {
                        CellValue::Blank
                    } else {
                        CellValue::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows_from_grid(grid))
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<SourceRow>, LabelError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| source_error(path, e))?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| LabelError::Source {
                path: path.to_path_buf(),
                reason: format!(
                    "no sheet named '{}' (available: {})",
                    wanted,
                    names.join(", ")
                ),
            })?,
        None => names.first().cloned().ok_or_else(|| LabelError::Source {
            path: path.to_path_buf(),
            reason: "workbook has no sheets".to_string(),
        })?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| source_error(path, e))?;
    let grid = range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    Ok(rows_from_grid(grid))
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Blank,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Text(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#ERR: {:?}", e)),
        Data::Empty => CellValue::Blank,
    }
}

fn rows_from_grid(grid: Vec<Vec<CellValue>>) -> Vec<SourceRow> {
    let mut lines = grid
        .into_iter()
        .filter(|cells| cells.iter().any(|c| !c.is_blank()));
    let header: Vec<String> = match lines.next() {
        Some(cells) => cells.iter().map(|c| c.as_text()).collect(),
        None => return Vec::new(),
    };

    lines
        .map(|cells| {
            header
                .iter()
                .zip(cells.into_iter().chain(std::iter::repeat(CellValue::Blank)))
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.clone(), value))
                .collect()
        })
        .collect()
}

fn source_error(path: &Path, e: impl std::fmt::Display) -> LabelError {
    LabelError::Source {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
