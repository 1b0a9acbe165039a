//! Input spreadsheet reader.
//!
//! Batch input is a worksheet with a header row. The device-name column is
//! required; the client-name column is optional and only used to narrow
//! ambiguous searches. `.csv` files are read with the `csv` crate, anything
//! else is opened as an `.xlsx` workbook.

use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use serde::Deserialize;

use crate::error::{OpsRampError, Result};

/// Which sheet and columns hold the batch input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InputColumns {
    /// Header of the device-name column.
    pub server_column: String,
    /// Header of the client-name column.
    pub client_column: String,
    /// Worksheet name; the first sheet when `None`.
    pub sheet: Option<String>,
}

impl Default for InputColumns {
    fn default() -> Self {
        Self {
            server_column: "Server Name".to_string(),
            client_column: "Client Name".to_string(),
            sheet: None,
        }
    }
}

/// One usable input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number in the sheet (header is row 1).
    pub row: usize,
    /// Device name to search for.
    pub server_name: String,
    /// Client display name, when the column exists and the cell is set.
    pub client_name: Option<String>,
}

/// Reads every row with a non-empty device name.
///
/// # Errors
///
/// `OpsRampError::Input` when the file cannot be opened, the sheet does not
/// exist, or the device-name column is missing.
pub fn read_rows(path: &Path, columns: &InputColumns) -> Result<Vec<SheetRow>> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let table = if is_csv {
        read_csv_table(path)?
    } else {
        read_xlsx_table(path, columns.sheet.as_deref())?
    };
    let rows = rows_from_table(&table, columns)?;
    log::info!(
        "Server names and client names loaded from {} ({} rows).",
        path.display(),
        rows.len()
    );
    Ok(rows)
}

fn read_xlsx_table(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| OpsRampError::input(format!("failed to open {}", path.display()), e))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| OpsRampError::Input {
                message: format!("{} has no sheets", path.display()),
                source: None,
            })?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| OpsRampError::input(format!("failed to read sheet '{sheet_name}'"), e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_string).collect())
        .collect())
}

fn read_csv_table(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| OpsRampError::input(format!("failed to open {}", path.display()), e))?;

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| OpsRampError::input(format!("failed to read {}", path.display()), e))
        })
        .collect()
}

fn cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

fn rows_from_table(table: &[Vec<String>], columns: &InputColumns) -> Result<Vec<SheetRow>> {
    let Some(header) = table.first() else {
        log::warn!("No server names found in the input sheet.");
        return Ok(Vec::new());
    };

    let server_col = column_index(header, &columns.server_column).ok_or_else(|| {
        OpsRampError::Input {
            message: format!("column '{}' not found in header", columns.server_column),
            source: None,
        }
    })?;
    let client_col = column_index(header, &columns.client_column);
    if client_col.is_none() {
        log::warn!(
            "Column '{}' not found; rows will be resolved without client filtering.",
            columns.client_column
        );
    }

    let mut rows = Vec::new();
    for (idx, cells) in table.iter().enumerate().skip(1) {
        let cell = |col: usize| {
            cells
                .get(col)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let Some(server_name) = cell(server_col) else {
            log::warn!("Row {} has no server name; skipping.", idx + 1);
            continue;
        };
        rows.push(SheetRow {
            row: idx + 1,
            server_name,
            client_name: client_col.and_then(cell),
        });
    }
    Ok(rows)
}
