//! Spreadsheet-driven batch drivers.
//!
//! Each driver walks the rows from [`sheet::read_rows`], resolves every row
//! to a device and performs one lifecycle operation. A row failure is logged
//! and recorded with a status string; it never aborts the batch. The
//! resulting records go to [`output::write_records`].

pub mod lookup;
pub mod membership;
pub mod output;
pub mod sheet;
pub mod tagging;
pub mod unmanage;

use serde_json::Value;

use crate::error::OpsRampError;

pub use output::{OutputFormat, Record, write_records};
pub use sheet::{InputColumns, SheetRow, read_rows};

/// Placeholder for values the API did not return.
pub const NOT_AVAILABLE: &str = "N/A";

/// Status of rows whose search found nothing usable.
pub const NO_RESOURCE: &str = "No resource found";

/// Row status for a failure while resolving the row to a device. Only at
/// this stage does `NotFound` mean the device is missing.
pub fn lookup_status(err: &OpsRampError) -> String {
    match err {
        OpsRampError::NotFound { .. } => NO_RESOURCE.to_string(),
        other => error_status(other),
    }
}

/// Row status for a failed operation on a resolved device. A 404 here names
/// the endpoint that answered it.
pub fn error_status(err: &OpsRampError) -> String {
    format!("Error - {err}")
}

pub(crate) fn text_or_na(value: Option<&str>) -> Value {
    Value::String(value.unwrap_or(NOT_AVAILABLE).to_string())
}
