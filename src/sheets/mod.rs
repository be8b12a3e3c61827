// Store adapter: one named table inside a remote spreadsheet

pub mod auth;
pub mod client;
pub mod connection;
pub mod credentials;
pub mod memory;

pub use client::{SheetsConnector, SheetsTable};
pub use connection::ConnectionCache;
pub use credentials::ServiceAccountCredentials;
pub use memory::{MemoryConnector, MemoryTable};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AppResult;

/// One data row keyed by header name, values as raw cell text.
pub type RawRow = HashMap<String, String>;

/// Handle to a single table with a header row.
#[tonic::async_trait]
pub trait TableStore: Send + Sync {
    /// Every data row in stored order. Fully empty rows are skipped.
    async fn read_all(&self) -> AppResult<Vec<RawRow>>;

    /// Replaces the table with `columns` as header followed by `rows`.
    async fn write_all(&self, columns: &[&str], rows: Vec<Vec<String>>) -> AppResult<()>;

    fn table_name(&self) -> &str;
}

/// Opens table handles. `Ok(None)` means the backend is not configured.
#[tonic::async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>>;

    /// Human readable reason why `connect` would yield no handle.
    fn configuration_problem(&self) -> Option<String>;
}

/// Pairs a grid's header row with each data row.
pub fn rows_from_grid(grid: &[Vec<String>]) -> Vec<RawRow> {
    let Some((header, body)) = grid.split_first() else {
        return Vec::new();
    };

    body.iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .map(|row| {
            header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Renders a number the way it is written back: integral values without a
/// fraction, everything else in shortest round-trip form.
pub fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Converts an unformatted Sheets API cell into its text form.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map(render_number).unwrap_or_else(|| n.to_string()),
        },
        other => other.to_string(),
    }
}

/// Inverse of [`cell_to_string`]: text that is the canonical rendering of a
/// number goes out as a number, anything else stays a string.
pub fn string_to_cell(text: &str) -> Value {
    if let Ok(n) = text.parse::<f64>() {
        if n.is_finite() && render_number(n) == text {
            if let Some(number) = serde_json::Number::from_f64(n) {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    return Value::from(n as i64);
                }
                return Value::Number(number);
            }
        }
    }
    Value::String(text.to_string())
}
