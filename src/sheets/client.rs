use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::auth::ServiceAccountAuth;
use super::credentials::ServiceAccountCredentials;
use super::{cell_to_string, rows_from_grid, string_to_cell, RawRow, StoreConnector, TableStore};
use crate::config::SheetsConfig;
use crate::error::{AppError, AppResult};

/// Google Sheets API v4 spreadsheets endpoint
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Rightmost column touched when trimming stale cells
const LAST_COLUMN: &str = "ZZ";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

/// Live handle to one worksheet of a spreadsheet
pub struct SheetsTable {
    client: Client,
    auth: ServiceAccountAuth,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsTable {
    fn sheet_ref(&self) -> String {
        format!("'{}'", self.worksheet.replace('\'', "''"))
    }

    fn range(&self, cells: &str) -> String {
        format!("{}!{}", self.sheet_ref(), cells)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    /// Confirms the spreadsheet is reachable and holds the worksheet.
    async fn verify_worksheet(&self) -> AppResult<()> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(format!("{}/{}", SHEETS_API_BASE, self.spreadsheet_id))
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Spreadsheet lookup failed: {}", e)))?;
        let response = ensure_success(response, AppError::Connection, "Spreadsheet lookup").await?;

        let meta: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| AppError::Connection(format!("Invalid spreadsheet metadata: {}", e)))?;

        if meta
            .sheets
            .iter()
            .any(|s| s.properties.title == self.worksheet)
        {
            Ok(())
        } else {
            Err(AppError::Connection(format!(
                "Worksheet '{}' not found in spreadsheet {}",
                self.worksheet, self.spreadsheet_id
            )))
        }
    }
}

#[tonic::async_trait]
impl TableStore for SheetsTable {
    async fn read_all(&self) -> AppResult<Vec<RawRow>> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.values_url(&self.sheet_ref()))
            .query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Read(format!("Sheets read failed: {}", e)))?;
        let response = ensure_success(response, AppError::Read, "Sheets read").await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| AppError::Read(format!("Failed to parse sheet values: {}", e)))?;

        let grid: Vec<Vec<String>> = range
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        let rows = rows_from_grid(&grid);
        tracing::debug!("Sheets read: sheet={}, rows={}", self.worksheet, rows.len());
        Ok(rows)
    }

    /// Writes the new grid over the old one first and clears leftover cells
    /// afterwards, so a failed write never leaves the sheet empty.
    async fn write_all(&self, columns: &[&str], rows: Vec<Vec<String>>) -> AppResult<()> {
        let token = self.auth.access_token().await?;
        let height = rows.len() + 1;

        let mut values: Vec<Vec<Value>> = Vec::with_capacity(height);
        values.push(columns.iter().map(|c| Value::String(c.to_string())).collect());
        values.extend(
            rows.iter()
                .map(|row| row.iter().map(|cell| string_to_cell(cell)).collect::<Vec<Value>>()),
        );

        let anchor = self.range("A1");
        let response = self
            .client
            .put(self.values_url(&anchor))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&token)
            .json(&json!({
                "range": anchor,
                "majorDimension": "ROWS",
                "values": values,
            }))
            .send()
            .await
            .map_err(|e| AppError::Write(format!("Sheets write failed: {}", e)))?;
        ensure_success(response, AppError::Write, "Sheets write").await?;

        let stale: Vec<String> = stale_ranges(height, columns.len())
            .iter()
            .map(|cells| self.range(cells))
            .collect();
        let response = self
            .client
            .post(format!("{}/{}/values:batchClear", SHEETS_API_BASE, self.spreadsheet_id))
            .bearer_auth(&token)
            .json(&json!({ "ranges": stale }))
            .send()
            .await
            .map_err(|e| AppError::Write(format!("Clearing stale rows failed: {}", e)))?;
        ensure_success(response, AppError::Write, "Clearing stale rows").await?;

        tracing::info!(
            "Sheets write: sheet={}, rows={}",
            self.worksheet,
            rows.len()
        );
        Ok(())
    }

    fn table_name(&self) -> &str {
        &self.worksheet
    }
}

/// Connects to the configured worksheet with service account credentials
pub struct SheetsConnector {
    client: Client,
    credentials: Result<ServiceAccountCredentials, Vec<&'static str>>,
    worksheet: String,
}

impl SheetsConnector {
    pub fn new(config: &SheetsConfig, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials: ServiceAccountCredentials::from_config(config),
            worksheet: config.worksheet.clone(),
        })
    }
}

#[tonic::async_trait]
impl StoreConnector for SheetsConnector {
    async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
        let credentials = match &self.credentials {
            Ok(credentials) => credentials,
            Err(_) => return Ok(None),
        };

        let auth = ServiceAccountAuth::new(self.client.clone(), credentials)?;
        let table = SheetsTable {
            client: self.client.clone(),
            auth,
            spreadsheet_id: credentials.spreadsheet_id.clone(),
            worksheet: self.worksheet.clone(),
        };
        table.verify_worksheet().await.map_err(|e| {
            AppError::Connection(format!(
                "{} (check that the spreadsheet is shared with {})",
                e, credentials.client_email
            ))
        })?;

        tracing::info!(
            "Connected to spreadsheet {} (worksheet '{}')",
            credentials.spreadsheet_id,
            self.worksheet
        );
        Ok(Some(Arc::new(table)))
    }

    fn configuration_problem(&self) -> Option<String> {
        match &self.credentials {
            Ok(_) => None,
            Err(missing) => Some(format!(
                "Google Sheets credentials missing: {}",
                missing.join(", ")
            )),
        }
    }
}

async fn ensure_success(
    response: Response,
    error: fn(String) -> AppError,
    what: &str,
) -> AppResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(error(format!("{} rejected ({}): {}", what, status, body)))
}

/// Cells left over from a previous, larger grid once `height` rows
/// (header included) of `width` columns have been written from A1: every
/// row below the grid, and the columns right of it up to `LAST_COLUMN`.
fn stale_ranges(height: usize, width: usize) -> Vec<String> {
    vec![
        format!("A{}:{}", height + 1, LAST_COLUMN),
        format!("{}1:{}{}", column_letter(width), LAST_COLUMN, height),
    ]
}

/// Zero-based column index to A1 letters (0 → A, 26 → AA).
fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
