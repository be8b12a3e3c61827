use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub const DEFAULT_WORKSHEET: &str = "Tabelle1";

/// Which table backend the sync engine talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sheets,
    /// Process-local table, for development without Google credentials
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "sheets" | "gsheets" => Ok(Self::Sheets),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(AppError::Configuration(format!(
                "unknown STORE_BACKEND '{}' (expected 'sheets' or 'memory')",
                other
            ))),
        }
    }
}

/// Raw Google Sheets settings. Credentials stay optional here; absence is
/// reported when a connection is attempted, not at startup.
#[derive(Clone, Debug, Default)]
pub struct SheetsConfig {
    pub service_account_email: Option<String>,
    pub private_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub sheets: SheetsConfig,
    pub connection_ttl: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match lookup("STORE_BACKEND") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::Sheets,
        };

        Ok(Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: lookup("SERVER_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(50051),
            store_backend,
            sheets: SheetsConfig {
                service_account_email: non_empty("GSHEETS_SERVICE_ACCOUNT_EMAIL"),
                private_key: non_empty("GSHEETS_PRIVATE_KEY"),
                spreadsheet_id: non_empty("GSHEETS_SPREADSHEET_ID"),
                worksheet: non_empty("GSHEETS_WORKSHEET")
                    .unwrap_or_else(|| DEFAULT_WORKSHEET.to_string()),
            },
            connection_ttl: Duration::from_secs(
                lookup("CONNECTION_TTL_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            http_timeout: Duration::from_secs(
                lookup("HTTP_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
