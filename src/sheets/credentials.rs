use crate::config::SheetsConfig;

/// Service account material needed to reach one spreadsheet.
#[derive(Clone)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub spreadsheet_id: String,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .finish()
    }
}

impl ServiceAccountCredentials {
    /// Returns `Err` with the names of the missing environment variables.
    pub fn from_config(config: &SheetsConfig) -> Result<Self, Vec<&'static str>> {
        let mut missing = Vec::new();
        if config.private_key.is_none() {
            missing.push("GSHEETS_PRIVATE_KEY");
        }
        if config.spreadsheet_id.is_none() {
            missing.push("GSHEETS_SPREADSHEET_ID");
        }
        if config.service_account_email.is_none() {
            missing.push("GSHEETS_SERVICE_ACCOUNT_EMAIL");
        }

        match (
            &config.service_account_email,
            &config.private_key,
            &config.spreadsheet_id,
        ) {
            (Some(email), Some(key), Some(id)) => Ok(Self {
                client_email: email.trim().to_string(),
                private_key: normalize_private_key(key),
                spreadsheet_id: id.trim().to_string(),
            }),
            _ => Err(missing),
        }
    }
}

/// Hosting dashboards store the PEM on one line with literal `\n`.
pub fn normalize_private_key(raw: &str) -> String {
    raw.trim().trim_matches('"').replace("\\n", "\n")
}
