use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::credentials::ServiceAccountCredentials;
use crate::error::{AppError, AppResult};

/// Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read/write access to spreadsheets
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of the signed assertion (Google's maximum)
const ASSERTION_TTL_SECS: i64 = 3600;

/// Refresh this long before the access token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Claims of the service account JWT bearer assertion
#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Cached access token
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Access token source for a service account, with token caching
#[derive(Clone)]
pub struct ServiceAccountAuth {
    client: Client,
    client_email: String,
    encoding_key: EncodingKey,
    token_url: String,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Fails with a connection error when the private key is not valid PEM.
    pub fn new(client: Client, credentials: &ServiceAccountCredentials) -> AppResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| AppError::Connection(format!("Malformed private key: {}", e)))?;

        Ok(Self {
            client,
            client_email: credentials.client_email.clone(),
            encoding_key,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns a bearer token, exchanging a fresh assertion when needed
    pub async fn access_token(&self) -> AppResult<String> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if Instant::now() + EXPIRY_MARGIN < cached.expires_at {
                    return Ok(cached.token.clone());
                }
            }
        }

        let assertion = self.sign_assertion()?;

        let response = self
            .client
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to reach token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Connection(format!(
                "Token request rejected ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to parse token response: {}", e)))?;

        tracing::debug!(
            "Issued access token for {} (expires in {}s)",
            self.client_email,
            token.expires_in
        );

        // Update cache
        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(token.expires_in),
            });
        }

        Ok(token.access_token)
    }

    fn sign_assertion(&self) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: self.token_url.clone(),
            exp: now + ASSERTION_TTL_SECS,
            iat: now,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Connection(format!("Failed to sign assertion: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_key_is_a_connection_error() {
        let credentials = ServiceAccountCredentials {
            client_email: "svc@example.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem".to_string(),
            spreadsheet_id: "abc".to_string(),
        };
        let result = ServiceAccountAuth::new(Client::new(), &credentials);
        assert!(matches!(result, Err(AppError::Connection(_))));
    }
}
