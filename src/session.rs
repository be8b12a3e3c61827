use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tonic::metadata::MetadataMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// gRPC metadata key carrying the session token
pub const SESSION_METADATA_KEY: &str = "x-session-token";

/// A logged-in user. The username is only a partition key, not an identity.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

/// Live sessions keyed by token
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session for `username` (trimmed, must be non-empty).
    pub async fn login(&self, username: &str) -> AppResult<Session> {
        let owner = username.trim();
        if owner.is_empty() {
            return Err(AppError::InvalidInput("username is required".to_string()));
        }

        let session = Session {
            token: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            created_at: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        tracing::info!("Session started for owner={}", session.owner);
        Ok(session)
    }

    pub async fn resolve(&self, token: &str) -> AppResult<Session> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("Unknown or expired session".to_string()))
    }

    pub async fn logout(&self, token: &str) -> AppResult<Session> {
        let session = self
            .sessions
            .write()
            .await
            .remove(token)
            .ok_or_else(|| AppError::Unauthenticated("Unknown or expired session".to_string()))?;
        tracing::info!(
            "Session ended for owner={} after {}s",
            session.owner,
            (Utc::now() - session.created_at).num_seconds()
        );
        Ok(session)
    }
}

/// Extracts the session token from gRPC request metadata.
pub fn token_from_metadata(metadata: &MetadataMap) -> AppResult<String> {
    metadata
        .get(SESSION_METADATA_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::Unauthenticated("Login required".to_string()))
}
