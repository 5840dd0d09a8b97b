//! Session persistence
//!
//! The registry only needs save/load; `list` and `delete` back the HTTP
//! session listing. Storage problems never reach callers: a failed save is
//! logged, a failed load looks like "no record".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::TurnRecord;
use crate::core::RelayResult;

/// Profile name recorded for sessions saved before profiles were stored
const LEGACY_PROFILE: &str = "default";

/// What a store hands back for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Profile the session's engine was built from
    pub profile: String,

    /// Full history including the system record
    pub history: Vec<TurnRecord>,

    /// Crate version that wrote the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    pub fn new(profile: impl Into<String>, history: Vec<TurnRecord>) -> Self {
        Self {
            profile: profile.into(),
            history,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            saved_at: Some(Utc::now()),
        }
    }
}

/// On-disk shapes accepted when loading
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredFormat {
    Current(StoredSession),
    Legacy(Vec<TurnRecord>),
}

/// Durable storage for session history
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a session, replacing any previous record
    async fn save(&self, session_id: &str, profile: &str, history: &[TurnRecord]);

    /// Fetch a session, `None` if absent or unreadable
    async fn load(&self, session_id: &str) -> Option<StoredSession>;

    /// Stored session ids, most recently saved first
    async fn list(&self) -> Vec<String>;

    /// Remove a stored session, `true` if something was deleted
    async fn delete(&self, session_id: &str) -> bool;
}

/// One pretty-printed JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    base_dir: PathBuf,
}

impl JsonSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File for a session id, reduced to its final path component
    ///
    /// Ids with no usable final component (`..`, `/`, empty) get no file.
    pub fn path_for(&self, session_id: &str) -> Option<PathBuf> {
        let name = Path::new(session_id).file_name()?.to_str()?;
        Some(self.base_dir.join(format!("{}.json", name)))
    }

    async fn write_record(&self, path: &Path, record: &StoredSession) -> RelayResult<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn read_record(path: &Path) -> RelayResult<StoredSession> {
        let raw = tokio::fs::read_to_string(path).await?;
        let record = match serde_json::from_str::<StoredFormat>(&raw)? {
            StoredFormat::Current(record) => record,
            StoredFormat::Legacy(history) => StoredSession {
                profile: LEGACY_PROFILE.to_string(),
                history,
                version: None,
                saved_at: None,
            },
        };
        Ok(record)
    }

    async fn list_entries(&self) -> RelayResult<Vec<String>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry.metadata().await?.modified()?;
            entries.push((modified, stem.to_string()));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn save(&self, session_id: &str, profile: &str, history: &[TurnRecord]) {
        let Some(path) = self.path_for(session_id) else {
            tracing::warn!(session_id = %session_id, "Refusing to save session with unusable id");
            return;
        };

        let record = StoredSession::new(profile, history.to_vec());
        match self.write_record(&path, &record).await {
            Ok(()) => tracing::debug!(
                session_id = %session_id,
                records = history.len(),
                "Session saved"
            ),
            Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Failed to save session"),
        }
    }

    async fn load(&self, session_id: &str) -> Option<StoredSession> {
        let path = self.path_for(session_id)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return None;
        }

        match Self::read_record(&path).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to load session");
                None
            }
        }
    }

    async fn list(&self) -> Vec<String> {
        match self.list_entries().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::debug!(dir = %self.base_dir.display(), error = %e, "Cannot list sessions");
                Vec::new()
            }
        }
    }

    async fn delete(&self, session_id: &str) -> bool {
        let Some(path) = self.path_for(session_id) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "Session deleted");
                true
            }
            Err(_) => false,
        }
    }
}
