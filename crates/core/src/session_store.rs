//! In-memory registry of practice sessions, owned by whoever hosts it.

use crate::transcript::Role;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} is already completed")]
    AlreadyCompleted(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub interview_mode: Option<String>,
    pub voice_id: Option<String>,
    pub resume_data: Option<Value>,
    pub assistant_mode: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub id: String,
    pub candidate_info: String,
    pub config: SessionConfig,
    pub messages: Vec<SessionMessage>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

fn new_session_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, InterviewRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, candidate_info: &str, config: SessionConfig) -> InterviewRecord {
        let record = InterviewRecord {
            id: new_session_id(),
            candidate_info: candidate_info.to_string(),
            config,
            messages: Vec::new(),
            created_at: Utc::now().timestamp_millis(),
            completed_at: None,
        };
        self.sessions
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        tracing::info!(session_id = %record.id, "session created");
        record
    }

    pub async fn get(&self, id: &str) -> Option<InterviewRecord> {
        self.sessions.read().await.get(id).cloned()
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<InterviewRecord> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn add_message(
        &self,
        id: &str,
        role: Role,
        content: &str,
    ) -> Result<InterviewRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.completed_at.is_some() {
            return Err(StoreError::AlreadyCompleted(id.to_string()));
        }
        record.messages.push(SessionMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
        Ok(record.clone())
    }

    pub async fn complete(&self, id: &str) -> Result<InterviewRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.completed_at.is_some() {
            return Err(StoreError::AlreadyCompleted(id.to_string()));
        }
        record.completed_at = Some(Utc::now().timestamp_millis());
        tracing::info!(session_id = id, messages = record.messages.len(), "session completed");
        Ok(record.clone())
    }
}
