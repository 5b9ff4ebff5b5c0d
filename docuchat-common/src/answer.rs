//! Persisted answer model.

use serde::{Deserialize, Serialize};

/// An answer as stored by the conversation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: String,
    pub question_id: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AnswerRecord {
    pub fn new(question_id: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question_id: question_id.to_string(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        }
    }
}
