//! Test doubles shared by unit and integration tests.

use async_trait::async_trait;
use std::sync::Mutex;

use docuchat_common::AnswerRecord;

use crate::error::{Error, Result};
use crate::relay::AnswerStore;

/// Recording [`AnswerStore`] double: remembers every save, optionally fails.
pub struct RecordingStore {
    saved: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A store whose every save fails, for exercising the error branch.
    pub fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// All `(question_id, content)` pairs saved so far.
    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerStore for RecordingStore {
    async fn save_answer(&self, question_id: &str, content: &str) -> Result<AnswerRecord> {
        if self.fail {
            return Err(Error::ServiceUnavailable(
                "conversation service is down".to_string(),
            ));
        }
        self.saved
            .lock()
            .unwrap()
            .push((question_id.to_string(), content.to_string()));
        Ok(AnswerRecord::new(question_id, content))
    }
}
