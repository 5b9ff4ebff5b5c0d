//! Answer persistence collaborator.

use async_trait::async_trait;
use std::sync::Arc;

use docuchat_common::AnswerRecord;

use crate::error::{Error, Result};
use crate::gateway::{GatewayResponse, ServiceCall, ServiceGateway};

/// Where relayed answers are persisted.
///
/// The conversation service owns the repository; this trait is the seam the
/// relay sees, so tests can swap in a recording double.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    async fn save_answer(&self, question_id: &str, content: &str) -> Result<AnswerRecord>;
}

/// Persists answers through the gateway to the conversation service.
pub struct ConversationServiceStore {
    gateway: Arc<ServiceGateway>,
    base_url: String,
}

impl ConversationServiceStore {
    pub fn new(gateway: Arc<ServiceGateway>, base_url: &str) -> Self {
        Self {
            gateway,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl AnswerStore for ConversationServiceStore {
    async fn save_answer(&self, question_id: &str, content: &str) -> Result<AnswerRecord> {
        let call = ServiceCall::post(
            "conversation_service",
            &self.base_url,
            &format!("/questions/{}/answer", question_id),
        )
        .json(serde_json::json!({ "content": content }));

        match self.gateway.dispatch(call).await? {
            GatewayResponse::JsonBody(value) => serde_json::from_value(value).map_err(|e| {
                Error::Internal(format!("conversation service returned an invalid answer record: {}", e))
            }),
            GatewayResponse::NotOk { status, body } => Err(Error::Upstream {
                status,
                body: body.to_string(),
            }),
            _ => Err(Error::Internal(
                "conversation service returned a non-JSON response".to_string(),
            )),
        }
    }
}
