//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::ServiceGateway;
use crate::relay::{AnswerStore, ConversationServiceStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<ServiceGateway>,
    pub answer_store: Arc<dyn AnswerStore>,
}

impl AppState {
    /// Build the production state: one gateway shared by all outbound
    /// calls, answers persisted through it to the conversation service.
    pub fn new(config: Config) -> Result<Self> {
        let gateway = Arc::new(ServiceGateway::new(&config.gateway));
        let conversation_url = config
            .services
            .url("conversation_service")
            .ok_or_else(|| {
                Error::Internal("services.urls.conversation_service is not configured".to_string())
            })?
            .to_string();
        let answer_store = Arc::new(ConversationServiceStore::new(
            gateway.clone(),
            &conversation_url,
        ));
        Ok(Self::with_store(config, gateway, answer_store))
    }

    /// Build state with an explicit store, used by tests.
    pub fn with_store(
        config: Config,
        gateway: Arc<ServiceGateway>,
        answer_store: Arc<dyn AnswerStore>,
    ) -> Self {
        Self {
            config,
            gateway,
            answer_store,
        }
    }
}
