//! Provider prompt-cache hints.
//!
//! Marks the trailing tool definition and the request metadata with an
//! ephemeral cache-control extra. Providers that do not support prompt
//! caching ignore the extras.

use async_trait::async_trait;
use fathom_core::{AgentState, FathomError};
use fathom_middleware::{AgentMiddleware, ModelRequest};
use serde_json::json;

pub struct PromptCachingMiddleware;

impl PromptCachingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PromptCachingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentMiddleware for PromptCachingMiddleware {
    async fn modify_model_request(
        &self,
        request: &mut ModelRequest,
        _state: &AgentState,
    ) -> Result<(), FathomError> {
        if let Some(last) = request.tools.last_mut() {
            last.extras
                .get_or_insert_with(Default::default)
                .insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        }
        request
            .metadata
            .insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        Ok(())
    }
}
