use async_trait::async_trait;

use crate::domain::changelog::CompletionStatus;
use crate::error::AppResult;

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub status: CompletionStatus,
}

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Errors are transport failures; malformed content is returned as-is.
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> AppResult<Completion>;
}
