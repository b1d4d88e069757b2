use async_trait::async_trait;

use crate::domain::changelog::ChangeRecord;
use crate::error::AppResult;

#[async_trait]
pub trait ChangelogStore: Send + Sync {
    /// Adds the record to the history under `timestamp`.
    async fn record(&self, timestamp: &str, record: &ChangeRecord) -> AppResult<()>;
    async fn append_summary(&self, timestamp: &str, summary: &str) -> AppResult<()>;
}
