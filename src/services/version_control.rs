use async_trait::async_trait;

use crate::domain::diff::DiffText;
use crate::error::AppResult;

/// Revision pair a changelog is generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub from: String,
    pub to: String,
}

impl RevisionRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Default for RevisionRange {
    fn default() -> Self {
        Self::new("HEAD~1", "HEAD")
    }
}

#[async_trait]
pub trait VersionControlService: Send + Sync {
    async fn diff(&self, range: &RevisionRange) -> AppResult<DiffText>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_previous_commit() {
        let range = RevisionRange::default();
        assert_eq!(range.from, "HEAD~1");
        assert_eq!(range.to, "HEAD");
    }
}
