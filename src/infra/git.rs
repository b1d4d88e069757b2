use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::diff::DiffText;
use crate::error::{AppError, AppResult};
use crate::services::VersionControlService;
use crate::services::version_control::RevisionRange;

pub struct GitCli {
    workspace_root: PathBuf,
}

impl GitCli {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl VersionControlService for GitCli {
    async fn diff(&self, range: &RevisionRange) -> AppResult<DiffText> {
        debug!(from = %range.from, to = %range.to, "running git diff");

        let output = Command::new("git")
            .arg("diff")
            .arg(&range.from)
            .arg(&range.to)
            .current_dir(&self.workspace_root)
            .output()
            .await
            .map_err(|err| AppError::SourceUnavailable(format!("failed to run git: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::SourceUnavailable(format!(
                "git diff {}..{} failed in {}: {}",
                range.from,
                range.to,
                self.workspace_root.display(),
                stderr.trim()
            )));
        }

        Ok(DiffText::new(String::from_utf8_lossy(&output.stdout)))
    }
}
