use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::domain::changelog::ChangeRecord;
use crate::error::{AppError, AppResult};
use crate::services::ChangelogStore;

/// Keeps `changelog.json` (records keyed by timestamp) and `changelog.md` side by side.
pub struct FileChangelogStore {
    history_path: PathBuf,
    summary_path: PathBuf,
}

impl FileChangelogStore {
    pub fn new(history_path: PathBuf, summary_path: PathBuf) -> Self {
        Self {
            history_path,
            summary_path,
        }
    }

    /// Entries are kept as raw JSON so hand-edited history survives a rewrite.
    fn load_history(path: &Path) -> AppResult<BTreeMap<String, Value>> {
        match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Persistence(format!(
                    "invalid history file {}: {err}",
                    path.display()
                ))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    /// Entries that do not fit the record shape are skipped, not reported as errors.
    pub fn history(&self) -> AppResult<BTreeMap<String, ChangeRecord>> {
        let entries = Self::load_history(&self.history_path)?
            .into_iter()
            .filter_map(
                |(timestamp, value)| match serde_json::from_value::<ChangeRecord>(value) {
                    Ok(record) => Some((timestamp, record)),
                    Err(err) => {
                        warn!(%timestamp, %err, "skipping unreadable history entry");
                        None
                    }
                },
            )
            .collect();
        Ok(entries)
    }
}

#[async_trait]
impl ChangelogStore for FileChangelogStore {
    async fn record(&self, timestamp: &str, record: &ChangeRecord) -> AppResult<()> {
        let mut history = Self::load_history(&self.history_path)?;
        let value = serde_json::to_value(record)
            .map_err(|err| AppError::Persistence(format!("failed to encode record: {err}")))?;
        history.insert(timestamp.to_string(), value);

        if let Some(parent) = self.history_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&history)
            .map_err(|err| AppError::Persistence(format!("failed to write history: {err}")))?;
        fs::write(&self.history_path, data)?;
        Ok(())
    }

    async fn append_summary(&self, timestamp: &str, summary: &str) -> AppResult<()> {
        if let Some(parent) = self.summary_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.summary_path)?;
        write!(file, "## {timestamp}\n\n{}\n\n", summary.trim())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn store(dir: &Path) -> FileChangelogStore {
        FileChangelogStore::new(dir.join("changelog.json"), dir.join("changelog.md"))
    }

    fn record(added: &str) -> ChangeRecord {
        ChangeRecord {
            added: vec![added.to_string()],
            ..ChangeRecord::default()
        }
    }

    #[tokio::test]
    async fn accumulates_records_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store
            .record("2026-10-17T09:00:00Z", &record("first"))
            .await
            .unwrap();
        store
            .record("2026-10-18T09:00:00Z", &record("second"))
            .await
            .unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history["2026-10-17T09:00:00Z"], record("first"));
        assert_eq!(history["2026-10-18T09:00:00Z"], record("second"));
    }

    #[tokio::test]
    async fn keeps_existing_history_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("changelog.json"),
            r#"{"2025-01-01T00:00:00": {"added": [], "changed": ["old"], "removed": []}}"#,
        )
        .unwrap();
        let store = store(dir.path());

        store
            .record("2026-10-18T09:00:00Z", &record("new"))
            .await
            .unwrap();

        let history = store.history().unwrap();
        assert_eq!(history["2025-01-01T00:00:00"].changed, vec!["old".to_string()]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    #[traced_test]
    fn unreadable_entries_are_skipped_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("changelog.json"),
            r#"{
                "2025-01-01T00:00:00": {"added": ["kept"]},
                "2025-02-01T00:00:00": "hand-written note",
                "2025-03-01T00:00:00": {"changed": [42]}
            }"#,
        )
        .unwrap();

        let history = store(dir.path()).history().unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history["2025-01-01T00:00:00"].added, vec!["kept".to_string()]);
        assert!(logs_contain("skipping unreadable history entry"));
    }

    #[tokio::test]
    async fn rejects_corrupt_history() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("changelog.json"), "[not, json").unwrap();

        let result = store(dir.path()).record("t", &record("x")).await;

        assert!(matches!(result, Err(AppError::Persistence(_))));
    }

    #[tokio::test]
    async fn appends_markdown_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.append_summary("t1", "- one\n").await.unwrap();
        store.append_summary("t2", "- two").await.unwrap();

        let markdown = fs::read_to_string(dir.path().join("changelog.md")).unwrap();
        assert_eq!(markdown, "## t1\n\n- one\n\n## t2\n\n- two\n\n");
    }
}
