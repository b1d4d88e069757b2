use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::domain::changelog::{
    ChangeRecord, CompletionStatus, MalformedOutput, ModelResponse, extract_record,
};
use crate::domain::diff::DiffChunker;
use crate::domain::prompt::{changelog_prompt, summary_prompt};
use crate::error::AppResult;
use crate::services::LanguageModelService;
use crate::services::version_control::RevisionRange;

const EMPTY_RECORD_JSON: &str = r#"{"added": [], "changed": [], "removed": []}"#;

/// Shared switch that stops a run from issuing further model calls.
#[derive(Clone)]
pub struct CancellationFlag(Arc<watch::Sender<bool>>);

impl CancellationFlag {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self(Arc::new(sender))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    pub async fn cancelled(&self) {
        let mut receiver = self.0.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-chunk problem that was absorbed instead of failing the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIssue {
    Malformed {
        index: usize,
        reason: MalformedOutput,
    },
    Incomplete {
        index: usize,
        status: CompletionStatus,
    },
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOutcome {
    pub record: ChangeRecord,
    pub issues: Vec<ChunkIssue>,
    pub cancelled: bool,
}

impl AggregateOutcome {
    fn absorb(&mut self, index: usize, response: &ModelResponse) {
        if !response.status.is_natural() {
            warn!(
                chunk = index,
                bytes = response.chunk.len(),
                status = %response.status,
                "model did not stop itself; the summary for this chunk may be truncated"
            );
            self.issues.push(ChunkIssue::Incomplete {
                index,
                status: response.status.clone(),
            });
        }

        match extract_record(&response.text) {
            Ok(record) => self.record.merge(record),
            Err(reason) => {
                warn!(chunk = index, %reason, "skipping chunk with unusable model output");
                self.issues.push(ChunkIssue::Malformed { index, reason });
            }
        }
    }
}

/// Folds already collected responses, in order, into one outcome.
pub fn fold_responses(responses: impl IntoIterator<Item = ModelResponse>) -> AggregateOutcome {
    let mut outcome = AggregateOutcome::default();
    for (index, response) in responses.into_iter().enumerate() {
        outcome.absorb(index, &response);
    }
    outcome
}

pub struct ChangelogAggregator<'a> {
    model: &'a dyn LanguageModelService,
    max_output_tokens: u32,
    min_diff_length: usize,
}

impl<'a> ChangelogAggregator<'a> {
    pub fn new(
        model: &'a dyn LanguageModelService,
        max_output_tokens: u32,
        min_diff_length: usize,
    ) -> Self {
        Self {
            model,
            max_output_tokens,
            min_diff_length,
        }
    }

    /// Calls the model once per chunk, in order. Transport failures abort the
    /// run; unusable replies are recorded as issues and skipped.
    pub async fn aggregate(
        &self,
        chunks: &[String],
        cancel: &CancellationFlag,
    ) -> AppResult<AggregateOutcome> {
        let mut responses = Vec::with_capacity(chunks.len());
        let mut cancelled = false;

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            debug!(chunk = index, bytes = chunk.len(), "summarizing chunk");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                response = self.summarize(chunk) => response?,
            };
            responses.push(response);
        }

        if cancelled {
            warn!(
                processed = responses.len(),
                total = chunks.len(),
                "changelog generation cancelled; remaining chunks were not summarized"
            );
        }

        let mut outcome = fold_responses(responses);
        outcome.cancelled = cancelled;
        Ok(outcome)
    }

    async fn summarize(&self, chunk: &str) -> AppResult<ModelResponse> {
        if chunk.len() < self.min_diff_length {
            debug!(bytes = chunk.len(), "chunk too short for a model call");
            return Ok(ModelResponse {
                chunk: chunk.to_string(),
                text: EMPTY_RECORD_JSON.to_string(),
                status: CompletionStatus::Stop,
            });
        }

        let completion = self
            .model
            .complete(&changelog_prompt(chunk), self.max_output_tokens)
            .await?;
        Ok(ModelResponse {
            chunk: chunk.to_string(),
            text: completion.text,
            status: completion.status,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangelogRequest {
    pub range: RevisionRange,
    pub persist: bool,
    /// Ask the model for the markdown summary instead of rendering it locally.
    pub model_summary: bool,
}

#[derive(Debug, Clone)]
pub struct ChangelogRun {
    pub timestamp: String,
    pub record: ChangeRecord,
    pub summary: String,
    pub chunk_count: usize,
    pub issues: Vec<ChunkIssue>,
    pub cancelled: bool,
}

pub async fn generate_changelog(
    ctx: &AppContext,
    request: ChangelogRequest,
    cancel: &CancellationFlag,
) -> AppResult<ChangelogRun> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let diff = ctx.version_control.diff(&request.range).await?;
    info!(
        from = %request.range.from,
        to = %request.range.to,
        bytes = diff.len(),
        files = diff.file_count(),
        "loaded diff"
    );

    let chunker = DiffChunker::new(ctx.config.max_chunk_length)?;
    let chunks = if diff.is_blank() {
        info!("diff is blank; nothing to summarize");
        Vec::new()
    } else {
        chunker.split(diff.as_str())
    };
    info!(
        chunks = chunks.len(),
        max_length = chunker.max_length(),
        "split diff"
    );

    let aggregator = ChangelogAggregator::new(
        ctx.language_model.as_ref(),
        ctx.config.max_output_tokens,
        ctx.config.min_diff_length,
    );
    let mut outcome = aggregator.aggregate(&chunks, cancel).await?;
    if cancel.is_cancelled() {
        outcome.cancelled = true;
    }

    let summary = if request.model_summary && !outcome.cancelled && !outcome.record.is_empty() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                outcome.record.to_markdown()
            }
            summary = summarize_record(ctx, &outcome.record) => summary?,
        }
    } else {
        outcome.record.to_markdown()
    };
    if cancel.is_cancelled() {
        outcome.cancelled = true;
    }
    if outcome.cancelled {
        warn!("changelog generation cancelled; nothing will be saved");
    }

    if request.persist && !outcome.cancelled {
        ctx.changelog_store.record(&timestamp, &outcome.record).await?;
        ctx.changelog_store
            .append_summary(&timestamp, &summary)
            .await?;
        info!(
            history = %ctx.config.history_file.display(),
            summary = %ctx.config.summary_file.display(),
            "saved changelog"
        );
    }

    Ok(ChangelogRun {
        timestamp,
        record: outcome.record,
        summary,
        chunk_count: chunks.len(),
        issues: outcome.issues,
        cancelled: outcome.cancelled,
    })
}

async fn summarize_record(ctx: &AppContext, record: &ChangeRecord) -> AppResult<String> {
    let completion = ctx
        .language_model
        .complete(&summary_prompt(record), ctx.config.max_output_tokens)
        .await?;
    if !completion.status.is_natural() {
        warn!(status = %completion.status, "model did not stop itself while summarizing");
    }

    let text = completion.text.trim();
    if text.is_empty() {
        warn!("model returned an empty summary; rendering it locally");
        return Ok(record.to_markdown());
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::{AppConfig, EnvOverrides, StoredConfig};
    use crate::domain::diff::DiffText;
    use crate::error::AppError;
    use crate::services::{
        ChangelogStore, Completion, LanguageModelService, VersionControlService,
    };
    struct ScriptedModel {
        replies: Mutex<VecDeque<AppResult<Completion>>>,
        prompts: Mutex<Vec<String>>,
        /// Raised while answering the call with this index.
        cancel_on_call: Option<(usize, CancellationFlag)>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<AppResult<Completion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                cancel_on_call: None,
            }
        }

        fn cancelling_on_call(mut self, call: usize, cancel: &CancellationFlag) -> Self {
            self.cancel_on_call = Some((call, cancel.clone()));
            self
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModelService for ScriptedModel {
        async fn complete(&self, prompt: &str, _max_output_tokens: u32) -> AppResult<Completion> {
            let call = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len() - 1
            };
            if let Some((target, cancel)) = &self.cancel_on_call {
                if *target == call {
                    cancel.cancel();
                }
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(stop(EMPTY_RECORD_JSON)))
        }
    }

    /// Never answers; signals `started` once a call is in flight.
    #[derive(Default)]
    struct StalledModel {
        started: Notify,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModelService for StalledModel {
        async fn complete(&self, prompt: &str, _max_output_tokens: u32) -> AppResult<Completion> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.started.notify_one();
            std::future::pending().await
        }
    }

    struct FixedDiff(String);

    #[async_trait]
    impl VersionControlService for FixedDiff {
        async fn diff(&self, _range: &RevisionRange) -> AppResult<DiffText> {
            Ok(DiffText::new(self.0.clone()))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<(String, ChangeRecord)>>,
        summaries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChangelogStore for MemoryStore {
        async fn record(&self, timestamp: &str, record: &ChangeRecord) -> AppResult<()> {
            self.records
                .lock()
                .unwrap()
                .push((timestamp.to_string(), record.clone()));
            Ok(())
        }

        async fn append_summary(&self, _timestamp: &str, summary: &str) -> AppResult<()> {
            self.summaries.lock().unwrap().push(summary.to_string());
            Ok(())
        }
    }

    fn stop(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            status: CompletionStatus::Stop,
        }
    }

    fn response(text: &str) -> ModelResponse {
        ModelResponse {
            chunk: String::new(),
            text: text.to_string(),
            status: CompletionStatus::Stop,
        }
    }

    fn context(
        diff: &str,
        model: Arc<ScriptedModel>,
        store: Arc<MemoryStore>,
        max_chunk_length: usize,
    ) -> AppContext {
        let stored = StoredConfig {
            max_chunk_length: Some(max_chunk_length),
            min_diff_length: Some(0),
            ..StoredConfig::default()
        };
        let config =
            AppConfig::resolve(Path::new("/repo"), stored, EnvOverrides::default()).unwrap();
        AppContext::new(config, Arc::new(FixedDiff(diff.to_string())), model, store)
    }

    fn chunks(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn folding_nothing_yields_an_empty_record() {
        let outcome = fold_responses(Vec::<ModelResponse>::new());
        assert!(outcome.record.is_empty());
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn merges_lists_across_chunks() {
        let outcome = fold_responses(vec![
            response(r#"{"added": ["x in file.py"], "changed": [], "removed": []}"#),
            response(r#"{"added": [], "changed": ["y in file.py"], "removed": []}"#),
        ]);

        assert_eq!(
            outcome.record,
            ChangeRecord {
                added: vec!["x in file.py".to_string()],
                changed: vec!["y in file.py".to_string()],
                removed: vec![],
            }
        );
    }

    #[test]
    fn malformed_chunk_contributes_nothing() {
        let outcome = fold_responses(vec![
            response(r#"{"removed": ["foo.py"]}"#),
            response("Sorry, I cannot help with that."),
        ]);

        assert_eq!(
            outcome.record,
            ChangeRecord {
                added: vec![],
                changed: vec![],
                removed: vec!["foo.py".to_string()],
            }
        );
        assert_eq!(
            outcome.issues,
            vec![ChunkIssue::Malformed {
                index: 1,
                reason: MalformedOutput::NoJsonObject,
            }]
        );
    }

    #[test]
    #[traced_test]
    fn truncated_generation_is_surfaced_as_a_warning() {
        let outcome = fold_responses(vec![ModelResponse {
            chunk: String::new(),
            text: r#"{"added": ["a"]}"#.to_string(),
            status: CompletionStatus::Length,
        }]);

        assert_eq!(outcome.record.added, vec!["a".to_string()]);
        assert_eq!(
            outcome.issues,
            vec![ChunkIssue::Incomplete {
                index: 0,
                status: CompletionStatus::Length,
            }]
        );
        assert!(logs_contain("model did not stop itself"));
    }

    #[tokio::test]
    async fn calls_the_model_once_per_chunk_in_order() {
        let model = ScriptedModel::new(vec![
            Ok(stop(r#"{"added": ["first"]}"#)),
            Ok(stop(r#"{"added": ["second"]}"#)),
        ]);
        let aggregator = ChangelogAggregator::new(&model, 500, 0);

        let outcome = aggregator
            .aggregate(&chunks(&["chunk one", "chunk two"]), &CancellationFlag::new())
            .await
            .unwrap();

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with("chunk one\n"));
        assert!(prompts[1].starts_with("chunk two\n"));
        assert_eq!(
            outcome.record.added,
            vec!["first".to_string(), "second".to_string()]
        );
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn short_chunks_skip_the_model() {
        let model = ScriptedModel::new(vec![]);
        let aggregator = ChangelogAggregator::new(&model, 500, 30);

        let outcome = aggregator
            .aggregate(&chunks(&["tiny"]), &CancellationFlag::new())
            .await
            .unwrap();

        assert!(model.prompts().is_empty());
        assert!(outcome.record.is_empty());
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_run() {
        let model = ScriptedModel::new(vec![
            Ok(stop(r#"{"added": ["first"]}"#)),
            Err(AppError::TransportUnavailable("service unavailable".to_string())),
        ]);
        let aggregator = ChangelogAggregator::new(&model, 500, 0);

        let result = aggregator
            .aggregate(&chunks(&["a", "b", "c"]), &CancellationFlag::new())
            .await;

        assert!(matches!(result, Err(AppError::TransportUnavailable(_))));
        assert_eq!(model.prompts().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_runs_stop_issuing_calls() {
        let model = ScriptedModel::new(vec![]);
        let aggregator = ChangelogAggregator::new(&model, 500, 0);
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let outcome = aggregator
            .aggregate(&chunks(&["a", "b"]), &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn cancelling_an_in_flight_call_stops_the_remaining_chunks() {
        let model = Arc::new(StalledModel::default());
        let cancel = CancellationFlag::new();
        let trigger = cancel.clone();
        let watched = model.clone();
        tokio::spawn(async move {
            watched.started.notified().await;
            trigger.cancel();
        });

        let outcome = ChangelogAggregator::new(model.as_ref(), 500, 0)
            .aggregate(&chunks(&["first chunk", "second chunk"]), &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.record.is_empty());
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    fn full_request() -> ChangelogRequest {
        ChangelogRequest {
            range: RevisionRange::default(),
            persist: true,
            model_summary: true,
        }
    }

    #[tokio::test]
    async fn cancellation_during_the_last_chunk_skips_summary_and_persistence() {
        let cancel = CancellationFlag::new();
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(stop(r#"{"added": ["a in main.rs"]}"#))])
                .cancelling_on_call(0, &cancel),
        );
        let store = Arc::new(MemoryStore::default());
        let ctx = context("diff --git a/main.rs b/main.rs\n+a\n", model.clone(), store.clone(), 2000);

        let run = generate_changelog(&ctx, full_request(), &cancel)
            .await
            .unwrap();

        assert!(run.cancelled);
        assert_eq!(run.record.added, vec!["a in main.rs".to_string()]);
        assert_eq!(model.prompts().len(), 1);
        assert!(store.records.lock().unwrap().is_empty());
        assert!(store.summaries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_the_summary_call_skips_persistence() {
        let cancel = CancellationFlag::new();
        let model = Arc::new(
            ScriptedModel::new(vec![
                Ok(stop(r#"{"added": ["a in main.rs"]}"#)),
                Ok(stop("- Added a")),
            ])
            .cancelling_on_call(1, &cancel),
        );
        let store = Arc::new(MemoryStore::default());
        let ctx = context("diff --git a/main.rs b/main.rs\n+a\n", model.clone(), store.clone(), 2000);

        let run = generate_changelog(&ctx, full_request(), &cancel)
            .await
            .unwrap();

        assert!(run.cancelled);
        assert_eq!(model.prompts().len(), 2);
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generates_and_persists_a_changelog() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(stop(r#"Changelog: {"added": ["history store in history.rs"]}"#)),
            Ok(stop("not json")),
            Ok(stop("- Added a history store")),
        ]));
        let store = Arc::new(MemoryStore::default());
        let diff = format!(
            "diff --git a/history.rs b/history.rs\n{}diff --git a/old.rs b/old.rs\n{}",
            "+line\n".repeat(10),
            "-line\n".repeat(10),
        );
        let ctx = context(&diff, model.clone(), store.clone(), 100);

        let run = generate_changelog(
            &ctx,
            ChangelogRequest {
                range: RevisionRange::default(),
                persist: true,
                model_summary: true,
            },
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.chunk_count, 2);
        assert_eq!(run.record.added, vec!["history store in history.rs".to_string()]);
        assert_eq!(run.summary, "- Added a history store");
        assert_eq!(run.issues.len(), 1);
        assert_eq!(model.prompts().len(), 3);

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, run.timestamp);
        assert_eq!(records[0].1, run.record);
        assert_eq!(
            *store.summaries.lock().unwrap(),
            vec!["- Added a history store".to_string()]
        );
    }

    #[tokio::test]
    async fn local_summary_and_no_persistence() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(stop(
            r#"{"removed": ["legacy flag in main.rs"]}"#,
        ))]));
        let store = Arc::new(MemoryStore::default());
        let ctx = context("diff --git a/main.rs b/main.rs\n-flag\n", model.clone(), store.clone(), 2000);

        let run = generate_changelog(
            &ctx,
            ChangelogRequest {
                range: RevisionRange::default(),
                persist: false,
                model_summary: false,
            },
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.chunk_count, 1);
        assert_eq!(run.summary, "### Removed\n\n- legacy flag in main.rs\n");
        assert_eq!(model.prompts().len(), 1);
        assert!(store.records.lock().unwrap().is_empty());
        assert!(store.summaries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_diff_makes_no_model_calls() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let store = Arc::new(MemoryStore::default());
        let ctx = context("", model.clone(), store.clone(), 2000);

        let run = generate_changelog(
            &ctx,
            ChangelogRequest {
                range: RevisionRange::default(),
                persist: true,
                model_summary: true,
            },
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.chunk_count, 0);
        assert!(run.record.is_empty());
        assert!(model.prompts().is_empty());
        assert_eq!(store.records.lock().unwrap().len(), 1);
    }
}
