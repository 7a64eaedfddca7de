//! Batch executor: resumable, checkpointed prompt runs.

use tracing::info;

use whipper_chat::ConversationThread;
use whipper_core::{Error, Result};
use whipper_store::{PromptDefinition, PromptRegistry, ResultRow, ResultStore};

use crate::classify::{compose_prompt, looks_like_row, no_explanation_prompt};
use crate::observer::{percent, BatchObserver};
use crate::submit::{submit, ChatBackend, RetryPolicy};
use crate::types::*;

/// Runs prompts from the registry against a chat backend, one row at a time.
pub struct BatchExecutor<'a> {
    registry: &'a PromptRegistry,
    results: &'a ResultStore,
    policy: RetryPolicy,
    observer: &'a dyn BatchObserver,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        registry: &'a PromptRegistry,
        results: &'a ResultStore,
        policy: RetryPolicy,
        observer: &'a dyn BatchObserver,
    ) -> Self {
        Self {
            registry,
            results,
            policy,
            observer,
        }
    }

    /// Execute `request` on `backend`.
    ///
    /// The prompt must match exactly one registry entry and the target column
    /// must exist; both are checked before anything is submitted or written.
    pub async fn run<B: ChatBackend + ?Sized>(
        &self,
        backend: &mut B,
        request: &RunRequest,
    ) -> Result<RunSummary> {
        let prompt = self.registry.find_unique(&request.prompt_id)?;
        let inputs = match &request.inputs {
            Some(table) => {
                let field = request.target_field.as_deref().ok_or_else(|| {
                    Error::InvalidInput("An input table needs a target column".into())
                })?;
                Some(table.column(field).ok_or_else(|| {
                    Error::InvalidInput(format!("Input table has no column '{}'", field))
                })?)
            }
            None => None,
        };

        if prompt.template.is_empty() {
            self.observer.on_notice(&Notice::EmptyTemplate {
                prompt_id: prompt.id.clone(),
            });
        }

        let mut rows = self.results.load(&prompt.id)?;
        let mut thread = ConversationThread::from_parts(
            prompt.conversation_id.clone(),
            prompt.parent_message_id.clone(),
        );
        if thread.conversation_id.is_none() {
            backend.new_conversation();
        }

        if request.redo_flagged {
            return self.redo_flagged(backend, &prompt, &mut rows, thread).await;
        }

        let resumed_from = rows.len();
        let (mode, pending, total) = match &inputs {
            Some(inputs) => {
                if resumed_from > 0 && resumed_from < inputs.len() {
                    self.observer.on_notice(&Notice::Resuming {
                        from: resumed_from,
                        total: inputs.len(),
                    });
                }
                let pending: Vec<String> = inputs.iter().skip(resumed_from).cloned().collect();
                (RunMode::Batch, pending, inputs.len())
            }
            None => (RunMode::SingleShot, vec![String::new()], 1),
        };
        let mut done = if mode == RunMode::Batch { resumed_from } else { 0 };

        info!(
            "Running prompt {}: {} pending of {} ({:?})",
            prompt.id,
            pending.len(),
            total,
            mode
        );
        self.observer.on_progress(percent(done, total));

        for input in &pending {
            let row_index = rows.len();
            let reply = submit(
                backend,
                &compose_prompt(&prompt.template, input),
                &thread.as_override(),
                &self.policy,
                self.observer,
            )
            .await?;
            thread = reply.thread;
            let mut text = reply.text;

            if request.retry_classifier && !looks_like_row(&text) {
                self.observer.on_notice(&Notice::Reformatting { row: row_index });
                let again = submit(
                    backend,
                    &no_explanation_prompt(input),
                    &thread.as_override(),
                    &self.policy,
                    self.observer,
                )
                .await?;
                thread = again.thread;
                text = again.text;
            }

            rows.push(ResultRow::new(input.clone(), text));
            self.checkpoint(&prompt.id, &rows, &thread)?;
            done += 1;
            self.observer.on_progress(percent(done, total));
        }

        Ok(RunSummary {
            prompt_id: prompt.id,
            mode,
            processed: pending.len(),
            resumed_from: if mode == RunMode::Batch { resumed_from } else { 0 },
            total,
        })
    }

    /// Persist the rows and the thread they were answered on, so a run that
    /// fails later resumes in the same conversation.
    fn checkpoint(
        &self,
        prompt_id: &str,
        rows: &[ResultRow],
        thread: &ConversationThread,
    ) -> Result<()> {
        self.results.save(prompt_id, rows)?;
        self.registry.update_thread(
            prompt_id,
            thread.conversation_id.clone(),
            Some(thread.parent_message_id.clone()),
        )?;
        Ok(())
    }

    /// Resubmit each flagged row in place. The registry thread is left as is.
    async fn redo_flagged<B: ChatBackend + ?Sized>(
        &self,
        backend: &mut B,
        prompt: &PromptDefinition,
        rows: &mut [ResultRow],
        mut thread: ConversationThread,
    ) -> Result<RunSummary> {
        let flagged: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.flagged)
            .map(|(i, _)| i)
            .collect();
        if flagged.is_empty() {
            self.observer.on_notice(&Notice::NoFlaggedRows);
        }
        info!("Redoing {} flagged rows of prompt {}", flagged.len(), prompt.id);

        for (done, &index) in flagged.iter().enumerate() {
            self.observer.on_progress(percent(done, flagged.len()));
            let reply = submit(
                backend,
                &compose_prompt(&prompt.template, &rows[index].input),
                &thread.as_override(),
                &self.policy,
                self.observer,
            )
            .await?;
            thread = reply.thread;
            rows[index].result = reply.text;
            self.results.save(&prompt.id, rows)?;
        }
        self.observer.on_progress(100);

        Ok(RunSummary {
            prompt_id: prompt.id.clone(),
            mode: RunMode::RedoFlagged,
            processed: flagged.len(),
            resumed_from: 0,
            total: flagged.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::testing::{RecordingObserver, ScriptedBackend};
    use serde_json::json;
    use std::time::Duration;
    use whipper_store::InputTable;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: PromptRegistry,
        results: ResultStore,
        observer: RecordingObserver,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let registry = PromptRegistry::new(&dir.path().join("prompts.json"));
            let results = ResultStore::new(&dir.path().join("results"));
            Self {
                _dir: dir,
                registry,
                results,
                observer: RecordingObserver::default(),
            }
        }

        fn executor(&self) -> BatchExecutor<'_> {
            let policy = RetryPolicy {
                backoff: Duration::from_millis(1),
                max_attempts: 3,
            };
            BatchExecutor::new(&self.registry, &self.results, policy, &self.observer)
        }
    }

    fn table(values: &[&str]) -> InputTable {
        let rows: Vec<serde_json::Value> = values.iter().map(|v| json!({"text": v})).collect();
        serde_json::from_value(json!({ "rows": rows })).unwrap()
    }

    fn batch(prompt_id: &str, values: &[&str]) -> RunRequest {
        RunRequest {
            prompt_id: prompt_id.into(),
            inputs: Some(table(values)),
            target_field: Some("text".into()),
            ..RunRequest::default()
        }
    }

    #[tokio::test]
    async fn test_resume_skips_cached_rows() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Classify: ", "").unwrap();
        fx.results
            .save(&prompt.id, &[ResultRow::new("cat", "cached")])
            .unwrap();

        let mut backend = ScriptedBackend::answering("animal");
        let summary = fx
            .executor()
            .run(&mut backend, &batch(&prompt.id, &["cat", "dog", "cow"]))
            .await
            .unwrap();

        assert_eq!(summary.resumed_from, 1);
        assert_eq!(summary.processed, 2);
        assert_eq!(
            backend.prompts,
            vec!["Classify: \n\t\tdog", "Classify: \n\t\tcow"]
        );
        let rows = fx.results.load(&prompt.id).unwrap();
        assert_eq!(rows[0].result, "cached");
        assert_eq!(rows.len(), 3);
        assert!(fx
            .observer
            .notices
            .lock()
            .contains(&Notice::Resuming { from: 1, total: 3 }));
    }

    #[tokio::test]
    async fn test_thread_threads_through_rows_and_registry() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Q", "").unwrap();
        fx.registry
            .update_thread(&prompt.id, Some("conv-0".into()), Some("msg-0".into()))
            .unwrap();

        let mut backend = ScriptedBackend::answering("a");
        fx.executor()
            .run(&mut backend, &batch(&prompt.id, &["x", "y"]))
            .await
            .unwrap();

        assert_eq!(backend.new_conversations, 0);
        assert_eq!(backend.overrides[0].conversation_id.as_deref(), Some("conv-0"));
        assert_eq!(backend.overrides[0].parent_message_id.as_deref(), Some("msg-0"));
        assert_eq!(backend.overrides[1].parent_message_id.as_deref(), Some("msg-1"));

        let stored = fx.registry.find_unique(&prompt.id).unwrap();
        assert_eq!(stored.conversation_id.as_deref(), Some("conv-scripted"));
        assert_eq!(stored.parent_message_id.as_deref(), Some("msg-2"));
    }

    #[tokio::test]
    async fn test_failed_run_resumes_in_same_conversation() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Q", "").unwrap();

        let mut backend = ScriptedBackend::failing().then(Ok(Some("first".into())));
        let err = fx
            .executor()
            .run(&mut backend, &batch(&prompt.id, &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3 }));
        assert_eq!(fx.results.load(&prompt.id).unwrap().len(), 1);

        let stored = fx.registry.find_unique(&prompt.id).unwrap();
        assert_eq!(stored.conversation_id.as_deref(), Some("conv-scripted"));
        assert_eq!(stored.parent_message_id.as_deref(), Some("msg-1"));

        let mut backend = ScriptedBackend::answering("second");
        fx.executor()
            .run(&mut backend, &batch(&prompt.id, &["a", "b"]))
            .await
            .unwrap();
        assert_eq!(backend.new_conversations, 0);
        assert_eq!(backend.prompts, vec!["Q\n\t\tb"]);
        assert_eq!(backend.overrides[0].conversation_id.as_deref(), Some("conv-scripted"));
        assert_eq!(backend.overrides[0].parent_message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn test_fresh_prompt_starts_new_conversation() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Q", "").unwrap();
        let mut backend = ScriptedBackend::answering("a");
        fx.executor()
            .run(&mut backend, &batch(&prompt.id, &["x"]))
            .await
            .unwrap();
        assert_eq!(backend.new_conversations, 1);
        assert!(backend.overrides[0].conversation_id.is_none());
    }

    #[tokio::test]
    async fn test_single_shot_without_inputs() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Write a haiku", "").unwrap();
        fx.results
            .save(&prompt.id, &[ResultRow::new("", "earlier haiku")])
            .unwrap();

        let mut backend = ScriptedBackend::answering("new haiku");
        let summary = fx
            .executor()
            .run(
                &mut backend,
                &RunRequest {
                    prompt_id: prompt.id.clone(),
                    ..RunRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.mode, RunMode::SingleShot);
        assert_eq!(backend.prompts, vec!["Write a haiku\n\t\t"]);
        assert_eq!(fx.results.load(&prompt.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_classifier_resubmits_once() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Row: ", "").unwrap();

        let mut backend = ScriptedBackend::answering("cat,animal")
            .then(Ok(Some("Sure! Here is \"the row".into())));
        let request = RunRequest {
            retry_classifier: true,
            ..batch(&prompt.id, &["cat"])
        };
        fx.executor().run(&mut backend, &request).await.unwrap();

        assert_eq!(
            backend.prompts,
            vec![
                "Row: \n\t\tcat".to_string(),
                "Do not include any explanation in your reply, please redo the \n\t\tcat.".to_string(),
            ]
        );
        assert_eq!(fx.results.load(&prompt.id).unwrap()[0].result, "cat,animal");
    }

    #[tokio::test]
    async fn test_redo_flagged_overwrites_in_place() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Classify: ", "").unwrap();
        let mut wrong = ResultRow::new("dog", "plant");
        wrong.flagged = true;
        wrong.comment = "not a plant".into();
        fx.results
            .save(
                &prompt.id,
                &[ResultRow::new("cat", "animal"), wrong, ResultRow::new("oak", "plant")],
            )
            .unwrap();
        let before = fx.registry.find_unique(&prompt.id).unwrap();

        let mut backend = ScriptedBackend::answering("animal");
        let request = RunRequest {
            prompt_id: prompt.id.clone(),
            redo_flagged: true,
            ..RunRequest::default()
        };
        let summary = fx.executor().run(&mut backend, &request).await.unwrap();

        assert_eq!(summary.mode, RunMode::RedoFlagged);
        assert_eq!(summary.processed, 1);
        assert_eq!(backend.prompts, vec!["Classify: \n\t\tdog"]);

        let rows = fx.results.load(&prompt.id).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].result, "animal");
        assert!(rows[1].flagged);
        assert_eq!(rows[1].comment, "not a plant");
        assert_eq!(fx.registry.find_unique(&prompt.id).unwrap(), before);
        assert_eq!(fx.observer.progress.lock().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_missing_column_writes_nothing() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("Q", "").unwrap();
        let mut backend = ScriptedBackend::answering("a");
        let request = RunRequest {
            target_field: Some("nope".into()),
            ..batch(&prompt.id, &["x"])
        };

        let err = fx.executor().run(&mut backend, &request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(backend.prompts.is_empty());
        assert!(fx.results.list().is_empty());
    }

    #[tokio::test]
    async fn test_empty_template_notice_and_continue() {
        let fx = Fixture::new();
        let prompt = fx.registry.add("", "").unwrap();
        let mut backend = ScriptedBackend::answering("ok");
        fx.executor()
            .run(&mut backend, &batch(&prompt.id, &["x"]))
            .await
            .unwrap();

        assert!(matches!(
            fx.observer.notices.lock().first(),
            Some(Notice::EmptyTemplate { .. })
        ));
        assert_eq!(fx.results.load(&prompt.id).unwrap().len(), 1);
    }
}
