//! Job runner: polls the queue and dispatches to kind-specific handlers.

use crate::{Job, Store};
use async_trait::async_trait;
use chrono::Utc;
use promptpipe_core::{config::JobsConfig, PromptPipeError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Handler for one job kind.
///
/// Handlers must be idempotent: re-running a completed job must not
/// duplicate user-visible side effects.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), PromptPipeError>;
}

/// Polls for due jobs and runs their handlers.
pub struct JobRunner {
    store: Store,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    lease: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl JobRunner {
    pub fn new(store: Store, config: &JobsConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            lease: Duration::from_secs(config.claim_lease_secs),
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
        }
    }

    /// Register the handler for a job kind. Last registration wins.
    pub fn register(&mut self, kind: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.to_string(), handler);
    }

    /// One poll iteration: requeue lapsed claims, claim due jobs, dispatch.
    /// Returns the number of jobs dispatched.
    pub async fn run_once(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<usize, PromptPipeError> {
        let stale = self.store.requeue_stale_jobs(now).await?;
        if stale > 0 {
            warn!(count = stale, "requeued stale job claims");
        }

        let jobs = self
            .store
            .claim_due_jobs(now, self.batch_size, self.lease)
            .await?;
        let count = jobs.len();

        let mut tasks = tokio::task::JoinSet::new();
        for job in jobs {
            let store = self.store.clone();
            let handler = self.handlers.get(&job.kind).cloned();
            let max_attempts = self.max_attempts;
            tasks.spawn(async move {
                let Some(handler) = handler else {
                    warn!(kind = %job.kind, id = job.id, "no handler for job kind");
                    let _ = store
                        .fail_job(job.id, "no handler registered", Utc::now(), max_attempts)
                        .await;
                    return;
                };

                debug!(kind = %job.kind, id = job.id, attempt = job.attempt, "running job");
                match handler.handle(&job).await {
                    Ok(()) => {
                        if let Err(e) = store.complete_job(job.id).await {
                            error!(id = job.id, "failed to complete job: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(kind = %job.kind, id = job.id, "job failed: {e}");
                        if let Err(e) = store
                            .fail_job(job.id, &e.to_string(), Utc::now(), max_attempts)
                            .await
                        {
                            error!(id = job.id, "failed to record job failure: {e}");
                        }
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        Ok(count)
    }

    /// Run the poll loop until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                error!("job runner poll failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), PromptPipeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn handle(&self, _job: &Job) -> Result<(), PromptPipeError> {
            Err(PromptPipeError::Llm("transient".into()))
        }
    }

    fn runner_config() -> JobsConfig {
        JobsConfig::default()
    }

    #[tokio::test]
    async fn test_run_once_dispatches_and_completes() {
        let store = test_store().await;
        let now = Utc::now();
        let (id, _) = store
            .enqueue_job("state_transition", now, "{}", None)
            .await
            .unwrap();

        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let mut runner = JobRunner::new(store.clone(), &runner_config());
        runner.register("state_transition", handler.clone());

        let n = runner.run_once(now).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, "completed");

        // Nothing left to run.
        assert_eq!(runner.run_once(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_job_is_requeued_with_error() {
        let store = test_store().await;
        let now = Utc::now();
        let (id, _) = store.enqueue_job("feedback_timeout", now, "{}", None).await.unwrap();

        let mut runner = JobRunner::new(store.clone(), &runner_config());
        runner.register("feedback_timeout", Arc::new(FailingHandler));

        runner.run_once(now).await.unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, "queued");
        assert_eq!(job.attempt, 1);
        assert!(job.last_error.as_deref().unwrap().contains("transient"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_failed() {
        let store = test_store().await;
        let now = Utc::now();
        let (id, _) = store.enqueue_job("mystery", now, "{}", None).await.unwrap();

        let runner = JobRunner::new(store.clone(), &runner_config());
        runner.run_once(now).await.unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.attempt, 1);
        assert_eq!(job.last_error.as_deref(), Some("no handler registered"));
    }
}
