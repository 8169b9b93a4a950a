//! Message relay: one bounded request-response cycle per user message.
//!
//! Each incoming message gets a fresh remote thread: add the message with the
//! knowledge document attached, start a run, wait for it to leave the pending
//! states, then read back the newest assistant message. Waiting is bounded by
//! a wall-clock budget with exponential backoff between status checks, and
//! transiently failing remote calls are retried a bounded number of times.

use crate::assistant::{AssistantError, AssistantService, Run, RunStatus};
use crate::bootstrap::AssistantProfile;
use crate::config::PollConfig;
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};

/// Outcome of relaying one message that is not a reply. `RunFailed` and
/// `Timeout` are expected terminal outcomes with fixed user-facing replies;
/// `Service` is the remote boundary after retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("assistant run ended as {status}")]
    RunFailed { status: RunStatus },
    #[error("assistant run still pending after {waited_secs}s")]
    Timeout { waited_secs: u64 },
    #[error("assistant run completed without a reply")]
    EmptyReply,
    #[error(transparent)]
    Service(#[from] AssistantError),
}

/// Bounds for waiting on a run: wall-clock budget plus exponential backoff
/// between checks, and the attempt count for transiently failing calls.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_wait: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub retry_attempts: u32,
}

impl PollPolicy {
    pub fn from_config(poll: &PollConfig) -> Self {
        Self {
            max_wait: Duration::from_secs(poll.max_wait_secs),
            initial_interval: Duration::from_millis(poll.initial_interval_ms),
            max_interval: Duration::from_millis(poll.max_interval_ms),
            retry_attempts: poll.retry_attempts.max(1),
        }
    }

    /// Sleep before the nth re-check (0-based): initial interval doubled each
    /// check, capped at the max interval.
    fn interval(&self, check: u32) -> Duration {
        self.initial_interval
            .saturating_mul(2u32.saturating_pow(check.min(16)))
            .min(self.max_interval)
    }
}

/// One relayed exchange: text in, reply text out. The gateway holds this as a
/// trait object so integration tests can swap in a stub.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn relay(&self, text: &str) -> Result<String, RelayError>;
}

/// Relay backed by the assistant service: thread, message, run, bounded poll.
pub struct AssistantMessageRelay<S> {
    service: S,
    profile: AssistantProfile,
    run_instructions: Option<String>,
    policy: PollPolicy,
}

impl<S: AssistantService> AssistantMessageRelay<S> {
    pub fn new(
        service: S,
        profile: AssistantProfile,
        run_instructions: Option<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            service,
            profile,
            run_instructions,
            policy,
        }
    }

    /// Run `op` until it succeeds, retrying transient failures with backoff up
    /// to the policy's attempt count. Permanent rejections are returned after
    /// the first attempt.
    async fn with_retry<T, F, Fut>(&self, what: &str, tag: &str, mut op: F) -> Result<T, AssistantError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AssistantError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.policy.retry_attempts => {
                    let delay = self.policy.interval(attempt - 1);
                    log::warn!(
                        "[{}] {} failed transiently (attempt {}): {}; retrying in {:?}",
                        tag,
                        what,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait until the run leaves the pending states. Completed is success; any
    /// other terminal status is `RunFailed`. A run already terminal when
    /// created is never polled. The wall-clock budget turns a stalled run into
    /// `Timeout` instead of polling forever.
    async fn wait_for_completion(
        &self,
        tag: &str,
        thread_id: &str,
        run: Run,
    ) -> Result<(), RelayError> {
        let started = Instant::now();
        let mut status = run.status;
        let mut checks: u32 = 0;
        loop {
            if status == RunStatus::Completed {
                log::debug!("[{}] run {} completed after {} checks", tag, run.id, checks);
                return Ok(());
            }
            if !status.is_pending() {
                log::warn!("[{}] run {} ended as {}", tag, run.id, status);
                return Err(RelayError::RunFailed { status });
            }
            if started.elapsed() >= self.policy.max_wait {
                return Err(RelayError::Timeout {
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.policy.interval(checks)).await;
            status = self
                .with_retry("poll run", tag, || {
                    self.service.retrieve_run(thread_id, &run.id)
                })
                .await?
                .status;
            checks += 1;
        }
    }

    /// Newest assistant message's text. The listing is newest first, so the
    /// first assistant-role entry is the reply to the message just relayed.
    async fn fetch_reply(&self, tag: &str, thread_id: &str) -> Result<String, RelayError> {
        let messages = self
            .with_retry("list messages", tag, || self.service.list_messages(thread_id))
            .await?;
        messages
            .iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| m.text())
            .filter(|t| !t.trim().is_empty())
            .map(|t| t.to_string())
            .ok_or(RelayError::EmptyReply)
    }
}

#[async_trait]
impl<S: AssistantService> MessageRelay for AssistantMessageRelay<S> {
    async fn relay(&self, text: &str) -> Result<String, RelayError> {
        // Short correlation id so one message can be traced through the
        // thread/run/poll log lines.
        let tag = uuid::Uuid::new_v4().to_string()[..8].to_string();

        let thread_id = self
            .with_retry("create thread", &tag, || self.service.create_thread())
            .await?;
        log::debug!("[{}] thread {} created", tag, thread_id);

        self.with_retry("add message", &tag, || {
            self.service
                .add_user_message(&thread_id, text, Some(&self.profile.knowledge_file_id))
        })
        .await?;

        let run = self
            .with_retry("start run", &tag, || {
                self.service.create_run(
                    &thread_id,
                    &self.profile.assistant_id,
                    self.run_instructions.as_deref(),
                )
            })
            .await?;
        log::debug!("[{}] run {} started on thread {}", tag, run.id, thread_id);

        self.wait_for_completion(&tag, &thread_id, run).await?;
        self.fetch_reply(&tag, &thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_ms(initial: u64, max: u64) -> PollPolicy {
        PollPolicy {
            max_wait: Duration::from_secs(60),
            initial_interval: Duration::from_millis(initial),
            max_interval: Duration::from_millis(max),
            retry_attempts: 3,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy_ms(500, 8000);
        assert_eq!(p.interval(0), Duration::from_millis(500));
        assert_eq!(p.interval(1), Duration::from_millis(1000));
        assert_eq!(p.interval(2), Duration::from_millis(2000));
        assert_eq!(p.interval(4), Duration::from_millis(8000));
        assert_eq!(p.interval(10), Duration::from_millis(8000));
        assert_eq!(p.interval(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn policy_from_config_floors_attempts_at_one() {
        let mut poll = crate::config::PollConfig::default();
        poll.retry_attempts = 0;
        let p = PollPolicy::from_config(&poll);
        assert_eq!(p.retry_attempts, 1);
        assert_eq!(p.max_wait, Duration::from_secs(120));
    }
}
