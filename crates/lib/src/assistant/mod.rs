//! Assistant-service boundary: hosted threads, runs, and retrieval-grounded replies.
//!
//! `AssistantService` is the seam between the relay pipeline and the remote
//! service, so tests can stub the per-message lifecycle (thread, message, run,
//! reply). The HTTP client implementing it lives in `client`.

mod client;

pub use client::{
    AssistantClient, AssistantError, MessageContent, MessageText, Run, RunStatus, ThreadMessage,
};

use async_trait::async_trait;

/// Per-message operations against the assistant service. One implementor: the
/// HTTP client; tests provide stubs.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Create a fresh conversation thread; returns its id.
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Add a user message to the thread, optionally attaching the knowledge document.
    async fn add_user_message(
        &self,
        thread_id: &str,
        text: &str,
        attach_file_id: Option<&str>,
    ) -> Result<String, AssistantError>;

    /// Start a run of the assistant against the thread, with an optional instruction override.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run, AssistantError>;

    /// Re-read a run's current status.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// List the thread's messages, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError>;
}
