//! Assistants API client (https://api.openai.com/v1 by default).
//!
//! Covers exactly the resources the bot touches: file upload, assistant
//! persona, conversation threads, user messages, runs, and message listing.
//! Beta endpoints are versioned via the OpenAI-Beta header.

use crate::assistant::AssistantService;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BETA_HEADER_NAME: &str = "OpenAI-Beta";
const BETA_HEADER_VALUE: &str = "assistants=v2";

/// Client for the hosted assistant service.
#[derive(Clone)]
pub struct AssistantClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("assistant api error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl AssistantError {
    /// Worth retrying with backoff: transport failures, rate limits, server errors.
    /// Everything else (auth, validation) is a permanent rejection.
    pub fn is_transient(&self) -> bool {
        match self {
            AssistantError::Request(_) => true,
            AssistantError::Api { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Status of an asynchronous run. `queued` and `in_progress` are the pending
/// states; anything else is terminal. Unknown wire values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Other(String),
}

impl RunStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Other(s) => s,
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "expired" => RunStatus::Expired,
            other => RunStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RunStatus::from_wire(&s))
    }
}

/// A run resource: id plus its status field (the only parts the relay reads).
#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

/// One message in a thread. Content is a list of typed blocks; only text
/// blocks carry the reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// First text block's value, if any.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find_map(|c| c.text.as_ref())
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageText {
    pub value: String,
}

impl AssistantClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn beta(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header(BETA_HEADER_NAME, BETA_HEADER_VALUE)
    }

    /// POST /files — multipart upload of the knowledge document (purpose "assistants").
    /// Returns the file id.
    pub async fn upload_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AssistantError> {
        let url = format!("{}/files", self.base_url);
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let res = check_status(res).await?;
        let data: FileObject = res.json().await?;
        Ok(data.id)
    }

    /// POST /assistants — register the persona: model, name, instructions, file_search.
    /// Returns the assistant id.
    pub async fn create_assistant(
        &self,
        model: &str,
        name: &str,
        instructions: &str,
    ) -> Result<String, AssistantError> {
        let url = format!("{}/assistants", self.base_url);
        let body = CreateAssistantRequest {
            model: model.to_string(),
            name: name.to_string(),
            instructions: instructions.to_string(),
            tools: vec![Tool::file_search()],
        };
        let res = self.beta(self.client.post(&url)).json(&body).send().await?;
        let res = check_status(res).await?;
        let data: AssistantObject = res.json().await?;
        Ok(data.id)
    }
}

#[async_trait]
impl AssistantService for AssistantClient {
    /// POST /threads — fresh conversation thread.
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let url = format!("{}/threads", self.base_url);
        let res = self
            .beta(self.client.post(&url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let res = check_status(res).await?;
        let data: ThreadObject = res.json().await?;
        Ok(data.id)
    }

    /// POST /threads/{id}/messages — user message, optionally with the knowledge attachment.
    async fn add_user_message(
        &self,
        thread_id: &str,
        text: &str,
        attach_file_id: Option<&str>,
    ) -> Result<String, AssistantError> {
        let url = format!("{}/threads/{}/messages", self.base_url, thread_id);
        let body = CreateMessageRequest {
            role: "user".to_string(),
            content: text.to_string(),
            attachments: attach_file_id.map(|id| {
                vec![Attachment {
                    file_id: id.to_string(),
                    tools: vec![Tool::file_search()],
                }]
            }),
        };
        let res = self.beta(self.client.post(&url)).json(&body).send().await?;
        let res = check_status(res).await?;
        let data: MessageObject = res.json().await?;
        Ok(data.id)
    }

    /// POST /threads/{id}/runs — start the assistant against the thread.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run, AssistantError> {
        let url = format!("{}/threads/{}/runs", self.base_url, thread_id);
        let body = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
            instructions: instructions.map(|s| s.to_string()),
        };
        let res = self.beta(self.client.post(&url)).json(&body).send().await?;
        let res = check_status(res).await?;
        let data: Run = res.json().await?;
        Ok(data)
    }

    /// GET /threads/{id}/runs/{run_id} — current run status.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let url = format!("{}/threads/{}/runs/{}", self.base_url, thread_id, run_id);
        let res = self.beta(self.client.get(&url)).send().await?;
        let res = check_status(res).await?;
        let data: Run = res.json().await?;
        Ok(data)
    }

    /// GET /threads/{id}/messages — newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        let url = format!("{}/threads/{}/messages", self.base_url, thread_id);
        let res = self
            .beta(self.client.get(&url))
            .query(&[("order", "desc")])
            .send()
            .await?;
        let res = check_status(res).await?;
        let data: ListMessagesResponse = res.json().await?;
        Ok(data.data)
    }
}

/// Consume the response, returning it when successful or a structured API error.
/// The service wraps errors in an envelope; fall back to the raw body when it doesn't parse.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => env.error.message,
        Err(_) => body,
    };
    Err(AssistantError::Api {
        status: status.as_u16(),
        message,
    })
}

// Wire types below are private to this module; callers see ids, Run, and ThreadMessage.

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    typ: String,
}

impl Tool {
    fn file_search() -> Self {
        Self {
            typ: "file_search".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest {
    model: String,
    name: String,
    instructions: String,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Attachment {
    file_id: String,
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest {
    assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AssistantObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_pending_states() {
        assert!(RunStatus::Queued.is_pending());
        assert!(RunStatus::InProgress.is_pending());
        assert!(!RunStatus::Completed.is_pending());
        assert!(!RunStatus::Failed.is_pending());
        assert!(!RunStatus::Other("paused".into()).is_pending());
    }

    #[test]
    fn run_status_unknown_value_is_preserved() {
        let run: Run =
            serde_json::from_str(r#"{"id":"run_1","status":"paused"}"#).expect("parse run");
        assert_eq!(run.status, RunStatus::Other("paused".to_string()));
        assert_eq!(run.status.as_str(), "paused");
    }

    #[test]
    fn thread_message_text_takes_first_text_block() {
        let msg: ThreadMessage = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "role": "assistant",
                "content": [
                    {"type": "image_file"},
                    {"type": "text", "text": {"value": "hello", "annotations": []}},
                    {"type": "text", "text": {"value": "second", "annotations": []}}
                ]
            }"#,
        )
        .expect("parse message");
        assert_eq!(msg.text(), Some("hello"));
    }

    #[test]
    fn transient_classification() {
        let rate_limited = AssistantError::Api {
            status: 429,
            message: "slow down".into(),
        };
        let server = AssistantError::Api {
            status: 503,
            message: "overloaded".into(),
        };
        let rejected = AssistantError::Api {
            status: 400,
            message: "bad request".into(),
        };
        let unauthorized = AssistantError::Api {
            status: 401,
            message: "invalid key".into(),
        };
        assert!(rate_limited.is_transient());
        assert!(server.is_transient());
        assert!(!rejected.is_transient());
        assert!(!unauthorized.is_transient());
    }
}
