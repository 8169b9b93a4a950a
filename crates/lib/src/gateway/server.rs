//! Gateway HTTP listener and inbound message processor.

use crate::channels::{
    ChannelHandle, ChannelRegistry, InboundMessage, TelegramChannel, TelegramUpdate,
};
use crate::config::{self, Config};
use crate::relay::{MessageRelay, RelayError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Explicit start command; `/start@BotName` is the group-chat form.
const START_COMMAND: &str = "/start";

/// Fixed greeting for the start command, sent regardless of prior traffic.
const GREETING: &str = "Hello! I’m Eva, your banking assistant. How can I assist you today?";

/// Fixed reply when a run ends in a non-success terminal status.
const RUN_FAILED_REPLY: &str =
    "I'm sorry, there was an issue processing your request. Please try again.";

/// Reply when a run outlived the polling budget.
const TIMEOUT_REPLY: &str =
    "I'm sorry, this is taking longer than expected. Please try again in a moment.";

/// Reply when the assistant service could not be reached or rejected the exchange.
const SERVICE_REPLY: &str =
    "I'm sorry, I can't reach the assistant service right now. Please try again later.";

/// Shared state for the gateway (config, relay, channels).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub relay: Arc<dyn MessageRelay>,
    pub channel_registry: Arc<ChannelRegistry>,
    /// Sender for inbound channel messages (long-poll loop or webhook POSTs).
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

fn is_start_command(text: &str) -> bool {
    text == START_COMMAND || text.starts_with("/start@")
}

/// Map a relay failure to its fixed user-facing reply.
fn reply_for_error(err: &RelayError) -> &'static str {
    match err {
        RelayError::RunFailed { .. } | RelayError::EmptyReply => RUN_FAILED_REPLY,
        RelayError::Timeout { .. } => TIMEOUT_REPLY,
        RelayError::Service(_) => SERVICE_REPLY,
    }
}

/// Process one inbound channel message: the start command gets the fixed
/// greeting; anything else is relayed to the assistant and answered with the
/// reply or a fixed failure string. One blocking cycle per message.
async fn process_inbound_message(state: &GatewayState, msg: InboundMessage) {
    let trimmed = msg.text.trim();
    let reply = if is_start_command(trimmed) {
        GREETING.to_string()
    } else {
        match state.relay.relay(&msg.text).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("inbound: relay failed: {}", e);
                reply_for_error(&e).to_string()
            }
        }
    };
    let Some(handle) = state.channel_registry.get(&msg.channel_id).await else {
        log::warn!("inbound: no channel registered for {}", msg.channel_id);
        return;
    };
    if let Err(e) = handle.send_message(&msg.conversation_id, &reply).await {
        log::warn!("inbound: send_message failed: {}", e);
    }
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Starts the Telegram connector (long-poll, or webhook when configured) and
/// the inbound processor, then blocks until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config, relay: Arc<dyn MessageRelay>) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let webhook_url = config.channels.telegram.webhook_url.clone();
    if !config::is_loopback_bind(&bind)
        && webhook_url.is_some()
        && config.channels.telegram.webhook_secret.is_none()
    {
        anyhow::bail!(
            "refusing to expose the Telegram webhook on {} without a secret (set channels.telegram.webhookSecret)",
            bind
        );
    }

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(64);
    let state = GatewayState {
        config: Arc::new(config.clone()),
        relay,
        channel_registry: Arc::new(ChannelRegistry::new()),
        inbound_tx: inbound_tx.clone(),
        channel_tasks: Arc::new(tokio::sync::RwLock::new(Vec::new())),
        started_at: chrono::Utc::now(),
    };

    {
        let state_inbound = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                process_inbound_message(&state_inbound, msg).await;
            }
        });
    }

    let telegram_token = config::resolve_telegram_token(&config);
    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        if let Some(token) = telegram_token {
            let telegram = Arc::new(TelegramChannel::new(token));
            if let Some(ref url) = webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                Some(telegram)
            } else {
                let handle = telegram.clone().start_inbound(inbound_tx);
                state.channel_tasks.write().await.push(handle);
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram)
                    .await;
                log::info!("telegram channel registered and getUpdates loop started");
                None
            }
        } else {
            log::warn!("no telegram token resolved; serving health endpoint only");
            None
        };

    let channel_registry = state.channel_registry.clone();
    let channel_tasks = state.channel_tasks.clone();
    let app = Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops channel connectors, removes the Telegram webhook if used, then awaits
/// in-process channel tasks.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channel connectors");

    for id in channel_registry.ids().await {
        if let Some(handle) = channel_registry.get(&id).await {
            handle.stop();
        }
    }

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies the
/// optional secret, queues an InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(ref msg) = update.message else {
        return StatusCode::OK;
    };
    let Some(ref text) = msg.text else {
        return StatusCode::OK;
    };
    let inbound = InboundMessage {
        channel_id: "telegram".to_string(),
        conversation_id: msg.chat.id.to_string(),
        text: text.clone(),
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "startedAt": state.started_at.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::RunStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ChannelHandle for RecordingChannel {
        fn id(&self) -> &str {
            "telegram"
        }

        fn stop(&self) {}

        async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct FailingRelay {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MessageRelay for FailingRelay {
        async fn relay(&self, _text: &str) -> Result<String, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::RunFailed {
                status: RunStatus::Failed,
            })
        }
    }

    async fn state_with(relay: Arc<dyn MessageRelay>) -> (GatewayState, Arc<RecordingChannel>) {
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let state = GatewayState {
            config: Arc::new(Config::default()),
            relay,
            channel_registry: Arc::new(ChannelRegistry::new()),
            inbound_tx,
            channel_tasks: Arc::new(tokio::sync::RwLock::new(Vec::new())),
            started_at: chrono::Utc::now(),
        };
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
        });
        state
            .channel_registry
            .register("telegram".to_string(), channel.clone())
            .await;
        (state, channel)
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            channel_id: "telegram".to_string(),
            conversation_id: "42".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn start_command_replies_with_the_greeting_without_relaying() {
        let relay = Arc::new(FailingRelay {
            calls: AtomicUsize::new(0),
        });
        let (state, channel) = state_with(relay.clone()).await;

        process_inbound_message(&state, inbound("/start")).await;
        process_inbound_message(&state, inbound("  /start  ")).await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(conv, text)| conv == "42" && text == GREETING));
        assert_eq!(relay.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_run_replies_with_the_fixed_fallback() {
        let relay = Arc::new(FailingRelay {
            calls: AtomicUsize::new(0),
        });
        let (state, channel) = state_with(relay.clone()).await;

        process_inbound_message(&state, inbound("how do I open an account?")).await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![("42".to_string(), RUN_FAILED_REPLY.to_string())]
        );
        assert_eq!(relay.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_command_forms() {
        assert!(is_start_command("/start"));
        assert!(is_start_command("/start@EvaBankBot"));
        assert!(!is_start_command("/started"));
        assert!(!is_start_command("start"));
        assert!(!is_start_command("how do I open an account?"));
    }

    #[test]
    fn greeting_is_the_fixed_string() {
        assert_eq!(
            GREETING,
            "Hello! I’m Eva, your banking assistant. How can I assist you today?"
        );
    }

    #[test]
    fn run_failure_maps_to_fixed_fallback() {
        let err = RelayError::RunFailed {
            status: RunStatus::Failed,
        };
        assert_eq!(
            reply_for_error(&err),
            "I'm sorry, there was an issue processing your request. Please try again."
        );
        let unknown = RelayError::RunFailed {
            status: RunStatus::Other("paused".into()),
        };
        assert_eq!(reply_for_error(&unknown), RUN_FAILED_REPLY);
    }

    #[test]
    fn timeout_and_service_have_their_own_replies() {
        let timeout = RelayError::Timeout { waited_secs: 120 };
        assert_eq!(reply_for_error(&timeout), TIMEOUT_REPLY);
        let service = RelayError::Service(crate::assistant::AssistantError::Api {
            status: 401,
            message: "invalid key".into(),
        });
        assert_eq!(reply_for_error(&service), SERVICE_REPLY);
    }
}
