//! One-time startup against the assistant service.
//!
//! Uploads the knowledge document, registers the assistant persona, and hands
//! back an immutable profile. Runs after secret resolution and before any
//! message is served; nothing here is refreshed for the process lifetime.

use crate::assistant::AssistantClient;
use crate::config::{self, Config};
use anyhow::{Context, Result};
use std::path::Path;

/// Model used when `assistant.model` is not configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-1106";
/// Persona name used when `assistant.name` is not configured.
pub const DEFAULT_NAME: &str = "Eva";

/// Identifiers created once at startup and treated as immutable afterwards.
#[derive(Debug, Clone)]
pub struct AssistantProfile {
    pub assistant_id: String,
    pub knowledge_file_id: String,
}

/// Read the persona file, upload the knowledge document, and create the
/// assistant persona (model + instructions + document retrieval).
pub async fn prepare_assistant(
    client: &AssistantClient,
    config: &Config,
    config_path: &Path,
) -> Result<AssistantProfile> {
    let persona_path = config::resolve_persona_path(config, config_path);
    let instructions = std::fs::read_to_string(&persona_path)
        .with_context(|| format!("reading persona instructions from {}", persona_path.display()))?;

    let knowledge_path = config::resolve_knowledge_path(config, config_path);
    let knowledge = std::fs::read(&knowledge_path)
        .with_context(|| format!("reading knowledge document from {}", knowledge_path.display()))?;
    let file_name = knowledge_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("knowledge.txt");

    let knowledge_file_id = client
        .upload_file(file_name, knowledge)
        .await
        .context("uploading knowledge document")?;
    log::info!("knowledge document uploaded: {}", knowledge_file_id);

    let model = config.assistant.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let name = config.assistant.name.as_deref().unwrap_or(DEFAULT_NAME);
    let assistant_id = client
        .create_assistant(model, name, &instructions)
        .await
        .context("creating assistant persona")?;
    log::info!("assistant persona ready: {} ({}, model {})", name, assistant_id, model);

    Ok(AssistantProfile {
        assistant_id,
        knowledge_file_id,
    })
}
