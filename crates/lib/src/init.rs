//! Initialize the configuration directory: create ~/.eva, default config,
//! persona instructions, and starter knowledge document.
//!
//! The persona text is deliberately an external artifact seeded here, not a
//! string constant in the relay code; edit `~/.eva/persona.md` to change it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

static DEFAULT_PERSONA: &str = include_str!("../config/persona.md");
static DEFAULT_KNOWLEDGE: &str = include_str!("../config/knowledge.txt");

/// Ensure the configuration directory has been initialized: the persona and
/// knowledge files must exist before serving or asking.
pub fn require_initialized(config_path: &Path, config: &config::Config) -> Result<()> {
    let persona = config::resolve_persona_path(config, config_path);
    if !persona.exists() {
        anyhow::bail!(
            "configuration not initialized; run `eva init` first (persona file not found: {})",
            persona.display()
        );
    }
    let knowledge = config::resolve_knowledge_path(config, config_path);
    if !knowledge.exists() {
        anyhow::bail!(
            "configuration not initialized; run `eva init` first (knowledge document not found: {})",
            knowledge.display()
        );
    }
    Ok(())
}

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Seeds `persona.md` and `knowledge.txt` from the bundled templates if missing.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let persona = config_dir.join("persona.md");
    if !persona.exists() {
        std::fs::write(&persona, DEFAULT_PERSONA)
            .with_context(|| format!("writing default persona to {}", persona.display()))?;
        log::info!("wrote default persona to {}", persona.display());
    }

    let knowledge = config_dir.join("knowledge.txt");
    if !knowledge.exists() {
        std::fs::write(&knowledge, DEFAULT_KNOWLEDGE)
            .with_context(|| format!("writing starter knowledge document to {}", knowledge.display()))?;
        log::info!("wrote starter knowledge document to {}", knowledge.display());
    }

    Ok(config_dir.to_path_buf())
}
