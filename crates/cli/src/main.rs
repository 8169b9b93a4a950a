use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "eva")]
#[command(about = "Eva — Telegram banking assistant relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, persona instructions, starter knowledge document).
    Init {
        /// Config file path (default: EVA_CONFIG_PATH or ~/.eva/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: register the assistant persona, upload the knowledge document, then relay Telegram messages until terminated.
    Serve {
        /// Config file path (default: EVA_CONFIG_PATH or ~/.eva/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Health/webhook HTTP port (default from config or 8484)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Relay a single message to the assistant and print the reply (no Telegram involved).
    Ask {
        /// Config file path (default: EVA_CONFIG_PATH or ~/.eva/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// The message text to relay
        text: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("eva {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, text }) => {
            if let Err(e) = run_ask(config, text).await {
                log::error!("ask failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    lib::init::require_initialized(&path, &config)?;

    // Refuse to start with a missing secret rather than fail on first use.
    let secrets = lib::config::Secrets::resolve(&config)?;

    let client = lib::assistant::AssistantClient::new(
        secrets.api_key.clone(),
        config.assistant.base_url.clone(),
    );
    let profile = lib::bootstrap::prepare_assistant(&client, &config, &path).await?;
    let relay = lib::relay::AssistantMessageRelay::new(
        client,
        profile,
        config.assistant.run_instructions.clone(),
        lib::relay::PollPolicy::from_config(&config.assistant.poll),
    );

    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config, Arc::new(relay)).await
}

async fn run_ask(config_path: Option<std::path::PathBuf>, text: String) -> anyhow::Result<()> {
    use lib::relay::MessageRelay;

    let (config, path) = lib::config::load_config(config_path)?;
    lib::init::require_initialized(&path, &config)?;

    let api_key = lib::config::resolve_api_key(&config).ok_or_else(|| {
        anyhow::anyhow!("missing assistant API key (OPENAI_API_KEY or assistant.apiKey)")
    })?;

    let client = lib::assistant::AssistantClient::new(api_key, config.assistant.base_url.clone());
    let profile = lib::bootstrap::prepare_assistant(&client, &config, &path).await?;
    let relay = lib::relay::AssistantMessageRelay::new(
        client,
        profile,
        config.assistant.run_instructions.clone(),
        lib::relay::PollPolicy::from_config(&config.assistant.poll),
    );

    let reply = relay.relay(&text).await?;
    println!("{}", reply.trim());
    Ok(())
}
