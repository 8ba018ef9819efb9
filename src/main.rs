//! # NewsBrief
//!
//! Scheduled AI news briefs. Serves the HTTP gateway, or runs one dispatch
//! cycle from the command line (for an external cron).
//!
//! Usage:
//!   newsbrief serve                  # Start the gateway (config port)
//!   newsbrief serve --port 8080      # Custom port
//!   newsbrief run-once               # One dispatch cycle, report on stdout
//!   newsbrief init-config            # Write a default config file

use anyhow::Result;
use clap::{Parser, Subcommand};
use newsbrief_channels::{EmailNotifier, WhatsAppNotifier};
use newsbrief_core::config::BriefConfig;
use newsbrief_core::traits::{Generator, NewsSource, Notifier, Summarizer};
use newsbrief_gateway::AppState;
use newsbrief_news::NewsApiClient;
use newsbrief_providers::{AiSummarizer, ProviderRouter};
use newsbrief_scheduler::{BriefDb, BriefStore, CycleSettings, DispatchCycle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "newsbrief",
    version,
    about = "📰 NewsBrief — scheduled AI news briefs by email and WhatsApp"
)]
struct Cli {
    /// Config file (default: $NEWSBRIEF_CONFIG or ~/.newsbrief/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Listen port (overrides [gateway].port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one dispatch cycle and print the report
    RunOnce,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&Path>) -> Result<BriefConfig> {
    let config = match path {
        Some(path) => {
            let mut config = BriefConfig::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => BriefConfig::load()?,
    };
    Ok(config)
}

/// Senders for every configured and enabled channel. A channel that fails to
/// initialize is logged and left out.
fn build_notifiers(config: &BriefConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(email) = config.channel.email.as_ref().filter(|c| c.enabled) {
        match EmailNotifier::new(email) {
            Ok(n) => {
                tracing::info!("📧 Email channel ready ({}:{})", email.smtp_host, email.smtp_port);
                notifiers.push(Arc::new(n));
            }
            Err(e) => tracing::warn!("⚠️ Email channel not available: {e}"),
        }
    }

    if let Some(whatsapp) = config.channel.whatsapp.as_ref().filter(|c| c.enabled) {
        match WhatsAppNotifier::new(whatsapp.clone()) {
            Ok(n) => {
                tracing::info!("💬 WhatsApp channel ready");
                notifiers.push(Arc::new(n));
            }
            Err(e) => tracing::warn!("⚠️ WhatsApp channel not available: {e}"),
        }
    }

    if notifiers.is_empty() {
        tracing::warn!("⚠️ No delivery channel configured — every job will fail");
    }
    notifiers
}

/// Wire every collaborator from config.
fn build_state(config: BriefConfig) -> Result<AppState> {
    let db_path = expand_path(&config.store.path);
    let db = BriefDb::open(Path::new(&db_path))?;
    tracing::info!("🗄️ Store: {db_path}");
    let store: Arc<dyn BriefStore> = Arc::new(db);

    let generator: Arc<dyn Generator> = Arc::new(ProviderRouter::from_config(&config.llm)?);
    let summarizer: Arc<dyn Summarizer> = Arc::new(AiSummarizer::new(
        generator.clone(),
        config.llm.default_provider.clone(),
        config.llm.default_model.clone(),
    ));
    if config.news.api_key.is_empty() {
        tracing::warn!("⚠️ news.api_key is not set — searches will return no articles");
    }
    let news: Arc<dyn NewsSource> = Arc::new(NewsApiClient::new(config.news.clone())?);

    let cycle = DispatchCycle::new(
        store.clone(),
        news.clone(),
        summarizer.clone(),
        generator.clone(),
        build_notifiers(&config),
        CycleSettings::from_config(&config),
    );

    Ok(AppState {
        config,
        start_time: std::time::Instant::now(),
        cycle: Arc::new(cycle),
        store,
        news,
        summarizer,
        generator,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "newsbrief=debug,newsbrief_scheduler=debug,newsbrief_gateway=debug,newsbrief_providers=debug,tower_http=debug"
    } else {
        "newsbrief=info,newsbrief_scheduler=info,newsbrief_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Command::InitConfig { force } => {
            let path = cli.config.clone().unwrap_or_else(BriefConfig::default_path);
            if path.exists() && !force {
                println!("⚠️  Config already exists at {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            BriefConfig::default().save_to(&path)?;
            println!("✅ Default config written to {}", path.display());
            println!("   Set scheduler.secret, news.api_key and a provider key before serving.");
        }
        Command::RunOnce => {
            let config = load_config(cli.config.as_deref())?;
            let state = build_state(config)?;
            let report = state.cycle.run(chrono::Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(port) = port {
                config.gateway.port = port;
            }

            println!("📰 NewsBrief v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 Gateway:  http://{}:{}", config.gateway.host, config.gateway.port);
            println!("   ⏰ Trigger:  POST /api/send-scheduled");
            println!("   🧠 Model:    {}/{}", config.llm.default_provider, config.llm.default_model);
            println!();

            let state = build_state(config)?;
            newsbrief_gateway::start(state).await?;
        }
    }

    Ok(())
}
