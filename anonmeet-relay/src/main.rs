//! anonmeet-relay - anonymous interest matching with relayed conversations
//!
//! Serves the Slack webhooks, pairs participants as profiles arrive and
//! runs one conversation session per accepted pair.

use anonmeet_common::config::{load_toml_config, RelaySettings, SettingsOverrides};
use anonmeet_common::events::EventBus;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use anonmeet_relay::collaborators::{
    CompatibilityOracle, InMemoryProfileStore, OpenAiOracle, ProfileStore, SlackGateway,
    SqliteProfileStore, TransportGateway,
};
use anonmeet_relay::AppState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "anonmeet-relay", version, about)]
struct Args {
    /// Config file (default: platform config dir, then /etc/anonmeet)
    #[arg(short, long, env = "ANONMEET_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ANONMEET_PORT")]
    port: Option<u16>,

    /// Minimum oracle percentage that accepts a pair
    #[arg(long, env = "ANONMEET_MATCH_THRESHOLD")]
    match_threshold: Option<u8>,

    /// Hours a session stays open without an explicit end
    #[arg(long, env = "ANONMEET_SESSION_LIFETIME_HOURS")]
    session_lifetime_hours: Option<u64>,

    /// Seconds between time-remaining notices
    #[arg(long, env = "ANONMEET_NOTICE_INTERVAL_SECS")]
    notice_interval_secs: Option<u64>,

    /// Seconds between the reveal and archival after an explicit end
    #[arg(long, env = "ANONMEET_END_GRACE_SECS")]
    end_grace_secs: Option<u64>,

    #[arg(long, env = "ANONMEET_SLACK_BOT_TOKEN", hide_env_values = true)]
    slack_bot_token: Option<String>,

    /// The bot's own user id; its posts are never relayed
    #[arg(long, env = "ANONMEET_BOT_USER_ID")]
    bot_user_id: Option<String>,

    #[arg(long, env = "ANONMEET_ORACLE_API_KEY", hide_env_values = true)]
    oracle_api_key: Option<String>,

    /// SQLite file for profiles (in-memory when unset)
    #[arg(long, env = "ANONMEET_PROFILE_DB")]
    profile_db: Option<PathBuf>,

    /// User allowed to request transcripts over DM
    #[arg(long, env = "ANONMEET_ADMIN_USER_ID")]
    admin_user_id: Option<String>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            port: self.port,
            match_threshold: self.match_threshold,
            session_lifetime_hours: self.session_lifetime_hours,
            notice_interval_secs: self.notice_interval_secs,
            end_grace_secs: self.end_grace_secs,
            slack_bot_token: self.slack_bot_token.clone(),
            bot_user_id: self.bot_user_id.clone(),
            oracle_api_key: self.oracle_api_key.clone(),
            profile_db: self.profile_db.clone(),
            admin_user_id: self.admin_user_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anonmeet_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting anonmeet-relay v{}", env!("CARGO_PKG_VERSION"));

    let toml_config =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration file")?;
    let settings = RelaySettings::resolve(&args.overrides(), &toml_config)
        .context("Invalid configuration")?;

    info!(
        threshold = settings.match_threshold,
        lifetime_secs = settings.session_lifetime.as_secs(),
        notice_secs = settings.notice_interval.as_secs(),
        grace_secs = settings.end_grace.as_secs(),
        "Settings resolved"
    );

    let bot_token = settings
        .slack_bot_token
        .clone()
        .context("Slack bot token is required (ANONMEET_SLACK_BOT_TOKEN)")?;
    let gateway: Arc<dyn TransportGateway> = Arc::new(
        SlackGateway::new(settings.slack_api_url.clone(), bot_token)
            .context("Failed to build Slack client")?,
    );

    let oracle_key = settings
        .oracle_api_key
        .clone()
        .context("Oracle API key is required (ANONMEET_ORACLE_API_KEY)")?;
    let oracle: Arc<dyn CompatibilityOracle> = Arc::new(
        OpenAiOracle::new(settings.oracle_url.clone(), oracle_key, settings.oracle_model.clone())
            .context("Failed to build oracle client")?,
    );

    let store: Arc<dyn ProfileStore> = match &settings.profile_db {
        Some(path) => Arc::new(
            SqliteProfileStore::open(path)
                .await
                .context("Failed to open profile database")?,
        ),
        None => {
            info!("No profile database configured; profiles are kept in memory");
            Arc::new(InMemoryProfileStore::new())
        }
    };

    let event_bus = EventBus::new(100);
    let port = settings.port;
    let state = AppState::new(settings, store, oracle, gateway, event_bus);
    let app = anonmeet_relay::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
