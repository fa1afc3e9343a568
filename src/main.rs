//! Ambassador Ledger Server
//!
//! Serves wallet auth, contribution submission and the leaderboard

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ambassador_ledger::config::SignatureScheme;
use ambassador_ledger::server::{run_server, AppState};
use ambassador_ledger::{
    AmbassadorPolicy, AuthService, Config, ContributionService, CredentialVerifier,
    LedgerStorage, MockSignatureVerifier, Projections, Sr25519Verifier,
};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "ambassador-server", version, about = "Ambassador Ledger server")]
struct Args {
    /// Path to config.toml (embedded defaults when absent)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, env = "LEDGER_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "LEDGER_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(long, env = "LEDGER_DATABASE")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_from(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    info!("Starting Ambassador Ledger Server");

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let database = args.database.unwrap_or_else(|| config.database.path.clone());

    let storage = Arc::new(if database == ":memory:" {
        warn!("Using in-memory database; data is lost on exit");
        LedgerStorage::in_memory()?
    } else {
        LedgerStorage::open(&database)
            .with_context(|| format!("Failed to open database {}", database))?
    });

    let verifier: Arc<dyn CredentialVerifier> = match config.auth.signature_scheme {
        SignatureScheme::Sr25519 => Arc::new(Sr25519Verifier::new(config.auth.login_window_secs)),
        SignatureScheme::Mock => {
            warn!("Mock signature verification enabled; do not use in production");
            Arc::new(MockSignatureVerifier)
        }
    };

    let state = Arc::new(AppState {
        auth: AuthService::new(
            storage.clone(),
            verifier,
            AmbassadorPolicy::from_config(&config.auth),
            config.auth.session_ttl(),
        ),
        contributions: ContributionService::new(storage.clone(), config.rewards.auto_approve),
        projections: Projections::new(storage.clone(), config.display.clone()),
        storage,
        started_at: std::time::Instant::now(),
    });

    // Periodically drop expired sessions
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = sweep_state.auth.purge_expired() {
                error!("Session sweep failed: {}", e);
            }
        }
    });
    info!(
        "Session sweep started (every {} seconds)",
        SESSION_SWEEP_INTERVAL_SECS
    );

    run_server(&host, port, state).await?;

    Ok(())
}
