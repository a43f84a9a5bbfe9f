//! Duet Games coordinator service.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duet_games::{
    AppState, Cli, Command, CoordinatorConfig, EventBus, GameStore, InviteBroker, Janitor,
    SessionCoordinator, StandardSetup, router,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            db_path,
            port,
        } => {
            let mut config = load_config(&config)?;
            if let Some(db_path) = db_path {
                config = config.with_db_path(db_path);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            serve(config).await
        }
        Command::Sweep { config } => {
            let config = load_config(&config)?;
            sweep_once(config)
        }
    }
}

fn load_config(path: &Path) -> Result<CoordinatorConfig> {
    if path.exists() {
        Ok(CoordinatorConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(CoordinatorConfig::default())
    }
}

/// Builds the component graph shared by both commands.
fn build_store(config: &CoordinatorConfig) -> Result<GameStore> {
    let store = GameStore::new(config.db_path().clone());
    store.run_migrations()?;
    Ok(store)
}

async fn serve(config: CoordinatorConfig) -> Result<()> {
    info!("Starting duet_games coordinator");

    let store = build_store(&config)?;
    let bus = EventBus::new();
    let inbox = duet_games::ChannelSink::new();
    let sink: Arc<dyn duet_games::NotificationSink> = Arc::new(inbox.clone());
    let pairing: Arc<dyn duet_games::PairingDirectory> = Arc::new(
        duet_games::StaticPairingDirectory::from_pairs(config.pairs().iter().cloned()),
    );
    let setup: Arc<dyn duet_games::GameSetup> =
        Arc::new(StandardSetup::new(*config.memory_pairs()));

    let broker = InviteBroker::new(
        store.clone(),
        pairing,
        sink.clone(),
        bus.clone(),
        chrono::Duration::seconds(*config.invite_ttl_secs()),
    );
    let coordinator = SessionCoordinator::new(
        store.clone(),
        bus.clone(),
        sink,
        setup,
        config.hide_delay(),
    );

    let janitor = Janitor::new(
        store,
        bus,
        config.sweep_interval(),
        chrono::Duration::seconds(*config.session_max_age_secs()),
        chrono::Duration::seconds(*config.cleanup_grace_secs()),
    );
    let janitor_handle = janitor.run();

    let app = router(AppState {
        broker,
        coordinator,
        inbox,
    });
    let listener = tokio::net::TcpListener::bind((config.host().as_str(), *config.port())).await?;
    info!(host = %config.host(), port = config.port(), "Coordinator listening");

    axum::serve(listener, app).await?;
    janitor_handle.abort();
    Ok(())
}

fn sweep_once(config: CoordinatorConfig) -> Result<()> {
    let store = build_store(&config)?;
    let janitor = Janitor::new(
        store,
        EventBus::new(),
        config.sweep_interval(),
        chrono::Duration::seconds(*config.session_max_age_secs()),
        chrono::Duration::seconds(*config.cleanup_grace_secs()),
    );
    let report = janitor.sweep(chrono::Utc::now().naive_utc())?;
    info!(
        stale_sessions = report.stale_sessions(),
        expired_invites = report.expired_invites(),
        reclaimed_sessions = report.reclaimed_sessions(),
        "Sweep complete"
    );
    Ok(())
}
