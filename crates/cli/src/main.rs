use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    recado_config::RecadoConfig,
    recado_dispatch::{CampaignCatalog, OutboundDispatcher, Pacing},
    recado_gateway::AppState,
    recado_inbound::{FsBlobStore, InboundPipeline, NotificationSlot},
    recado_session::{
        CredentialStore, FileCredentialStore, MessageSender, SessionManager, SidecarClient, Timing,
    },
    recado_store::{ContactRegistry, MessageStore, QuickReplyStore, ReminderStore},
};

#[derive(Parser)]
#[command(name = "recado", about = "Recado — chat-session CRM bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Config file (overrides the default search locations).
    #[arg(long, global = true, env = "RECADO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge and API server (default when no subcommand is
    /// provided).
    Serve,
    /// Delete the persisted session credentials. Required after the
    /// session is invalidated by the protocol; the next start re-pairs
    /// via QR.
    ClearCredentials,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RecadoConfig> {
    match &cli.config {
        Some(path) => Ok(recado_config::load_config(path)?),
        None => Ok(recado_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "recado starting");

    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => serve(&cli, config).await,
        Some(Commands::ClearCredentials) => {
            let store = FileCredentialStore::new(config.credentials_path());
            store.clear().await?;
            info!(path = %store.path().display(), "credentials cleared");
            Ok(())
        },
    }
}

async fn serve(cli: &Cli, config: RecadoConfig) -> anyhow::Result<()> {
    config.ensure_dirs()?;

    let pool = recado_store::open_pool(&config.storage.database_url()).await?;
    let registry = ContactRegistry::new(pool.clone());
    let messages = MessageStore::new(pool.clone());
    let reminders = ReminderStore::new(pool.clone());
    let quick_replies = QuickReplyStore::new(pool.clone());

    let blob_store = FsBlobStore::new(config.storage.media_dir());
    blob_store.ensure_dirs()?;
    let blobs: Arc<dyn recado_inbound::BlobStore> = Arc::new(blob_store);

    let catalog = load_catalog(&config);

    let client = Arc::new(SidecarClient::new(&config.session.sidecar_url));
    let credentials = Arc::new(FileCredentialStore::new(config.credentials_path()));
    let timing = Timing {
        send_timeout: Duration::from_secs(config.session.send_timeout_secs),
        ..Timing::default()
    };
    let session = SessionManager::new(
        Arc::clone(&client) as Arc<dyn recado_session::ChatClient>,
        credentials,
        registry.clone(),
        timing,
    );
    // Subscribe before the run loop starts so no early event is missed.
    let pipeline_events = session.subscribe();
    session.start().await;

    let notifications = Arc::new(NotificationSlot::new());
    let pipeline = InboundPipeline::new(
        Arc::clone(&client) as Arc<dyn recado_session::ChatClient>,
        registry.clone(),
        messages.clone(),
        Arc::clone(&blobs),
        Arc::clone(&notifications),
    );
    tokio::spawn(async move { pipeline.run(pipeline_events).await });

    let pacing = Pacing {
        fixed_delay: Duration::from_millis(config.dispatch.fixed_delay_ms),
        ..Pacing::default()
    };
    let dispatcher = Arc::new(OutboundDispatcher::new(
        Arc::clone(&session) as Arc<dyn MessageSender>,
        registry.clone(),
        messages.clone(),
        Arc::clone(&catalog),
        pacing,
    ));

    let shutdown = CancellationToken::new();
    let state = AppState {
        pool,
        registry,
        messages,
        reminders,
        quick_replies,
        dispatcher,
        catalog,
        session: Arc::clone(&session),
        notifications,
        blobs,
        default_country_code: config.import.default_country_code.clone(),
        shutdown: shutdown.clone(),
    };

    let bind = cli.bind.clone().unwrap_or(config.gateway.bind.clone());
    let port = cli.port.unwrap_or(config.gateway.port);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        }
    });

    recado_gateway::serve(state, &bind, port).await?;

    session.stop().await;
    Ok(())
}

fn load_catalog(config: &RecadoConfig) -> Arc<CampaignCatalog> {
    let path = config
        .dispatch
        .campaigns_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("config/campaigns.toml"));
    let locale = &config.dispatch.default_locale;
    match CampaignCatalog::load(&path, locale) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            warn!(path = %path.display(), error = %e,
                "campaign catalog unavailable, campaigns disabled");
            Arc::new(CampaignCatalog::empty(locale))
        },
    }
}
