//! ase-analyzer - Sentiment analysis relay
//!
//! Startup order:
//! 1. Service bindings from the platform descriptors (or local defaults)
//! 2. HTTP listener (static assets + /health), independent of the pipeline
//! 3. Document store connection
//! 4. Broker connection and shared subscription
//!
//! A missing broker binding or an unreachable database stops the process.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ase_analyzer::api::static_files::DEFAULT_STATIC_DIR;
use ase_analyzer::db::MongoStore;
use ase_analyzer::handler::IngestionHandler;
use ase_analyzer::heartbeat::spawn_heartbeat;
use ase_analyzer::messaging::{run_subscription, AmqpClient, NotificationPublisher};
use ase_analyzer::scorer::AfinnScorer;
use ase_analyzer::stats::PipelineStats;
use ase_analyzer::{build_router, AppState};
use ase_common::config::{load_toml_config, resolve_port, ConfigSource, LoadedConfig, ServiceBindings};

#[derive(Debug, Parser)]
#[command(name = "ase-analyzer", version, about = "Scores tweets from the broker and republishes the results")]
struct Args {
    /// TOML bootstrap file
    #[arg(long, env = "ASE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port (overrides platform and TOML)
    #[arg(long, env = "ASE_PORT")]
    port: Option<u16>,

    /// Directory of static assets
    #[arg(long, env = "ASE_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing init so the file can set the log level
    let LoadedConfig {
        config: toml_config,
        source: config_source,
    } = load_toml_config(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting ASE analyzer (ase-analyzer) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        ConfigSource::Defaults => info!("No config file given, using defaults"),
        ConfigSource::Missing(path) => warn!("Config file {} not found, using defaults", path.display()),
        ConfigSource::File(path) => info!("Loaded config file {}", path.display()),
    }

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Caught panic: {}", panic_info);
    }));

    let bindings = match ServiceBindings::from_env() {
        Ok(bindings) => bindings,
        Err(e) => {
            error!("Cannot resolve service bindings: {}", e);
            return Err(e.into());
        }
    };

    let messaging = toml_config.messaging.clone();
    let stats = Arc::new(PipelineStats::new());

    // HTTP listener
    let port = resolve_port(args.port, toml_config.port, &bindings.application);
    let static_dir = args
        .static_dir
        .or(toml_config.static_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
    info!(
        "Instance {} (memory limit {} MB), static assets from {}",
        bindings.application.instance_index,
        bindings.application.memory_limit_mb,
        static_dir.display()
    );

    let state = AppState::new(Arc::clone(&stats), bindings.application.clone(), static_dir);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server listening on port {}", port);
    let mut http = tokio::spawn(async move { axum::serve(listener, app).await });

    // Document store
    let store = match MongoStore::connect(&bindings.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    // Broker
    let client = match AmqpClient::connect(&bindings.broker, &messaging.exchange).await {
        Ok(client) => client,
        Err(e) => {
            error!("Connection to {} failed: {}", bindings.broker.service, e);
            return Err(e.into());
        }
    };

    let consumer = match client
        .subscribe(&messaging.tweets_topic, &messaging.share_id, messaging.credit)
        .await
    {
        Ok(consumer) => consumer,
        Err(e) => {
            error!("Failed to subscribe: {}", e);
            return Err(e.into());
        }
    };
    stats.set_subscribed(true);

    let client = Arc::new(client);
    let publisher: Arc<dyn NotificationPublisher> = client.clone();
    let handler = Arc::new(IngestionHandler::new(
        Arc::new(AfinnScorer),
        Arc::new(store),
        publisher,
        &messaging,
        Arc::clone(&stats),
    ));

    let heartbeat = spawn_heartbeat(Duration::from_secs(toml_config.heartbeat.interval_secs));

    let outcome = tokio::select! {
        result = run_subscription(consumer, handler) => result.map_err(anyhow::Error::from),
        joined = &mut http => match joined {
            Ok(served) => served.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    heartbeat.abort();
    http.abort();
    client.close().await;

    if let Err(e) = &outcome {
        error!("ase-analyzer stopped: {}", e);
    }
    outcome
}
