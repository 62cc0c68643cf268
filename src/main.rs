//! maas -- metered meme API.
//!
//! Application entry point. Wires together:
//!   - Configuration loading
//!   - Database initialization
//!   - Client bootstrapping
//!   - Metering core + call logger
//!   - HTTP server
//!   - Graceful shutdown on SIGTERM / SIGINT

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use maas::AppState;
use maas::api;
use maas::config::Config;
use maas::db::Database;
use maas::generator::MemeGenerator;
use maas::ledger::{CreditStore, SqliteCreditStore};
use maas::metering::{Meter, spawn_call_logger};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("maas {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
maas {version} -- metered meme API

USAGE:
    maas [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: maas.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    MAAS_CONFIG            Alternative to --config flag
    MAAS_SERVER_PORT etc.  Override individual settings
",
        version = env!("CARGO_PKG_VERSION")
    );
}

/// `--config` wins over `MAAS_CONFIG`, which wins over the default path.
fn resolve_config_path(cli: Option<PathBuf>, env: Option<String>) -> PathBuf {
    cli.or_else(|| env.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("maas.toml"))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();
    let config_path = resolve_config_path(cli.config_path, std::env::var("MAAS_CONFIG").ok());

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting maas"
    );
    for (key, env_var) in config.env_overrides.all() {
        tracing::info!(setting = %key, env = %env_var, "Setting overridden by environment");
    }

    // 4. Open database
    let db = Database::open(&config.database.path)?;
    tracing::info!(path = %config.database.path.display(), "Database opened");
    let store: Arc<dyn CreditStore> = Arc::new(SqliteCreditStore::new(db));

    // 5. Bootstrap configured clients (existing balances are left alone)
    bootstrap_clients(store.as_ref(), &config)?;

    // 6. Call logger + metering core
    let (calls_tx, calls_rx) = tokio::sync::mpsc::unbounded_channel();
    let call_logger = spawn_call_logger(store.clone(), calls_rx);

    let meter = Meter::new(store, calls_tx)
        .reject_non_positive_credit(config.metering.reject_non_positive_credit);

    // 7. Content generator
    let generator = MemeGenerator::new(config.generator.seed);
    if let Some(seed) = config.generator.seed {
        tracing::info!(seed, "Meme generator seeded from config");
    }

    let listen_addr = config.listen_addr();
    let state = AppState {
        config: Arc::new(config),
        meter: Arc::new(meter),
        generator: Arc::new(generator),
    };

    // 8. Serve
    let app = api::build_app(state);

    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");

    // The router (and with it the last call sender) is gone; wait for the
    // logger to flush what it still holds.
    if let Err(e) = call_logger.await {
        tracing::error!(error = %e, "Call logger task failed");
    }

    Ok(())
}

fn bootstrap_clients(store: &dyn CreditStore, config: &Config) -> anyhow::Result<()> {
    for (idx, client) in config.clients.iter().enumerate() {
        if client.token.trim().is_empty() {
            tracing::warn!(index = idx, "Skipping configured client with empty token");
            continue;
        }
        if store.register(&client.token, client.balance)? {
            tracing::info!(index = idx, balance = client.balance, "Registered client");
        } else {
            tracing::debug!(index = idx, "Client already registered");
        }
    }
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("maas={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
