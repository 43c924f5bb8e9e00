use clap::{Parser, ValueEnum};
use classgold_core::SeedData;
use classgold_service::{build_router, ServiceConfig, ServiceState, StoreConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreMode {
    Auto,
    Memory,
    File,
}

#[derive(Debug, Parser)]
#[command(name = "classgoldd", version, about = "Classroom gold economy REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(long, default_value = "127.0.0.1:8092")]
    listen: SocketAddr,
    /// Record store backend. `auto` picks the file store when a data directory is configured.
    #[arg(long, value_enum, default_value_t = StoreMode::Auto, env = "CLASSGOLD_STORE")]
    store: StoreMode,
    /// Directory holding one JSON file per collection.
    #[arg(long, env = "CLASSGOLD_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// JSON file with seed users, products and quests. Built-in demo data otherwise.
    #[arg(long, env = "CLASSGOLD_SEED")]
    seed: Option<PathBuf>,
}

fn resolve_store(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let store = match cli.store {
        StoreMode::Memory => StoreConfig::Memory,
        StoreMode::File => {
            let dir = cli
                .data_dir
                .clone()
                .ok_or_else(|| anyhow::anyhow!("store=file requires --data-dir or CLASSGOLD_DATA_DIR"))?;
            StoreConfig::json_file(dir)
        }
        StoreMode::Auto => match cli.data_dir.clone() {
            Some(dir) => StoreConfig::json_file(dir),
            None => StoreConfig::Memory,
        },
    };
    Ok(store)
}

fn resolve_seed(cli: &Cli) -> anyhow::Result<SeedData> {
    match &cli.seed {
        Some(path) => Ok(SeedData::from_path(path)?),
        None => Ok(SeedData::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "classgold_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let store = resolve_store(&cli)?;
    let seed = resolve_seed(&cli)?;
    info!(store = store.label(), seed_users = seed.users.len(), "Starting classgoldd");

    let state = ServiceState::bootstrap(ServiceConfig { store, seed })?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("classgoldd listening on http://{}", cli.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
