use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warboard_server::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "warboard-server", about = "Local HTTP adapter for the Warboard planner")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:39333.
    #[arg(long)]
    addr: Option<SocketAddr>,
    /// SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,
    /// YAML config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    warboard_server::serve(config).await
}
