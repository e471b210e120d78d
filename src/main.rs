mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use darkroom::{config, server};
use darkroom_db::pool::init_pool;

async fn start_server(
    host: String,
    port: u16,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting darkroom server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    // Determine data directory from config path or current directory
    let data_dir = config_path
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let db_path = data_dir.join("darkroom.db");
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    let db = init_pool(&db_path_str)?;

    let ctx = server::AppContext::new(db, config);
    server::serve(ctx).await
}

async fn run_cleanup(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let data_dir = config_path
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let db = init_pool(&data_dir.join("darkroom.db").to_string_lossy())?;
    let ctx = server::AppContext::new(db, config);

    let chunks = ctx.storage.cleanup_expired_chunks()?;
    let archives = ctx.archives.cleanup_expired()?;
    tracing::info!("Removed {} expired chunks, {} expired archives", chunks, archives);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            start_server(host, port, cli.config.as_deref()).await?;
        }
        Commands::Cleanup => {
            run_cleanup(cli.config.as_deref()).await?;
        }
        Commands::Validate { config } => {
            let path = config.or(cli.config);
            match config::load_config_or_default(path.as_deref()) {
                Ok(_) => println!("Configuration is valid"),
                Err(e) => {
                    eprintln!("Configuration error: {e:#}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("darkroom {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
