use clap::{Parser, Subcommand};
use eyre::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arb_mesh::config::Config;
use arb_mesh::custody::{KeyCustody, LocalKeyCustody};
use arb_mesh::network::{ExecutionRelay, HttpRelay, RpcMesh};
use arb_mesh::registry::{PoolRegistry, StaticRegistry};
use arb_mesh::worker::ChainWorker;

#[derive(Parser)]
#[command(name = "arb-mesh")]
#[command(about = "Cross-DEX negative-cycle arbitrage mesh", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Detect and compose but never submit; logs what would be sent
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one worker per configured chain (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Run) | None => run(cli.dry_run).await,
    }
}

async fn run(dry_run: bool) -> Result<()> {
    let config = Config::from_env()?;

    let mut workers = JoinSet::new();
    let mut shutdown_tokens = Vec::new();

    for chain in &config.chains {
        let mesh = Arc::new(RpcMesh::new(chain.endpoints.clone(), chain.event_buffer));
        let events = mesh
            .take_event_stream()
            .expect("fresh mesh always has its event stream");

        let custody: Arc<dyn KeyCustody> =
            Arc::new(LocalKeyCustody::from_env_ref(&chain.key_env)?);
        let relay = chain
            .relay_url
            .clone()
            .map(|url| Arc::new(HttpRelay::new(url)) as Arc<dyn ExecutionRelay>);
        let registry: Arc<dyn PoolRegistry> = Arc::new(match &chain.registry_path {
            Some(path) => StaticRegistry::from_file(path)?,
            None => StaticRegistry::default(),
        });

        let worker =
            ChainWorker::bootstrap(chain, mesh.clone(), custody, relay, registry, dry_run).await?;
        shutdown_tokens.push(worker.shutdown_token());

        let name = chain.name.clone();
        workers.spawn(async move { (name, worker.run(events).await) });
    }

    info!(chains = config.chains.len(), dry_run, "mesh running");

    {
        let tokens = shutdown_tokens.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                for token in tokens {
                    token.cancel();
                }
            }
        });
    }

    // Workers are isolated: one failing is logged and left to external
    // supervision while the rest keep running.
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((name, Ok(()))) => info!(chain = %name, "worker stopped"),
            Ok((name, Err(e))) => {
                error!(chain = %name, error = %e, "worker failed; supervision restarts it")
            }
            Err(e) => error!(error = %e, "worker task aborted"),
        }
    }

    Ok(())
}
