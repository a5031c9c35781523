use anyhow::{Context, Result};
use clap::Parser;
use onemin_relay::app::App;
use onemin_relay::config::Config;
use onemin_relay::server::{self, AppState};
use onemin_relay::tokens;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "onemin-relay")]
#[command(about = "OpenAI-compatible chat completions relay for 1min.ai")]
struct CliArgs {
    /// Interface to bind (overrides RELAY_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides RELAY_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Worker threads for the runtime (overrides RELAY_WORKER_THREADS).
    #[arg(long, value_parser = parse_threads_arg)]
    threads: Option<usize>,
}

fn parse_threads_arg(input: &str) -> std::result::Result<usize, String> {
    match input.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!(
            "Invalid thread count '{}'. Expected a positive integer",
            input
        )),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onemin_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    info!("Starting onemin-relay");
    info!(
        "Permitted models ({}): {}",
        if config.subset_only {
            "enforced"
        } else {
            "advisory"
        },
        config.permitted_models.join(", ")
    );

    tokens::preload();

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    let app = App::new(config).context("Failed to initialize application")?;
    server::serve(listener, AppState::new(app)).await?;
    Ok(())
}
