//! Agentrelay - agent registry, router, and routing client

use agentrelay_core::config::{BindMode, StoreBackend};
use agentrelay_core::{RelayConfig, Task};
use agentrelay_gateway::{start_registry, start_router};
use agentrelay_routing::{ClientConfig, RoutingClient, Target};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentrelay", about = "Agent registry and handover routing", version)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(short, long, default_value = "agentrelay.toml")]
    config: PathBuf,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry service
    Registry {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        bind: Option<String>,
        /// Store backend: memory or sqlite
        #[arg(long)]
        store: Option<String>,
        /// Database file for the sqlite store
        #[arg(long)]
        db: Option<PathBuf>,
        /// Lease TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Run a router that hands tasks to registered agents
    Router {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        bind: Option<String>,
        /// Registry base URL
        #[arg(short, long)]
        registry: Option<String>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Send a message and follow handovers until an agent answers
    Send {
        /// Endpoint of the first agent (usually a router's /message)
        #[arg(long)]
        to: String,
        /// Name of the first agent
        #[arg(long, default_value = "router")]
        name: String,
        #[arg(long)]
        capability: Option<String>,
        /// Conversation id (generated when absent)
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        max_hops: Option<u32>,
        payload: Vec<String>,
    },
    /// Print the effective configuration as TOML
    DumpConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());
    let mut config = RelayConfig::load(&cli.config)?;

    match cli.command {
        Commands::Registry {
            port,
            bind,
            store,
            db,
            ttl,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = parse_bind(&bind);
            }
            match store.as_deref() {
                Some("sqlite") => config.registry.store.backend = StoreBackend::Sqlite,
                Some("memory") => config.registry.store.backend = StoreBackend::Memory,
                Some(other) => anyhow::bail!("unknown store backend: {}", other),
                None => {}
            }
            if db.is_some() {
                config.registry.store.path = db;
            }
            if let Some(ttl) = ttl {
                config.registry.lease_ttl_secs = ttl;
            }
            config.validate()?;
            start_registry(config, shutdown_token()).await?;
        }

        Commands::Router {
            port,
            bind,
            registry,
            name,
        } => {
            if let Some(port) = port {
                config.router.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = parse_bind(&bind);
            }
            if let Some(registry) = registry {
                config.router.registry_url = registry;
            }
            if let Some(name) = name {
                config.router.name = name;
            }
            start_router(config, shutdown_token()).await?;
        }

        Commands::Send {
            to,
            name,
            capability,
            context,
            max_hops,
            payload,
        } => {
            if let Some(max_hops) = max_hops {
                config.routing.max_hops = max_hops;
            }
            config.validate()?;

            let context = context.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let mut task = Task::new(context, payload.join(" "));
            if let Some(capability) = capability {
                task = task.with_capability_hint(capability);
            }

            let client = RoutingClient::http(ClientConfig::from(&config.routing));
            match client.send_cancellable(Target::new(name, to), task, shutdown_token()).await {
                Ok(done) => {
                    println!("{}", done.answer);
                    eprintln!("[{}] via {}", done.context_id, done.visited.join(" -> "));
                }
                Err(failure) => {
                    let report = serde_json::json!({
                        "reason": failure.reason.as_str(),
                        "contextId": failure.context_id.as_str(),
                        "visited": failure.visited,
                        "detail": failure.detail,
                    });
                    eprintln!("{}", serde_json::to_string_pretty(&report)?);
                    std::process::exit(1);
                }
            }
        }

        Commands::DumpConfig => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}

fn parse_bind(bind: &str) -> BindMode {
    match bind {
        "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
        _ => BindMode::Lan,
    }
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            trigger.cancel();
        }
    });
    token
}

fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agentrelay=info,tower_http=info".into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "agentrelay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
