use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use shadow_relay::agent::ProfileEngineFactory;
use shadow_relay::config::RelayConfig;
use shadow_relay::logging;
use shadow_relay::server::{self, SessionRegistry};
use shadow_relay::session::JsonSessionStore;
use shadow_relay::tools::{builtin_tools, WorkDirs};

/// Multi-client agent relay with human-in-the-loop tool approval
#[derive(Debug, Parser)]
#[command(name = "shadow-relay", version)]
struct Args {
    /// Config file (default: ~/.shadow-relay/config.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for saved sessions
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RelayConfig::load_or_default(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init_logging(&config.log)?;

    tracing::info!("=== Shadow Relay Starting ===");

    let work_dirs = Arc::new(WorkDirs::current(&config.allowed_work_dirs)?);
    let tools = builtin_tools(work_dirs.clone());
    tracing::info!(
        tools = ?tools.tool_names(),
        roots = ?work_dirs.roots(),
        "Registered {} tools",
        tools.len()
    );

    let store = Arc::new(JsonSessionStore::new(config.sessions_dir()));
    let idle_timeout = config.idle_timeout();
    let bind_addr = config.bind_addr();
    let factory = Arc::new(ProfileEngineFactory::new(config, tools));
    tracing::info!(profiles = ?factory.profiles().names(), "Profiles loaded");

    let registry = Arc::new(SessionRegistry::new(factory, store).with_idle_timeout(idle_timeout));
    let shutdown = registry.shutdown_token();
    let app = server::router(registry);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                }
            }
        })
        .await?;

    tracing::info!("=== Shadow Relay Shutting Down ===");
    Ok(())
}
