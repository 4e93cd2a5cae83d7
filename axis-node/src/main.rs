// Axis node daemon: bind, connect configured peers, broadcast stdin lines, log inbound events.

use anyhow::Context;
use axis_node::config::{self, Config};
use axis_node::{Node, NodeEvent, Payload};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("axis-node {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let (node, mut events) = Node::bind(cfg.bind.as_str())
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    if !cfg.peers.is_empty() {
        node.connect(&cfg.peers)
            .await
            .context("connecting configured peers")?;
    }
    info!(local = %node.local_endpoint(), peers = cfg.peers.len(), "axis-node {} running", VERSION);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = node.send(line).await {
                        warn!("broadcast failed: {e}");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin closed: {e}");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Some(event) => log_event(event),
                None => break,
            },
        }
    }

    node.close().await;
    Ok(())
}

fn log_event(event: NodeEvent) {
    match event {
        NodeEvent::Message { payload, from } => match payload {
            Payload::Text(text) => info!(%from, "text: {text}"),
            Payload::Binary(bytes) => info!(%from, len = bytes.len(), "binary"),
            Payload::Object(value) => info!(%from, "object: {value}"),
        },
        NodeEvent::PeerJoined(peer) => info!(%peer, "peer joined"),
        NodeEvent::PeerLeft(peer) => info!(%peer, "peer left"),
        NodeEvent::Malformed { from, error } => warn!(%from, "{error}"),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
