//! # echo-replay
//!
//! Replays captured channel traffic through the in-memory transport.
//!
//! ## Usage
//!
//! ```bash
//! # Listen for two events and replay a capture from stdin
//! echo-replay orders:OrderShipped private-chat:.client-typing < capture.jsonl
//!
//! # With a custom config
//! echo-replay --config /path/to/echo.toml orders:OrderShipped < capture.jsonl
//! ```
//!
//! Each input line is a publication: `{"channel": "orders", "event": "...", "data": {...}}`.

use anyhow::{bail, Context, Result};
use echo_client::{init_tracing, listen_qualified, EchoConfig, Echo};
use echo_core::Backend;
use echo_protocol::codec;
use echo_transport::{MemoryClient, MemoryPresenceFactory};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Args {
    config: Option<PathBuf>,
    listeners: Vec<(String, String)>,
}

fn parse_args() -> Result<Args> {
    let mut config = None;
    let mut listeners = Vec::new();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--config" {
            let path = args.next().context("--config requires a path")?;
            config = Some(PathBuf::from(path));
            continue;
        }

        let Some((channel, event)) = arg.split_once(':') else {
            bail!("Listener must be written as <channel>:<event>, got {arg}");
        };
        if channel.is_empty() || event.is_empty() {
            bail!("Listener must be written as <channel>:<event>, got {arg}");
        }
        listeners.push((channel.to_owned(), event.to_owned()));
    }

    Ok(Args { config, listeners })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => EchoConfig::from_file(path)?,
        None => EchoConfig::load()?,
    };

    init_tracing(config.debug);

    let client = Arc::new(MemoryClient::new());
    let backend = Backend::new(client.clone()).with_presence(Arc::new(MemoryPresenceFactory::new()));
    let echo = Echo::new(config.into_options(), backend)?;
    let socket = client.socket().context("Transport did not create a socket")?;

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut channels = BTreeSet::new();
    for (channel, event) in &args.listeners {
        let counter = Arc::clone(&delivered);
        let name = channel.clone();
        let label = event.clone();
        listen_qualified(&echo, channel, event, move |data: &Value| {
            counter.fetch_add(1, Ordering::Relaxed);
            info!(channel = %name, event = %label, data = %data, "Event delivered");
        })?;
        channels.insert(channel.clone());
    }

    // Grant pending authentications and confirm subscriptions as the server would.
    while socket.acknowledge_next(Ok(())) {}
    for channel in &channels {
        socket.confirm_subscription(channel);
    }

    let mut lines = 0usize;
    let stdin = std::io::stdin();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;

        match codec::decode_publication(&line) {
            Ok(publication) => {
                let watchers = socket.deliver(&publication.channel, &publication.envelope);
                if watchers == 0 {
                    debug!(channel = %publication.channel, "No watcher for channel");
                }
            }
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed publication"),
        }
    }

    info!(
        lines,
        delivered = delivered.load(Ordering::Relaxed),
        "Replay finished"
    );
    echo.disconnect()?;

    Ok(())
}
