//! linestream - follow a newline-delimited JSON stream from the terminal

mod args;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use linestream_core::{LifecycleEvent, StreamConfig, StreamEngine};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::args::Args;

fn load_config(args: &Args) -> Result<StreamConfig> {
    let config = match args.config.clone().or_else(StreamConfig::default_path) {
        Some(path) => StreamConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StreamConfig::default(),
    };
    args.apply(config).context("invalid stream settings")
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Started => info!("Stream started"),
        LifecycleEvent::StateChanged { state, error: None } => {
            info!("Stream {}", state)
        }
        LifecycleEvent::StateChanged {
            state,
            error: Some(err),
        } => error!("Stream {}: {}", state, err),
        LifecycleEvent::KeepAliveReceived => debug!("Keep-alive received"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = load_config(&args)?;
    let request = args.request(Arc::new(args.credentials()));
    let max_messages = args.max_messages;

    let mut delivered = 0usize;
    let engine = StreamEngine::builder(
        move || request.clone(),
        move |message| {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{}", message).and_then(|_| stdout.flush()) {
                // Downstream pipe closed; nothing left to write to
                debug!("stdout closed: {}", e);
                return false;
            }
            delivered += 1;
            max_messages.map_or(true, |max| delivered < max)
        },
    )
    .config(config)
    .build();

    engine.events().subscribe(log_event);

    let control = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping stream");
            control.stop();
        }
    });

    engine.start().await.context("stream failed")?;
    Ok(())
}
