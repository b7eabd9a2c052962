//! Tracing bootstrap for the CLI
//!
//! Logs go to stderr so stdout carries only stream messages.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,linestream=info,linestream_core=info";

/// Install the global subscriber
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `LINESTREAM_LOG`
/// 3) internal default filter, raised to debug by `verbose`
pub fn init(verbose: bool) {
    let env_filter = filter_from_env(verbose);
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(filter) = env::var("LINESTREAM_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
    {
        return filter;
    }

    if verbose {
        EnvFilter::new("info,linestream=debug,linestream_core=debug")
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}
