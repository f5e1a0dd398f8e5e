use tracing_subscriber::{fmt, EnvFilter};

use crate::{Error, Result};

/// Initialize tracing for a binary.
///
/// Default: info for our crates (debug with `verbose`), warn for everything else.
/// `RUST_LOG` overrides both.
pub fn init(service_name: &str, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tgcp={level},tgcp_core={level},tgcp_mtproto={level},tgcp_telegram={level},{}={level}",
            service_name.replace('-', "_")
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to init logging: {e}")))
}
