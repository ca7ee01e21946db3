use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::{errors::Error, Result};

/// Adjusts the installed subscriber after startup.
pub struct LogHandle {
    service_name: String,
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Switch between `info` and `debug` for our crates. `RUST_LOG` still wins.
    pub fn set_verbose(&self, verbose: bool) -> Result<()> {
        self.filter
            .reload(build_filter(&self.service_name, verbose))
            .map_err(|e| Error::Config(format!("failed to update log filter: {e}")))
    }
}

/// Initialize logging/tracing for the bot.
///
/// Default: `info` for our crates (`debug` when `verbose`), `warn` for everything
/// else. Can be overridden with `RUST_LOG`. Install this before loading config so
/// config warnings are not lost; the returned handle applies the configured level.
pub fn init(service_name: &str, verbose: bool) -> Result<LogHandle> {
    let (filter, handle) = reload::Layer::new(build_filter(service_name, verbose));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(true))
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {e}")))?;

    Ok(LogHandle {
        service_name: service_name.to_string(),
        filter: handle,
    })
}

fn build_filter(service_name: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name, verbose)))
}

fn default_directives(service_name: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,wab={level},wab_core={level},wab_gateway={level},{service_name}={level}")
}
