//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set. Otherwise the mailwire crates log at `info`,
//! or `debug` when the client config has `debug` enabled.

use mailwire_domain::{ClientConfig, MailwireError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Default filter directive for `config`.
pub fn default_directive(config: &ClientConfig) -> &'static str {
    if config.debug {
        "warn,mailwire_core=debug,mailwire_infra=debug"
    } else {
        "warn,mailwire_core=info,mailwire_infra=info"
    }
}

/// Install the global subscriber.
///
/// # Errors
/// `Config` when a global subscriber is already installed.
pub fn init_tracing(config: &ClientConfig, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(true)).try_init()
        }
    };
    installed.map_err(|e| MailwireError::Config(format!("tracing already initialised: {e}")))
}
