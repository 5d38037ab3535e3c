//! Tracing subscriber bootstrap for binaries and services embedding the engine.

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose connection-level chatter is capped at `warn`.
const NOISY_CRATES: &[&str] = &["hyper", "h2", "reqwest", "rustls"];

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to everything
/// and the HTTP stack is quieted. Calling this twice is not an error, the
/// first subscriber stays installed.
pub fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(default_level)?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
    if installed.is_err() {
        tracing::debug!("[Logging] subscriber already installed, keeping it");
    }
    Ok(())
}

fn default_filter(default_level: &str) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(default_level)
        .with_context(|| format!("Invalid log level directive: {default_level}"))?;
    for target in NOISY_CRATES {
        filter = filter.add_directive(
            format!("{target}=warn")
                .parse()
                .with_context(|| format!("Invalid log directive for {target}"))?,
        );
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_accepts_levels_and_directives() {
        assert!(default_filter("info").is_ok());
        assert!(default_filter("quotesync=debug,warn").is_ok());
    }

    #[test]
    fn default_filter_rejects_garbage() {
        assert!(default_filter("quotesync=loud").is_err());
    }

    #[test]
    fn init_twice_is_harmless() {
        assert!(init_logging("warn").is_ok());
        assert!(init_logging("warn").is_ok());
    }
}
