//! Logging setup.
//!
//! Plain `tracing-subscriber` fmt output filtered by the configured level.
//! `RUST_LOG` wins when set.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Map a configured level name to a filter directive.
///
/// Returns `None` for names we don't know.
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "err" | "fatal" => Some("error"),
        _ => None,
    }
}

/// Install the global subscriber.
pub fn init(level: &str) -> Result<()> {
    let directive = level_directive(level);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or("info")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    if directive.is_none() {
        tracing::warn!("unknown log level '{}', using info", level);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_aliases() {
        assert_eq!(level_directive("WARNING"), Some("warn"));
        assert_eq!(level_directive("err"), Some("error"));
        assert_eq!(level_directive("fatal"), Some("error"));
        assert_eq!(level_directive(" debug "), Some("debug"));
        assert_eq!(level_directive("loud"), None);
    }
}
