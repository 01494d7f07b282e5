//! Logging setup shared by every binary in the workspace.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Targets that are too chatty at `debug` and below.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "mio"];

/// Filter directives for `level`: the level itself plus quiet targets
/// capped at `info`.
fn directives(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    QUIET_TARGETS
        .iter()
        .fold(level.to_string(), |acc, target| format!("{},{}=info", acc, target))
}

/// Installs the global subscriber. `RUST_LOG` wins over `level`; an
/// unparsable level falls back to `info`.
pub fn init(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    tracing::debug!(level, "Logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        assert_eq!(directives("debug"), "debug,hyper=info,hyper_util=info,mio=info");
        assert_eq!(directives("  "), "info,hyper=info,hyper_util=info,mio=info");
        assert!(EnvFilter::try_new(directives("warn")).is_ok());
    }
}
