//! Logging setup for the packager.
//!
//! Events go to stderr through `tracing-subscriber`, as human-readable lines
//! or as JSON objects. Stdout is kept for command output.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogConfig {
    /// One JSON object per event
    pub json: bool,
    /// Default to DEBUG instead of INFO
    pub verbose: bool,
    /// No output at all, whatever `RUST_LOG` says
    pub silent: bool,
}

/// Install the global subscriber. Call once, after the config is resolved.
///
/// `RUST_LOG` replaces the default filter unless `silent` is set.
pub fn init(config: LogConfig) {
    let filter = if config.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.verbose)))
    };

    let json_layer = config.json.then(|| {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Default filter: this crate only, at INFO or DEBUG.
fn filter_directive(verbose: bool) -> String {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_this_crate() {
        assert_eq!(filter_directive(false), "aip_packager=info");
        assert_eq!(filter_directive(true), "aip_packager=debug");
    }
}
