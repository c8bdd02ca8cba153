//! Tracing setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
#[must_use]
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "echo=debug"
    } else {
        "echo=info"
    }
}

/// Install the global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(debug: bool) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "echo=debug");
        assert_eq!(default_filter(false), "echo=info");
    }

    #[test]
    fn test_second_init_is_refused() {
        init_tracing(false);
        assert!(!init_tracing(true));
    }
}
