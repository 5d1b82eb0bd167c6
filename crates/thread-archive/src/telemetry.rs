// thread-archive/crates/thread-archive/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: crate logs at info, noisy
/// connection-pool and HTTP internals at warn.
pub const DEFAULT_LOG_FILTER: &str = "info,r2d2=warn,hyper=warn,reqwest=warn";

pub fn init_tracing() -> bool {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    init_tracing_with(&env_filter)
}

/// Install the global subscriber. Returns `false` if one was already set
/// (tests and embedding hosts call this more than once).
pub fn init_tracing_with(filter: &str) -> bool {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_harmless() {
        init_tracing_with("debug");
        assert!(!init_tracing_with("info"));
    }
}
