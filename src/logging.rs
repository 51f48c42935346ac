//! Tracing setup for the binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: our crate at `log_level`, deps at warn.
pub fn default_filter(log_level: &str) -> EnvFilter {
    let level = log_level.trim().to_ascii_lowercase();
    EnvFilter::try_new(format!("warn,timeline_sync={}", level))
        .unwrap_or_else(|_| EnvFilter::new("warn,timeline_sync=info"))
}

/// Initialize tracing once; `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .try_init();
}
