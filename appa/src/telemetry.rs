use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` wins when set;
/// otherwise crate-level info. Call once from the host binary.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appa=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
