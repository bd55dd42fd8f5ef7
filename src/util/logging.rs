use tracing_subscriber::EnvFilter;

/// Target used for raw inbound/outbound frame tracing (`RUST_LOG=pubsub_edge::frames=trace`).
pub const FRAME_TARGET: &str = "pubsub_edge::frames";

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))) // uses RUST_LOG
        .with_target(true) // shows the module path
        .with_level(true) // shows log level
        .init();
}
