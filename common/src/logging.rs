use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber from the `LOG_LEVEL` environment
/// variable (`debug` / `info` / `warn` / `error`, default `info`).
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
