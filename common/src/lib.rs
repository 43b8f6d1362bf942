pub mod logging;
pub mod metrics;
pub mod shutdown;

/// Enables or disables ANSI colors process-wide based on `DISABLE_COLORS`.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}
