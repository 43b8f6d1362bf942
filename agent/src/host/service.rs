use std::path::Path;

use crate::process;
use crate::util::Error;

/// Thin wrapper over `systemctl`. There is only one service manager family
/// this agent targets, so unlike the package adapter there is nothing to
/// detect — the commands are invoked directly and fail loudly if `systemctl`
/// is missing.
pub struct Service;

impl Service {
    pub async fn daemon_reload(step: &str, log_sink: &Path) -> Result<(), Error> {
        process::must_run(step, &["systemctl", "daemon-reload"], log_sink).await?;
        Ok(())
    }

    pub async fn restart(step: &str, unit: &str, log_sink: &Path) -> Result<(), Error> {
        process::must_run(step, &["systemctl", "restart", unit], log_sink).await?;
        Ok(())
    }

    /// Returns whether `systemctl is-active <unit>` reports `active`. A
    /// nonzero exit is treated as "not active" rather than propagated, since
    /// `is-active` itself exits nonzero for every state but `active`.
    pub async fn is_active(unit: &str, log_sink: &Path) -> Result<bool, Error> {
        let result = process::run(&["systemctl", "is-active", unit], log_sink).await?;
        Ok(result.stdout == "active")
    }
}
