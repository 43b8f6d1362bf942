pub mod consensus;
pub mod package;
pub mod service;

use std::path::Path;

/// Returns true if `program` resolves to an executable file on `PATH`.
///
/// Probed fresh at every call site rather than cached, since an upgrade in
/// progress is exactly the situation where the tooling on `PATH` can change
/// out from under a long-lived cache.
pub(crate) fn on_path(program: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| is_executable(&dir.join(program)))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
