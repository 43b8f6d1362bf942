#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    #[error("Step `{step}` failed running `{command}` (exit code {exit_code:?})")]
    SubprocessFailed {
        step: String,
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Deadline exceeded: {0}")]
    Deadline(String),

    #[error("Snapshot upload failed: {0}")]
    Upload(String),
}
