pub(crate) mod colors;

mod error;

pub use error::*;

/// Name this agent stamps into log lines and startup banners.
pub(crate) const AGENT_NAME: &str = "cupcake-agent";
