use super::FormatError;
use crate::communication::RouterError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Format: {0}")]
    Format(#[from] FormatError),
    #[error("Router: {0}")]
    Router(#[from] RouterError),
    /// The OBC answered with an error frame
    #[error("Remote: {command:?} failed with code {code}")]
    Remote { command: String, code: u8 },
    #[error("Decode: {0:?}")]
    Decode(anyhow::Error),
    /// A polling operation gave up
    #[error("Timeout: gave up after {waited:?}")]
    Timeout { waited: Duration },
}

impl ClientError {
    /// True when no (matching) response arrived in time, as opposed to an error response
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. } | ClientError::Router(RouterError::Timeout(_)))
    }
}
