use std::io;

use crate::types::XioState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid parameter: '{0}'")]
    InvalidParameter(String),
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: XioState,
    },
    #[error("Option not supported: '{0}'")]
    UnsupportedOption(String),
    #[error("Option conflict: {0}")]
    OptionConflict(String),
    #[error("Could not resolve '{0}'")]
    Resolve(String),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("TLS engine error: {0}")]
    Tls(String),
}

impl Error {
    pub(crate) fn invalid_state(operation: &'static str, state: XioState) -> Self {
        Error::InvalidState { operation, state }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
