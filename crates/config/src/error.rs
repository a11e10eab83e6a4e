use std::{io, path::PathBuf};

use thiserror::Error;

/// Fatal startup errors from loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rpc.endpoint must not be empty")]
    EmptyEndpoint,

    #[error("validator.max_call_flags {0} exceeds the highest defined call flag value")]
    CallFlagsOutOfRange(u8),

    #[error("validator.calls must name at least one call")]
    NoCalls,

    #[error("validator call entry with an empty name")]
    EmptyCallName,

    #[error("validator call '{0}' is configured twice")]
    DuplicateCall(String),

    /// Only one of `method` and `args` was given.
    #[error("validator call '{0}' must set both method and args, or neither")]
    PartialAbi(String),

    #[error("{0} must be non-zero")]
    ZeroLimit(&'static str),

    #[error("storage.container must not be empty")]
    EmptyContainer,

    #[error("storage.gateway_url must not be empty")]
    EmptyGateway,

    #[error("deposit.amount must be positive, got {0}")]
    DepositAmount(i64),
}
