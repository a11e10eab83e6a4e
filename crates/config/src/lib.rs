//! Backend configuration, loaded once from TOML at startup.

mod config;
mod error;

pub use config::{
    CallConfig, Config, DepositConfig, LoggingConfig, NotaryConfig, RpcConfig, SignerConfig,
    StorageConfig, ValidatorConfig,
};
pub use error::ConfigError;
