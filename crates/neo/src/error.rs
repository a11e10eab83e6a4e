use auction_notary::{ActorError, WatchError};
use auction_primitives::{ExecError, Hash160, Hash256, WireError};
use bitcoin::base58;
use jsonrpsee::core::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("base58: {0}")]
    Base58(#[from] base58::Error),

    #[error("not a compressed-key WIF")]
    Wif,

    #[error("private key is out of range")]
    Scalar,

    #[error("'{0}' is not an N3 address")]
    Address(String),
}

#[derive(Debug, Error)]
pub enum NeoError {
    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),

    #[error("encode: {0}")]
    Wire(#[from] WireError),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("application log: {0}")]
    Exec(#[from] ExecError),

    #[error("node returned invalid {what} '{value}'")]
    BadNumber { what: &'static str, value: String },

    /// Test invocation did not halt.
    #[error("script faulted: {0}")]
    Faulted(String),

    /// Too close to the main transaction's expiry to build a fallback.
    #[error("no fallback window at height {height} for valid_until_block {valid_until_block}")]
    NoFallbackWindow { height: u32, valid_until_block: u32 },

    #[error("transaction {tx} not executed by block {valid_until_block}")]
    Expired { tx: Hash256, valid_until_block: u32 },

    #[error("watch: {0}")]
    Watch(#[from] WatchError),

    #[error("account {0} does not sign this transaction")]
    NotASigner(Hash160),
}

impl From<NeoError> for ActorError {
    fn from(e: NeoError) -> Self {
        match e {
            NeoError::Rpc(ClientError::Call(obj)) => ActorError::Rejected(obj.message().to_owned()),
            e @ (NeoError::Faulted(_)
            | NeoError::NotASigner(_)
            | NeoError::NoFallbackWindow { .. }
            | NeoError::Expired { .. }) => ActorError::Rejected(e.to_string()),
            e => ActorError::Rpc(e.to_string()),
        }
    }
}
