use auction_primitives::{Hash160, Hash256, WitnessScope};
use thiserror::Error;

use crate::coordinator::Branch;

/// Failure reported by the signing or calling account.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    #[error("rpc: {0}")]
    Rpc(String),

    /// The node or notary service refused the transaction.
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("chain event source closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token name '{0}' cannot be used in a media url")]
    InvalidTokenName(String),

    #[error("object store: {0}")]
    Store(String),
}

/// The candidate is not in the partially-signed shape the backend co-signs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("backend account {0} is not a signer")]
    NotASigner(Hash160),

    #[error("{witnesses} witnesses for {signers} signers")]
    WitnessCount { signers: usize, witnesses: usize },

    #[error("backend witness slot is already filled")]
    SlotAlreadySigned,

    #[error("signer {0} has not supplied a witness")]
    MissingWitness(Hash160),

    /// Any scope but `None` would let the script act as the backend.
    #[error("backend signer has scope {0:?}, only None is co-signed")]
    BackendScope(WitnessScope),

    #[error("argument {0} names the backend account")]
    BackendAsArgument(usize),

    #[error("signing failed: {0}")]
    Actor(#[source] ActorError),
}

/// Errors from one pass through the submission state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("notarization: {0}")]
    Notarization(#[source] ActorError),

    /// Horizon passed with neither transaction executed. Both hashes are
    /// permanently invalid.
    #[error("neither {main} nor {fallback} executed by block {valid_until_block}")]
    Expired {
        main: Hash256,
        fallback: Hash256,
        valid_until_block: u32,
    },

    /// Confirmed, but the VM faulted. Not retried.
    #[error("{branch} transaction {tx} faulted: {message}")]
    OnChainExecutionFailed {
        tx: Hash256,
        branch: Branch,
        message: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("watch: {0}")]
    Watch(#[from] WatchError),
}

/// Errors running a post-confirmation action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("invoke: {0}")]
    Invoke(#[from] ActorError),

    #[error("{method} faulted: {message}")]
    CallFaulted { method: &'static str, message: String },

    #[error("argument {0} missing or of the wrong type")]
    BadArgument(usize),
}
