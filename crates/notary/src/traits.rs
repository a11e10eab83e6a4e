//! Seams to the chain: the backend's signing account and the source of
//! execution and block events.

use async_trait::async_trait;
use auction_primitives::{ArgValue, ExecutionResult, Hash160, Hash256, Transaction};

use crate::error::{ActorError, WatchError};

/// Identities handed back by the notary service for one request.
///
/// Exactly one of `main` and `fallback` can ever execute, and only at a
/// height up to `valid_until_block`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingSubmission {
    pub main: Hash256,
    pub fallback: Hash256,
    pub valid_until_block: u32,
}

/// The backend's notary-enabled account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotaryActor: Send + Sync {
    /// Script hash of the account the backend signs with.
    fn account(&self) -> Hash160;

    /// Fills the backend's invocation slot in `tx`.
    async fn sign(&self, tx: &mut Transaction) -> Result<(), ActorError>;

    /// Submits the co-signed main transaction with a freshly built fallback.
    async fn notarize(&self, tx: Transaction) -> Result<PendingSubmission, ActorError>;
}

/// Observes executed transactions and chain height.
#[async_trait]
pub trait ChainWatcher: Send + Sync {
    /// Resolves with the execution of `tx`, including one seen before the
    /// call was made.
    async fn wait_executed(&self, tx: Hash256) -> Result<ExecutionResult, WatchError>;

    /// Resolves once the chain has persisted the block at `height`.
    async fn wait_for_height(&self, height: u32) -> Result<(), WatchError>;

    /// Execution of `tx` if it has already been observed.
    fn lookup_execution(&self, tx: &Hash256) -> Option<ExecutionResult>;
}

/// Sends ordinary calls signed by the backend alone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractInvoker: Send + Sync {
    /// Invokes `method` on `contract` and waits for its execution.
    async fn send_call(
        &self,
        contract: Hash160,
        method: String,
        args: Vec<ArgValue>,
    ) -> Result<ExecutionResult, ActorError>;
}
