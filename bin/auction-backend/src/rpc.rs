//! `auction_*` JSON-RPC methods served next to the notary worker.

use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use auction_config::DepositConfig;
use auction_neo::{script_hash_from_address, NeoActor, NeoError, NeoRpc};
use auction_notary::ChainWatcher;
use auction_primitives::{Hash160, Hash256};
use jsonrpsee::{
    core::RpcResult,
    proc_macros::rpc,
    types::{
        error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE},
        ErrorObjectOwned,
    },
};
use tracing::*;

#[cfg_attr(not(test), rpc(server, namespace = "auction"))]
#[cfg_attr(test, rpc(server, client, namespace = "auction"))]
pub(crate) trait AuctionApi {
    /// Tops up the notary deposit of an N3 address from the backend's GAS
    /// and returns the transfer transaction.
    #[method(name = "notaryDeposit")]
    async fn notary_deposit(&self, address: String) -> RpcResult<Hash256>;
}

/// Makes notary deposits on behalf of users.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait NotaryDepositor: Send + Sync {
    async fn deposit(&self, to: Hash160) -> Result<Hash256, NeoError>;
}

/// Deposits a fixed amount through the backend account.
pub(crate) struct ActorDepositor<R, W> {
    actor: Arc<NeoActor<R, W>>,
    amount: i64,
    till_blocks: u32,
}

impl<R, W> ActorDepositor<R, W> {
    pub(crate) fn new(actor: Arc<NeoActor<R, W>>, config: &DepositConfig) -> Self {
        Self {
            actor,
            amount: config.amount,
            till_blocks: config.till_blocks,
        }
    }
}

#[async_trait]
impl<R: NeoRpc, W: ChainWatcher> NotaryDepositor for ActorDepositor<R, W> {
    async fn deposit(&self, to: Hash160) -> Result<Hash256, NeoError> {
        self.actor
            .notary_deposit(to, self.amount, self.till_blocks)
            .await
    }
}

pub(crate) struct AuctionRpcServer<D> {
    depositor: Arc<D>,
}

impl<D> AuctionRpcServer<D> {
    pub(crate) fn new(depositor: Arc<D>) -> Self {
        Self { depositor }
    }
}

#[async_trait]
impl<D: NotaryDepositor + 'static> AuctionApiServer for AuctionRpcServer<D> {
    async fn notary_deposit(&self, address: String) -> RpcResult<Hash256> {
        let to = script_hash_from_address(&address).map_err(invalid_params_error)?;
        info!(%address, "notary deposit requested");

        self.depositor.deposit(to).await.map_err(|e| {
            warn!(%address, err = %e, "notary deposit failed");
            internal_error(e)
        })
    }
}

fn internal_error(msg: impl Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INTERNAL_ERROR_CODE, msg.to_string(), None::<()>)
}

fn invalid_params_error(msg: impl Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INVALID_PARAMS_CODE, msg.to_string(), None::<()>)
}
