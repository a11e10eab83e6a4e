//! Starts the backend's long-running tasks.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use auction_config::NotaryConfig;
use auction_neo::{chain_poller_task, NeoRpc, RpcProtocol};
use auction_notary::{
    notary_request_worker, request_channel, ChainEventHub, ChainWatcher, ContractInvoker,
    MediaSource, NotaryActor, ObjectStore, PostConfirmActions, SubmissionCoordinator,
};
use auction_tasks::ShutdownSignal;
use auction_validator::ScriptValidator;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tokio::task::JoinSet;
use tracing::*;

use crate::rpc::{AuctionApiServer, AuctionRpcServer, NotaryDepositor};

/// Caps the configured validity window at what the node accepts.
pub(crate) fn effective_notary_config(
    config: &NotaryConfig,
    protocol: &RpcProtocol,
) -> NotaryConfig {
    let mut notary = config.clone();
    let max = protocol.max_valid_until_block_increment;
    if notary.vub_increment > max {
        warn!(configured = %notary.vub_increment, %max, "vub_increment above node limit, capping");
        notary.vub_increment = max;
    }
    notary
}

/// Spawns the chain poller and the request worker it feeds.
#[expect(
    clippy::too_many_arguments,
    reason = "every service dependency is passed in explicitly"
)]
pub(crate) fn start_notary_services<R, A, W, S, M, I>(
    tasks: &mut JoinSet<anyhow::Result<()>>,
    config: NotaryConfig,
    rpc: Arc<R>,
    hub: ChainEventHub,
    validator: ScriptValidator,
    coordinator: Arc<SubmissionCoordinator<A, W>>,
    actions: Arc<PostConfirmActions<S, M, I>>,
    signal: &ShutdownSignal,
) where
    R: NeoRpc + 'static,
    A: NotaryActor + 'static,
    W: ChainWatcher + 'static,
    S: ObjectStore + 'static,
    M: MediaSource + 'static,
    I: ContractInvoker + 'static,
{
    let (req_tx, req_rx) = request_channel(&config);

    let poller_config = config.clone();
    let guard = signal.subscribe();
    tasks.spawn(async move { chain_poller_task(rpc, hub, req_tx, &poller_config, guard).await });

    let guard = signal.subscribe();
    tasks.spawn(async move {
        notary_request_worker(&config, validator, coordinator, actions, req_rx, guard).await
    });
}

/// Serves the `auction_*` methods on `listen_addr`.
pub(crate) async fn start_deposit_rpc<D: NotaryDepositor + 'static>(
    listen_addr: &str,
    depositor: Arc<D>,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let server = ServerBuilder::new()
        .build(listen_addr)
        .await
        .with_context(|| format!("failed to bind deposit rpc on {listen_addr}"))?;
    let addr = server.local_addr()?;

    let handle = server.start(AuctionRpcServer::new(depositor).into_rpc());
    info!(%addr, "deposit rpc listening");
    Ok((addr, handle))
}
