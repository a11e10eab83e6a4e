//! Polls the node for new blocks and notary pool entries.
//!
//! Every executed transaction of a new block is published to the
//! [`ChainEventHub`] before the block itself, so a waiter that wakes on the
//! height already finds the executions of that block. Main transactions
//! that show up in the notary pool are fetched once and forwarded to the
//! request worker.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use auction_config::NotaryConfig;
use auction_notary::{ChainEvent, ChainEventHub};
use auction_primitives::{Hash256, NotaryRequest};
use auction_tasks::ShutdownGuard;
use lru::LruCache;
use tokio::{sync::mpsc, time::sleep};
use tracing::*;

use crate::rpc::NeoRpc;

struct PollerState<R> {
    rpc: Arc<R>,
    hub: ChainEventHub,
    requests: mpsc::Sender<NotaryRequest>,
    /// Next block to read.
    next_block: u32,
    /// Main transactions already forwarded.
    forwarded: LruCache<Hash256, ()>,
}

/// Runs until shutdown or until the request worker goes away.
pub async fn chain_poller_task<R: NeoRpc>(
    rpc: Arc<R>,
    hub: ChainEventHub,
    requests: mpsc::Sender<NotaryRequest>,
    config: &NotaryConfig,
    shutdown: ShutdownGuard,
) -> anyhow::Result<()> {
    let cap = NonZeroUsize::new(config.seen_request_cache)
        .context("seen_request_cache must be non-zero")?;
    let height = rpc.height().await.context("fetching start height")?;
    hub.publish(ChainEvent::BlockAdded { height });
    info!(%height, "started chain poller");

    let mut state = PollerState {
        rpc,
        hub,
        requests,
        next_block: height + 1,
        forwarded: LruCache::new(cap),
    };
    let poll_dur = Duration::from_millis(config.poll_interval_ms);

    loop {
        if let Err(err) = poll_once(&mut state).await {
            if state.requests.is_closed() {
                return Err(err);
            }
            handle_poll_error(&err);
        }

        tokio::select! {
            _ = shutdown.wait_for_shutdown() => {
                info!("chain poller received shutdown");
                return Ok(());
            }
            _ = sleep(poll_dur) => {}
        }
    }
}

fn handle_poll_error(err: &anyhow::Error) {
    warn!(%err, "failed to poll node");
}

async fn poll_once<R: NeoRpc>(state: &mut PollerState<R>) -> anyhow::Result<()> {
    poll_blocks(state).await?;
    poll_notary_pool(state).await
}

async fn poll_blocks<R: NeoRpc>(state: &mut PollerState<R>) -> anyhow::Result<()> {
    let height = state.rpc.height().await?;

    while state.next_block <= height {
        let index = state.next_block;
        let txs = state
            .rpc
            .block_transactions(index)
            .await
            .with_context(|| format!("reading block {index}"))?;

        for tx in txs {
            let result = state
                .rpc
                .application_log(tx)
                .await?
                .into_result()
                .with_context(|| format!("application log of {tx}"))?;
            trace!(%tx, state = ?result.vm_state, "transaction executed");
            state.hub.publish(ChainEvent::TransactionExecuted(result));
        }

        state.hub.publish(ChainEvent::BlockAdded { height: index });
        debug!(height = %index, "block processed");
        state.next_block = index + 1;
    }
    Ok(())
}

async fn poll_notary_pool<R: NeoRpc>(state: &mut PollerState<R>) -> anyhow::Result<()> {
    for hash in state.rpc.notary_pool().await? {
        if state.forwarded.contains(&hash) {
            continue;
        }

        let main_transaction = match state.rpc.notary_transaction(hash).await {
            Ok(tx) => tx,
            Err(err) => {
                // may have left the pool since it was listed
                debug!(%hash, %err, "cannot fetch pooled transaction");
                continue;
            }
        };

        state.forwarded.put(hash, ());
        let request = NotaryRequest {
            hash,
            main_transaction,
        };
        if state.requests.send(request).await.is_err() {
            bail!("notary request worker is gone");
        }
        debug!(%hash, "forwarded notary request");
    }
    Ok(())
}
