//! Fan-out of chain events to every in-flight submission.
//!
//! Whatever transport follows the chain pushes [`ChainEvent`]s into the
//! hub. Executions are kept in a bounded cache so a waiter that subscribes
//! after its transaction executed still sees the result.

use std::{num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use auction_primitives::{ExecutionResult, Hash256};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};
use tracing::{trace, warn};

use crate::{error::WatchError, traits::ChainWatcher};

/// Broadcast backlog before slow waiters start lagging.
const EXECUTION_BACKLOG: usize = 256;

#[derive(Clone, Debug)]
pub enum ChainEvent {
    TransactionExecuted(ExecutionResult),
    /// A block was persisted. Executions of its transactions must be
    /// published before this event.
    BlockAdded { height: u32 },
}

#[derive(Debug)]
struct HubInner {
    executed_tx: broadcast::Sender<ExecutionResult>,
    recent: Mutex<LruCache<Hash256, ExecutionResult>>,
    height_tx: watch::Sender<u32>,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct ChainEventHub {
    inner: Arc<HubInner>,
}

impl ChainEventHub {
    pub fn new(execution_cache: usize) -> Self {
        let cap = NonZeroUsize::new(execution_cache).unwrap_or(NonZeroUsize::MIN);
        let (executed_tx, _) = broadcast::channel(EXECUTION_BACKLOG);
        let (height_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(HubInner {
                executed_tx,
                recent: Mutex::new(LruCache::new(cap)),
                height_tx,
            }),
        }
    }

    pub fn publish(&self, event: ChainEvent) {
        match event {
            ChainEvent::TransactionExecuted(result) => {
                trace!(tx = %result.tx_hash, state = ?result.vm_state, "execution observed");
                // cache first so a waiter that misses the broadcast finds it
                self.inner.recent.lock().put(result.tx_hash, result.clone());
                let _ = self.inner.executed_tx.send(result);
            }
            ChainEvent::BlockAdded { height } => {
                self.inner.height_tx.send_if_modified(|cur| {
                    if height > *cur {
                        *cur = height;
                        true
                    } else {
                        false
                    }
                });
            }
        }
    }

    /// Highest block height published so far.
    pub fn height(&self) -> u32 {
        *self.inner.height_tx.borrow()
    }
}

#[async_trait]
impl ChainWatcher for ChainEventHub {
    async fn wait_executed(&self, tx: Hash256) -> Result<ExecutionResult, WatchError> {
        let mut rx = self.inner.executed_tx.subscribe();
        if let Some(result) = self.lookup_execution(&tx) {
            return Ok(result);
        }

        loop {
            match rx.recv().await {
                Ok(result) if result.tx_hash == tx => return Ok(result),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%tx, %skipped, "execution waiter lagged");
                    if let Some(result) = self.lookup_execution(&tx) {
                        return Ok(result);
                    }
                }
                Err(RecvError::Closed) => return Err(WatchError::Closed),
            }
        }
    }

    async fn wait_for_height(&self, height: u32) -> Result<(), WatchError> {
        let mut rx = self.inner.height_tx.subscribe();
        rx.wait_for(|cur| *cur >= height)
            .await
            .map(|_| ())
            .map_err(|_| WatchError::Closed)
    }

    fn lookup_execution(&self, tx: &Hash256) -> Option<ExecutionResult> {
        self.inner.recent.lock().peek(tx).cloned()
    }
}
