//! Consumes the notary request feed.

use std::{num::NonZeroUsize, sync::Arc};

use anyhow::Context;
use auction_config::NotaryConfig;
use auction_primitives::{Hash256, NotaryRequest};
use auction_tasks::ShutdownGuard;
use auction_validator::{CallDescriptor, ScriptValidator};
use lru::LruCache;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};
use tracing::*;

use crate::{
    actions::PostConfirmActions,
    coordinator::SubmissionCoordinator,
    error::SubmissionError,
    store::{MediaSource, ObjectStore},
    traits::{ChainWatcher, ContractInvoker, NotaryActor},
};

/// Bounded channel sized from config, feeding [`notary_request_worker`].
pub fn request_channel(
    config: &NotaryConfig,
) -> (mpsc::Sender<NotaryRequest>, mpsc::Receiver<NotaryRequest>) {
    mpsc::channel(config.request_buffer.max(1))
}

/// Remembers which requests were already taken.
#[derive(Debug)]
struct SeenRequests(LruCache<Hash256, ()>);

impl SeenRequests {
    fn new(cap: NonZeroUsize) -> Self {
        Self(LruCache::new(cap))
    }

    /// Returns false for a repeat.
    fn insert(&mut self, hash: Hash256) -> bool {
        self.0.put(hash, ()).is_none()
    }
}

/// Validates each request before any signature is made and runs accepted
/// ones concurrently, up to `max_concurrent_submissions` at a time.
///
/// Returns once the feed closes or shutdown is requested, after in-flight
/// submissions have finished or observed the shutdown.
pub async fn notary_request_worker<A, W, S, M, I>(
    config: &NotaryConfig,
    validator: ScriptValidator,
    coordinator: Arc<SubmissionCoordinator<A, W>>,
    actions: Arc<PostConfirmActions<S, M, I>>,
    mut requests: mpsc::Receiver<NotaryRequest>,
    shutdown: ShutdownGuard,
) -> anyhow::Result<()>
where
    A: NotaryActor + 'static,
    W: ChainWatcher + 'static,
    S: ObjectStore + 'static,
    M: MediaSource + 'static,
    I: ContractInvoker + 'static,
{
    let seen_cap = NonZeroUsize::new(config.seen_request_cache)
        .context("seen_request_cache must be non-zero")?;
    let mut seen = SeenRequests::new(seen_cap);
    let permits = Arc::new(Semaphore::new(config.max_concurrent_submissions.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        let request = tokio::select! {
            biased;

            _ = shutdown.wait_for_shutdown() => {
                info!("notary worker received shutdown");
                break;
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "submission task panicked");
                }
                continue;
            }

            maybe = requests.recv() => match maybe {
                Some(request) => request,
                None => {
                    warn!("notary request feed closed; exiting");
                    break;
                }
            }
        };

        if !seen.insert(request.hash) {
            debug!(request = %request.hash, "duplicate notary request");
            continue;
        }

        let call = match validator.validate(&request.main_transaction.script) {
            Ok(call) => call,
            Err(e) => {
                warn!(request = %request.hash, error = %e, "rejected notary request");
                continue;
            }
        };
        info!(request = %request.hash, op = %call.operation, "accepted notary request");

        let permit = tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            permit = permits.clone().acquire_owned() => permit.context("submission limiter closed")?,
        };

        let coordinator = coordinator.clone();
        let actions = actions.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let _permit = permit;
            handle_submission(&coordinator, &actions, request, call, &shutdown).await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "submission task panicked");
        }
    }

    Ok(())
}

async fn handle_submission<A, W, S, M, I>(
    coordinator: &SubmissionCoordinator<A, W>,
    actions: &PostConfirmActions<S, M, I>,
    request: NotaryRequest,
    call: CallDescriptor,
    shutdown: &ShutdownGuard,
) where
    A: NotaryActor,
    W: ChainWatcher,
    S: ObjectStore,
    M: MediaSource,
    I: ContractInvoker,
{
    let id = request.hash;
    let confirmation = match coordinator.submit(&request, &call, shutdown).await {
        Ok(conf) => conf,
        Err(SubmissionError::Cancelled) => {
            debug!(request = %id, "submission cancelled");
            return;
        }
        Err(e @ SubmissionError::Signature(_)) => {
            warn!(request = %id, op = %call.operation, error = %e, "refusing to co-sign");
            return;
        }
        Err(e @ SubmissionError::OnChainExecutionFailed { .. }) => {
            warn!(request = %id, op = %call.operation, error = %e, "call rejected on chain");
            return;
        }
        Err(e) => {
            error!(request = %id, op = %call.operation, error = %e, "submission failed");
            return;
        }
    };

    match actions.run(&call, &confirmation, shutdown).await {
        Ok(outcome) => debug!(request = %id, ?outcome, "post-confirm action done"),
        Err(e) => error!(request = %id, op = %call.operation, error = %e, "post-confirm action failed"),
    }
}
