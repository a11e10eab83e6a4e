//! Drives one notary request from co-signing to confirmation.

use std::{fmt, sync::Arc};

use auction_primitives::{ArgValue, ExecutionResult, NotaryRequest, Transaction, WitnessScope};
use auction_tasks::ShutdownGuard;
use auction_validator::CallDescriptor;
use tracing::*;

use crate::{
    error::{SignatureError, SubmissionError},
    traits::{ChainWatcher, NotaryActor, PendingSubmission},
};

/// Which of the two notarized transactions made it on chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Branch {
    Main,
    Fallback,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Main => f.write_str("main"),
            Branch::Fallback => f.write_str("fallback"),
        }
    }
}

/// The single outcome of a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub branch: Branch,
    pub result: ExecutionResult,
}

impl Confirmation {
    fn into_checked(self) -> Result<Self, SubmissionError> {
        if self.result.is_halt() {
            return Ok(self);
        }
        Err(SubmissionError::OnChainExecutionFailed {
            tx: self.result.tx_hash,
            branch: self.branch,
            message: self.result.exception.unwrap_or_default(),
        })
    }
}

pub struct SubmissionCoordinator<A, W> {
    actor: Arc<A>,
    watcher: Arc<W>,
}

impl<A, W> fmt::Debug for SubmissionCoordinator<A, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionCoordinator").finish_non_exhaustive()
    }
}

impl<A: NotaryActor, W: ChainWatcher> SubmissionCoordinator<A, W> {
    pub fn new(actor: Arc<A>, watcher: Arc<W>) -> Self {
        Self { actor, watcher }
    }

    /// Checks that `tx` waits for exactly the backend's signature and
    /// returns the backend's signer index.
    ///
    /// The backend only ever signs as a fee payer, so its signer must carry
    /// [`WitnessScope::None`].
    pub fn check_partially_signed(&self, tx: &Transaction) -> Result<usize, SignatureError> {
        let account = self.actor.account();
        let idx = tx
            .signer_index(&account)
            .ok_or(SignatureError::NotASigner(account))?;

        let scopes = tx.signers[idx].scopes;
        if scopes != WitnessScope::None {
            return Err(SignatureError::BackendScope(scopes));
        }

        if tx.witnesses.len() != tx.signers.len() {
            return Err(SignatureError::WitnessCount {
                signers: tx.signers.len(),
                witnesses: tx.witnesses.len(),
            });
        }

        for (i, (signer, witness)) in tx.signers.iter().zip(&tx.witnesses).enumerate() {
            match (i == idx, witness.is_unsigned()) {
                (true, false) => return Err(SignatureError::SlotAlreadySigned),
                (false, true) => return Err(SignatureError::MissingWitness(signer.account)),
                _ => {}
            }
        }

        Ok(idx)
    }

    /// Rejects a call that names the backend account as one of its
    /// arguments, e.g. as the bidder of `makeBet`.
    pub fn check_call_arguments(&self, call: &CallDescriptor) -> Result<(), SignatureError> {
        let account = self.actor.account();
        match call
            .arguments
            .iter()
            .position(|arg| matches!(arg, ArgValue::Hash160(h) if *h == account))
        {
            Some(pos) => Err(SignatureError::BackendAsArgument(pos)),
            None => Ok(()),
        }
    }

    /// `Received -> Signed`.
    pub async fn sign(&self, tx: &mut Transaction) -> Result<(), SubmissionError> {
        self.check_partially_signed(tx)?;
        self.actor.sign(tx).await.map_err(SignatureError::Actor)?;
        Ok(())
    }

    /// `Signed -> Submitted`. Success only means the notary service took
    /// the request.
    pub async fn notarize(&self, tx: Transaction) -> Result<PendingSubmission, SubmissionError> {
        self.actor
            .notarize(tx)
            .await
            .map_err(SubmissionError::Notarization)
    }

    /// `Submitted -> Confirmed | Expired`.
    ///
    /// Races both identities against the horizon and resolves on the first
    /// event. Shutdown wins every race.
    pub async fn await_confirmation(
        &self,
        pending: &PendingSubmission,
        shutdown: &ShutdownGuard,
    ) -> Result<Confirmation, SubmissionError> {
        let confirmation = tokio::select! {
            biased;

            _ = shutdown.wait_for_shutdown() => return Err(SubmissionError::Cancelled),

            res = self.watcher.wait_executed(pending.main) => Confirmation {
                branch: Branch::Main,
                result: res?,
            },

            res = self.watcher.wait_executed(pending.fallback) => Confirmation {
                branch: Branch::Fallback,
                result: res?,
            },

            res = self.watcher.wait_for_height(pending.valid_until_block) => {
                res?;
                self.late_confirmation(pending)?
            }
        };

        confirmation.into_checked()
    }

    /// Last look in the execution cache once the horizon is reached.
    fn late_confirmation(
        &self,
        pending: &PendingSubmission,
    ) -> Result<Confirmation, SubmissionError> {
        let found = self
            .watcher
            .lookup_execution(&pending.main)
            .map(|result| Confirmation {
                branch: Branch::Main,
                result,
            })
            .or_else(|| {
                self.watcher
                    .lookup_execution(&pending.fallback)
                    .map(|result| Confirmation {
                        branch: Branch::Fallback,
                        result,
                    })
            });

        found.ok_or(SubmissionError::Expired {
            main: pending.main,
            fallback: pending.fallback,
            valid_until_block: pending.valid_until_block,
        })
    }

    /// Runs the whole state machine for one request.
    ///
    /// `call` is what the validator made of the request's script.
    pub async fn submit(
        &self,
        request: &NotaryRequest,
        call: &CallDescriptor,
        shutdown: &ShutdownGuard,
    ) -> Result<Confirmation, SubmissionError> {
        let id = request.hash;
        let mut tx = request.main_transaction.clone();

        self.check_call_arguments(call)?;
        self.sign(&mut tx).await?;
        debug!(request = %id, "signed");

        if shutdown.should_shutdown() {
            return Err(SubmissionError::Cancelled);
        }

        let pending = self.notarize(tx).await?;
        info!(
            request = %id,
            main = %pending.main,
            fallback = %pending.fallback,
            vub = pending.valid_until_block,
            "notarize sending"
        );

        let res = self.await_confirmation(&pending, shutdown).await;
        match &res {
            Ok(conf) => info!(
                request = %id,
                branch = %conf.branch,
                tx = %conf.result.tx_hash,
                gas = conf.result.gas_consumed,
                "confirmed"
            ),
            Err(SubmissionError::Expired { .. }) => warn!(
                request = %id,
                main = %pending.main,
                fallback = %pending.fallback,
                vub = pending.valid_until_block,
                "submission expired"
            ),
            Err(_) => {}
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use auction_primitives::{Hash160, Hash256, Signer, VmState, Witness};
    use auction_script::CallFlags;
    use auction_tasks::ShutdownSignal;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        error::{ActorError, WatchError},
        hub::{ChainEvent, ChainEventHub},
        traits::MockNotaryActor,
    };

    /// Resolves only what it is told to; everything else stays pending.
    #[derive(Default)]
    struct FakeWatcher {
        executed: Vec<ExecutionResult>,
        /// Visible to lookups only, as if published while nobody waited.
        cached: Vec<ExecutionResult>,
        horizon_reached: bool,
        closed: bool,
    }

    #[async_trait]
    impl ChainWatcher for FakeWatcher {
        async fn wait_executed(&self, tx: Hash256) -> Result<ExecutionResult, WatchError> {
            if self.closed {
                return Err(WatchError::Closed);
            }
            match self.executed.iter().find(|e| e.tx_hash == tx) {
                Some(e) => Ok(e.clone()),
                None => std::future::pending().await,
            }
        }

        async fn wait_for_height(&self, _height: u32) -> Result<(), WatchError> {
            if self.horizon_reached {
                Ok(())
            } else {
                std::future::pending().await
            }
        }

        fn lookup_execution(&self, tx: &Hash256) -> Option<ExecutionResult> {
            self.cached
                .iter()
                .chain(&self.executed)
                .find(|e| &e.tx_hash == tx)
                .cloned()
        }
    }

    const BACKEND: Hash160 = Hash160::new([0xbb; 20]);
    const USER: Hash160 = Hash160::new([0x0a; 20]);
    const MAIN: Hash256 = Hash256::new([1; 32]);
    const FALLBACK: Hash256 = Hash256::new([2; 32]);

    fn pending() -> PendingSubmission {
        PendingSubmission {
            main: MAIN,
            fallback: FALLBACK,
            valid_until_block: 100,
        }
    }

    fn signed(bytes: &[u8]) -> Witness {
        Witness {
            invocation: bytes.to_vec(),
            verification: vec![0x41],
        }
    }

    fn candidate() -> Transaction {
        Transaction {
            hash: Hash256::new([9; 32]),
            version: 0,
            nonce: 7,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 100,
            signers: vec![
                Signer {
                    account: BACKEND,
                    scopes: WitnessScope::None,
                },
                Signer {
                    account: USER,
                    scopes: WitnessScope::CalledByEntry,
                },
            ],
            attributes: Vec::new(),
            script: vec![0x40],
            witnesses: vec![Witness::default(), signed(&[0xcc; 64])],
        }
    }

    fn bet(bidder: Hash160) -> CallDescriptor {
        CallDescriptor {
            operation: "makeBet".into(),
            target: Hash160::new([0x5a; 20]),
            method: "makeBet".into(),
            call_flags: CallFlags::ALL,
            arguments: vec![ArgValue::Hash160(bidder), ArgValue::Integer(1_000_000)],
        }
    }

    fn exec(tx: Hash256, vm_state: VmState) -> ExecutionResult {
        ExecutionResult {
            tx_hash: tx,
            vm_state,
            exception: (vm_state == VmState::Fault).then(|| "bet is too low".to_owned()),
            gas_consumed: 1_000,
            stack: Vec::new(),
            notifications: Vec::new(),
        }
    }

    fn actor() -> MockNotaryActor {
        let mut actor = MockNotaryActor::new();
        actor.expect_account().return_const(BACKEND);
        actor
    }

    fn coordinator<W: ChainWatcher>(
        actor: MockNotaryActor,
        watcher: W,
    ) -> SubmissionCoordinator<MockNotaryActor, W> {
        SubmissionCoordinator::new(Arc::new(actor), Arc::new(watcher))
    }

    #[test]
    fn test_partially_signed_shape() {
        let coord = coordinator(actor(), ChainEventHub::new(4));
        assert_eq!(coord.check_partially_signed(&candidate()), Ok(0));

        let mut tx = candidate();
        tx.signers.remove(0);
        tx.witnesses.remove(0);
        assert_eq!(
            coord.check_partially_signed(&tx),
            Err(SignatureError::NotASigner(BACKEND))
        );

        let mut tx = candidate();
        tx.witnesses.pop();
        assert_eq!(
            coord.check_partially_signed(&tx),
            Err(SignatureError::WitnessCount {
                signers: 2,
                witnesses: 1
            })
        );

        let mut tx = candidate();
        tx.witnesses[0] = signed(&[1]);
        assert_eq!(
            coord.check_partially_signed(&tx),
            Err(SignatureError::SlotAlreadySigned)
        );

        let mut tx = candidate();
        tx.witnesses[1] = Witness::default();
        assert_eq!(
            coord.check_partially_signed(&tx),
            Err(SignatureError::MissingWitness(USER))
        );
    }

    #[test]
    fn test_backend_scope_must_be_none() {
        let coord = coordinator(actor(), ChainEventHub::new(4));
        for scopes in [
            WitnessScope::CalledByEntry,
            WitnessScope::CustomContracts,
            WitnessScope::Global,
        ] {
            let mut tx = candidate();
            tx.signers[0].scopes = scopes;
            assert_eq!(
                coord.check_partially_signed(&tx),
                Err(SignatureError::BackendScope(scopes))
            );
        }
    }

    #[tokio::test]
    async fn test_global_backend_signer_is_never_signed() {
        let signal = ShutdownSignal::new();
        let mut actor = actor();
        actor.expect_sign().never();
        actor.expect_notarize().never();
        let coord = coordinator(actor, ChainEventHub::new(4));

        let mut tx = candidate();
        tx.signers[0].scopes = WitnessScope::Global;
        let request = NotaryRequest {
            hash: tx.hash,
            main_transaction: tx,
        };
        let err = coord
            .submit(&request, &bet(USER), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Signature(SignatureError::BackendScope(WitnessScope::Global))
        );
    }

    #[tokio::test]
    async fn test_backend_as_bidder_is_never_signed() {
        let signal = ShutdownSignal::new();
        let mut actor = actor();
        actor.expect_sign().never();
        actor.expect_notarize().never();
        let coord = coordinator(actor, ChainEventHub::new(4));

        assert_eq!(coord.check_call_arguments(&bet(USER)), Ok(()));

        let request = NotaryRequest {
            hash: Hash256::new([9; 32]),
            main_transaction: candidate(),
        };
        let err = coord
            .submit(&request, &bet(BACKEND), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Signature(SignatureError::BackendAsArgument(0))
        );
    }

    #[tokio::test]
    async fn test_bad_shape_is_never_signed() {
        let signal = ShutdownSignal::new();
        let mut actor = actor();
        actor.expect_sign().never();
        actor.expect_notarize().never();
        let coord = coordinator(actor, ChainEventHub::new(4));

        let mut tx = candidate();
        tx.witnesses[1] = Witness::default();
        let request = NotaryRequest {
            hash: tx.hash,
            main_transaction: tx,
        };
        let err = coord
            .submit(&request, &bet(USER), &signal.subscribe())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Signature(_)));
    }

    #[tokio::test]
    async fn test_notarization_failure_is_surfaced() {
        let signal = ShutdownSignal::new();
        let mut actor = actor();
        actor.expect_sign().times(1).returning(|_| Ok(()));
        actor
            .expect_notarize()
            .times(1)
            .returning(|_| Err(ActorError::Rpc("connection reset".into())));
        let coord = coordinator(actor, ChainEventHub::new(4));

        let request = NotaryRequest {
            hash: Hash256::new([9; 32]),
            main_transaction: candidate(),
        };
        let err = coord
            .submit(&request, &bet(USER), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Notarization(ActorError::Rpc("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_submit_confirms_main() {
        let signal = ShutdownSignal::new();
        let hub = ChainEventHub::new(16);
        let mut actor = actor();
        actor.expect_sign().times(1).returning(|tx| {
            tx.witnesses[0] = signed(&[0xdd; 64]);
            Ok(())
        });
        actor
            .expect_notarize()
            .withf(|tx| !tx.witnesses[0].is_unsigned())
            .times(1)
            .returning(|_| Ok(pending()));
        let coord = coordinator(actor, hub.clone());

        let request = NotaryRequest {
            hash: Hash256::new([9; 32]),
            main_transaction: candidate(),
        };
        let feeder = tokio::spawn(async move {
            tokio::task::yield_now().await;
            hub.publish(ChainEvent::TransactionExecuted(exec(MAIN, VmState::Halt)));
        });

        let conf = timeout(
            Duration::from_secs(1),
            coord.submit(&request, &bet(USER), &signal.subscribe()),
        )
        .await
        .expect("submit timed out")
        .unwrap();
        feeder.await.unwrap();

        assert_eq!(conf.branch, Branch::Main);
        assert_eq!(conf.result.tx_hash, MAIN);
    }

    #[tokio::test]
    async fn test_fallback_first_resolves_fallback() {
        let signal = ShutdownSignal::new();
        let watcher = FakeWatcher {
            executed: vec![exec(FALLBACK, VmState::Halt)],
            ..Default::default()
        };

        let coord = coordinator(actor(), watcher);
        let conf = coord
            .await_confirmation(&pending(), &signal.subscribe())
            .await
            .unwrap();
        assert_eq!(conf.branch, Branch::Fallback);
        assert_eq!(conf.result.tx_hash, FALLBACK);
    }

    #[tokio::test]
    async fn test_expires_at_horizon() {
        let signal = ShutdownSignal::new();
        let hub = ChainEventHub::new(16);
        let coord = coordinator(actor(), hub.clone());
        hub.publish(ChainEvent::BlockAdded { height: 100 });

        let err = coord
            .await_confirmation(&pending(), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Expired {
                main: MAIN,
                fallback: FALLBACK,
                valid_until_block: 100
            }
        );
    }

    #[tokio::test]
    async fn test_late_execution_beats_expiry() {
        let signal = ShutdownSignal::new();
        let watcher = FakeWatcher {
            cached: vec![exec(MAIN, VmState::Halt)],
            horizon_reached: true,
            ..Default::default()
        };

        let coord = coordinator(actor(), watcher);
        let conf = coord
            .await_confirmation(&pending(), &signal.subscribe())
            .await
            .unwrap();
        assert_eq!(conf.branch, Branch::Main);
    }

    #[tokio::test]
    async fn test_fault_is_not_a_confirmation() {
        let signal = ShutdownSignal::new();
        let hub = ChainEventHub::new(16);
        hub.publish(ChainEvent::TransactionExecuted(exec(MAIN, VmState::Fault)));
        let coord = coordinator(actor(), hub);

        let err = coord
            .await_confirmation(&pending(), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::OnChainExecutionFailed {
                tx: MAIN,
                branch: Branch::Main,
                message: "bet is too low".into()
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_wait() {
        let hub = ChainEventHub::new(16);
        let coord = coordinator(actor(), hub);
        let signal = ShutdownSignal::new();
        let guard = signal.subscribe();

        let pending = pending();
        let wait = coord.await_confirmation(&pending, &guard);
        tokio::pin!(wait);
        assert!(timeout(Duration::from_millis(20), &mut wait).await.is_err());

        signal.send();
        let err = timeout(Duration::from_secs(1), wait)
            .await
            .expect("cancellation not observed")
            .unwrap_err();
        assert_eq!(err, SubmissionError::Cancelled);
    }

    #[tokio::test]
    async fn test_watch_failure_is_surfaced() {
        let signal = ShutdownSignal::new();
        let watcher = FakeWatcher {
            closed: true,
            ..Default::default()
        };

        let coord = coordinator(actor(), watcher);
        let err = coord
            .await_confirmation(&pending(), &signal.subscribe())
            .await
            .unwrap_err();
        assert_eq!(err, SubmissionError::Watch(WatchError::Closed));
    }
}
