//! The backend's account on chain: co-signs notary requests, builds their
//! fallbacks and sends calls it pays for alone.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use auction_config::NotaryConfig;
use auction_notary::{ActorError, ChainWatcher, ContractInvoker, NotaryActor, PendingSubmission};
use auction_primitives::{
    ArgValue, ExecutionResult, Hash160, Hash256, NotaryPayload, Signer, StackItem, Transaction,
    TxAttribute, VmState, Witness, WitnessScope,
};
use auction_script::{CallFlags, ScriptBuilder};
use tracing::*;

use crate::{
    error::NeoError,
    key::{dummy_invocation, KeyPair},
    native::{self, notary_deposit_script},
    rpc::NeoRpc,
};

/// Script of every fallback transaction: a bare `RET`.
const FALLBACK_SCRIPT: [u8; 1] = [0x40];

/// Height at which a fallback for a main transaction expiring at
/// `valid_until_block` becomes valid, `delay` blocks from now if that fits.
pub fn fallback_not_valid_before(
    height: u32,
    valid_until_block: u32,
    delay: u32,
) -> Result<u32, NeoError> {
    let window = valid_until_block.saturating_sub(height);
    if window < 2 {
        return Err(NeoError::NoFallbackWindow {
            height,
            valid_until_block,
        });
    }
    if delay > 0 && delay < window {
        Ok(height + delay)
    } else {
        Ok(height + window / 2)
    }
}

pub struct NeoActor<R, W> {
    rpc: Arc<R>,
    watcher: Arc<W>,
    key: KeyPair,
    network: u32,
    fallback_delay_blocks: u32,
    vub_increment: u32,
}

impl<R, W> fmt::Debug for NeoActor<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeoActor")
            .field("account", &self.key.account())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl<R: NeoRpc, W: ChainWatcher> NeoActor<R, W> {
    pub fn new(
        rpc: Arc<R>,
        watcher: Arc<W>,
        key: KeyPair,
        network: u32,
        config: &NotaryConfig,
    ) -> Self {
        Self {
            rpc,
            watcher,
            key,
            network,
            fallback_delay_blocks: config.fallback_delay_blocks,
            vub_increment: config.vub_increment,
        }
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// Recomputes the hash of `tx` and fills the backend's witness slot.
    fn sign_tx(&self, tx: &mut Transaction) -> Result<(), NeoError> {
        let account = self.key.account();
        let idx = tx
            .signer_index(&account)
            .ok_or(NeoError::NotASigner(account))?;
        if tx.witnesses.len() < tx.signers.len() {
            tx.witnesses.resize(tx.signers.len(), Witness::default());
        }

        tx.hash = tx.compute_hash()?;
        tx.witnesses[idx] = self.key.witness(self.network, &tx.hash);
        Ok(())
    }

    /// Unsigned fallback for `main`: a `RET` paid by the backend that
    /// conflicts with `main` and only becomes valid after a delay.
    pub fn build_fallback(
        &self,
        main_hash: Hash256,
        valid_until_block: u32,
        height: u32,
        nonce: u32,
    ) -> Result<Transaction, NeoError> {
        let not_before =
            fallback_not_valid_before(height, valid_until_block, self.fallback_delay_blocks)?;
        Ok(Transaction {
            hash: Hash256::zero(),
            version: 0,
            nonce,
            system_fee: 0,
            network_fee: 0,
            valid_until_block,
            signers: vec![
                Signer {
                    account: native::NOTARY,
                    scopes: WitnessScope::None,
                },
                Signer {
                    account: self.key.account(),
                    scopes: WitnessScope::None,
                },
            ],
            attributes: vec![
                TxAttribute::NotValidBefore { height: not_before },
                TxAttribute::Conflicts { hash: main_hash },
                TxAttribute::NotaryAssisted { nkeys: 0 },
            ],
            script: FALLBACK_SCRIPT.to_vec(),
            witnesses: vec![
                // filled in by the notary service
                Witness {
                    invocation: dummy_invocation(),
                    verification: Vec::new(),
                },
                Witness {
                    invocation: Vec::new(),
                    verification: self.key.verification_script().to_vec(),
                },
            ],
        })
    }

    async fn notarize_inner(&self, mut main: Transaction) -> Result<PendingSubmission, NeoError> {
        main.hash = main.compute_hash()?;
        let height = self.rpc.height().await?;
        let mut fallback = self.build_fallback(
            main.hash,
            main.valid_until_block,
            height,
            rand::random(),
        )?;
        fallback.network_fee = self.rpc.network_fee(&fallback).await?;
        self.sign_tx(&mut fallback)?;

        let mut payload = NotaryPayload {
            main,
            fallback,
            witness: Witness::default(),
        };
        let payload_hash = payload.compute_hash()?;
        payload.witness = self.key.witness(self.network, &payload_hash);

        let request = self.rpc.submit_notary_request(&payload).await?;
        debug!(
            %request,
            main = %payload.main.hash,
            fallback = %payload.fallback.hash,
            "notary request sent"
        );

        Ok(PendingSubmission {
            main: payload.main.hash,
            fallback: payload.fallback.hash,
            valid_until_block: payload.main.valid_until_block,
        })
    }

    /// Test-invokes `script`, then sends it signed by the backend alone and
    /// waits until it executes or expires.
    pub async fn send_script(&self, script: Vec<u8>) -> Result<ExecutionResult, NeoError> {
        let signers = vec![Signer {
            account: self.key.account(),
            scopes: WitnessScope::CalledByEntry,
        }];
        let test = self.rpc.invoke_script(script.clone(), signers.clone()).await?;
        if test.state != VmState::Halt {
            return Err(NeoError::Faulted(test.exception.unwrap_or_default()));
        }

        let valid_until_block = self.rpc.height().await? + self.vub_increment;
        let mut tx = Transaction {
            hash: Hash256::zero(),
            version: 0,
            nonce: rand::random(),
            system_fee: test.gas_consumed,
            network_fee: 0,
            valid_until_block,
            signers,
            attributes: Vec::new(),
            script,
            witnesses: vec![Witness {
                invocation: Vec::new(),
                verification: self.key.verification_script().to_vec(),
            }],
        };
        tx.network_fee = self.rpc.network_fee(&tx).await?;
        self.sign_tx(&mut tx)?;

        let hash = self.rpc.send_transaction(&tx).await?;
        debug!(tx = %hash, %valid_until_block, "transaction sent");

        tokio::select! {
            biased;

            res = self.watcher.wait_executed(hash) => Ok(res?),

            res = self.watcher.wait_for_height(valid_until_block) => {
                res?;
                self.watcher
                    .lookup_execution(&hash)
                    .ok_or(NeoError::Expired { tx: hash, valid_until_block })
            }
        }
    }

    /// Tops up the notary deposit of `to` with `amount` GAS fractions,
    /// locked for `lock_blocks` from now.
    pub async fn notary_deposit(
        &self,
        to: Hash160,
        amount: i64,
        lock_blocks: u32,
    ) -> Result<Hash256, NeoError> {
        let till = self.rpc.height().await? + lock_blocks;
        let script = notary_deposit_script(&self.key.account(), &to, amount, till);
        let result = self.send_script(script).await?;

        match (result.vm_state, result.stack.first()) {
            (VmState::Halt, Some(StackItem::Boolean(true))) => {
                info!(to = %to, %amount, %till, tx = %result.tx_hash, "notary deposit made");
                Ok(result.tx_hash)
            }
            (VmState::Halt, _) => Err(NeoError::Faulted("GAS transfer returned false".into())),
            (VmState::Fault, _) => Err(NeoError::Faulted(result.exception.unwrap_or_default())),
        }
    }
}

#[async_trait]
impl<R: NeoRpc, W: ChainWatcher> NotaryActor for NeoActor<R, W> {
    fn account(&self) -> Hash160 {
        self.key.account()
    }

    async fn sign(&self, tx: &mut Transaction) -> Result<(), ActorError> {
        Ok(self.sign_tx(tx)?)
    }

    async fn notarize(&self, tx: Transaction) -> Result<PendingSubmission, ActorError> {
        Ok(self.notarize_inner(tx).await?)
    }
}

#[async_trait]
impl<R: NeoRpc, W: ChainWatcher> ContractInvoker for NeoActor<R, W> {
    async fn send_call(
        &self,
        contract: Hash160,
        method: String,
        args: Vec<ArgValue>,
    ) -> Result<ExecutionResult, ActorError> {
        let mut b = ScriptBuilder::new();
        b.contract_call(&contract, &method, CallFlags::ALL, &args).ret();
        Ok(self.send_script(b.into_script()).await?)
    }
}

#[cfg(test)]
mod tests {
    use auction_notary::{ChainEvent, ChainEventHub};
    use auction_primitives::sign_data;
    use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

    use super::*;
    use crate::rpc::{Invocation, MockNeoRpc};

    const WIF: &str = "L1QqQJnpBwbsPGAuutuzPTac8piqvbR1HRjrY5qHup48TBCBFe4g";
    const NETWORK: u32 = 860_833_102;
    const USER: Hash160 = Hash160::new([0x75; 20]);

    fn key() -> KeyPair {
        KeyPair::from_wif(WIF).unwrap()
    }

    fn config() -> NotaryConfig {
        NotaryConfig {
            fallback_delay_blocks: 20,
            vub_increment: 100,
            ..NotaryConfig::default()
        }
    }

    fn actor(rpc: MockNeoRpc, hub: &ChainEventHub) -> NeoActor<MockNeoRpc, ChainEventHub> {
        NeoActor::new(
            Arc::new(rpc),
            Arc::new(hub.clone()),
            key(),
            NETWORK,
            &config(),
        )
    }

    fn assert_signed(witness: &Witness, hash: &Hash256) {
        let key = key();
        assert_eq!(witness.verification, key.verification_script());
        let sig = Signature::from_slice(&witness.invocation[2..]).unwrap();
        VerifyingKey::from_sec1_bytes(&key.public_key())
            .unwrap()
            .verify(&sign_data(NETWORK, hash), &sig)
            .unwrap();
    }

    fn main_tx() -> Transaction {
        Transaction {
            hash: Hash256::zero(),
            version: 0,
            nonce: 42,
            system_fee: 1_000_000,
            network_fee: 2_000_000,
            valid_until_block: 200,
            signers: vec![
                Signer {
                    account: key().account(),
                    scopes: WitnessScope::None,
                },
                Signer {
                    account: USER,
                    scopes: WitnessScope::Global,
                },
            ],
            attributes: vec![TxAttribute::NotaryAssisted { nkeys: 1 }],
            script: vec![0x11, 0x40],
            witnesses: vec![
                Witness::default(),
                Witness {
                    invocation: vec![0x0c, 0x40, 1, 2, 3],
                    verification: vec![0x41],
                },
            ],
        }
    }

    fn halted(tx_hash: Hash256, stack: Vec<StackItem>) -> ExecutionResult {
        ExecutionResult {
            tx_hash,
            vm_state: VmState::Halt,
            exception: None,
            gas_consumed: 0,
            stack,
            notifications: Vec::new(),
        }
    }

    #[test]
    fn test_not_valid_before_is_clamped() {
        assert_eq!(fallback_not_valid_before(100, 200, 20).unwrap(), 120);
        assert_eq!(fallback_not_valid_before(100, 110, 20).unwrap(), 105);
        assert_eq!(fallback_not_valid_before(100, 102, 0).unwrap(), 101);
        for vub in [90, 100, 101] {
            assert!(matches!(
                fallback_not_valid_before(100, vub, 20),
                Err(NeoError::NoFallbackWindow { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_sign_fills_backend_slot_only() {
        let hub = ChainEventHub::new(4);
        let actor = actor(MockNeoRpc::new(), &hub);
        let mut tx = main_tx();

        NotaryActor::sign(&actor, &mut tx).await.unwrap();

        assert_eq!(tx.hash, main_tx().compute_hash().unwrap());
        assert_signed(&tx.witnesses[0], &tx.hash);
        assert_eq!(tx.witnesses[1], main_tx().witnesses[1]);
    }

    #[tokio::test]
    async fn test_sign_refuses_foreign_transaction() {
        let hub = ChainEventHub::new(4);
        let actor = actor(MockNeoRpc::new(), &hub);
        let mut tx = main_tx();
        tx.signers.remove(0);

        let err = NotaryActor::sign(&actor, &mut tx).await.unwrap_err();
        assert!(matches!(err, ActorError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_fallback_shape() {
        let hub = ChainEventHub::new(4);
        let actor = actor(MockNeoRpc::new(), &hub);
        let main_hash = Hash256::new([7; 32]);

        let fb = actor.build_fallback(main_hash, 200, 150, 9).unwrap();
        assert_eq!(fb.valid_until_block, 200);
        assert_eq!(fb.script, vec![0x40]);
        assert_eq!(fb.signers[0].account, native::NOTARY);
        assert_eq!(fb.signers[1].account, key().account());
        assert!(fb.signers.iter().all(|s| s.scopes == WitnessScope::None));
        assert_eq!(
            fb.attributes,
            vec![
                TxAttribute::NotValidBefore { height: 170 },
                TxAttribute::Conflicts { hash: main_hash },
                TxAttribute::NotaryAssisted { nkeys: 0 },
            ]
        );
        assert_eq!(fb.witnesses[0].invocation.len(), 66);
        assert!(fb.witnesses[0].verification.is_empty());
        assert!(fb.witnesses[1].is_unsigned());
    }

    #[tokio::test]
    async fn test_notarize_submits_signed_payload() {
        let mut rpc = MockNeoRpc::new();
        rpc.expect_height().times(1).returning(|| Ok(150));
        rpc.expect_network_fee()
            .withf(|tx| tx.script == FALLBACK_SCRIPT)
            .returning(|_| Ok(4_321));
        rpc.expect_submit_notary_request()
            .withf(|payload| {
                let main_hash = payload.main.compute_hash().unwrap();
                payload.fallback.network_fee == 4_321
                    && payload.fallback.attributes[1] == TxAttribute::Conflicts { hash: main_hash }
                    && payload.main.witnesses[1] == main_tx().witnesses[1]
            })
            .returning(|_| Ok(Hash256::new([0xee; 32])));

        let hub = ChainEventHub::new(4);
        let actor = actor(rpc, &hub);
        let mut main = main_tx();
        NotaryActor::sign(&actor, &mut main).await.unwrap();
        let pending = actor.notarize(main.clone()).await.unwrap();

        assert_eq!(pending.main, main.hash);
        assert_eq!(pending.valid_until_block, 200);
        assert_ne!(pending.fallback, pending.main);
    }

    #[tokio::test]
    async fn test_notarize_refuses_expiring_transaction() {
        let mut rpc = MockNeoRpc::new();
        rpc.expect_height().returning(|| Ok(199));
        rpc.expect_submit_notary_request().never();

        let hub = ChainEventHub::new(4);
        let err = actor(rpc, &hub).notarize(main_tx()).await.unwrap_err();
        assert!(matches!(err, ActorError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_send_call_waits_for_execution() {
        let hub = ChainEventHub::new(4);
        let mut rpc = MockNeoRpc::new();
        rpc.expect_invoke_script()
            .withf(|_, signers| signers[0].scopes == WitnessScope::CalledByEntry)
            .returning(|_, _| {
                Ok(Invocation {
                    state: VmState::Halt,
                    gas_consumed: 1_000,
                    exception: None,
                    stack: Vec::new(),
                })
            });
        rpc.expect_height().returning(|| Ok(50));
        rpc.expect_network_fee().returning(|_| Ok(200));
        let chain = hub.clone();
        rpc.expect_send_transaction()
            .withf(|tx| tx.system_fee == 1_000 && tx.network_fee == 200)
            .returning(move |tx| {
                assert_eq!(tx.valid_until_block, 150);
                chain.publish(ChainEvent::TransactionExecuted(halted(tx.hash, Vec::new())));
                Ok(tx.hash)
            });

        let actor = actor(rpc, &hub);
        let res = actor
            .send_call(
                Hash160::new([1; 20]),
                "setAddress".into(),
                vec![ArgValue::String("nyan".into())],
            )
            .await
            .unwrap();
        assert!(res.is_halt());
    }

    #[tokio::test]
    async fn test_send_call_rejects_faulting_script() {
        let hub = ChainEventHub::new(4);
        let mut rpc = MockNeoRpc::new();
        rpc.expect_invoke_script().returning(|_, _| {
            Ok(Invocation {
                state: VmState::Fault,
                gas_consumed: 0,
                exception: Some("ABORT".into()),
                stack: Vec::new(),
            })
        });
        rpc.expect_send_transaction().never();

        let err = actor(rpc, &hub)
            .send_call(Hash160::new([1; 20]), "finish".into(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err, ActorError::Rejected("script faulted: ABORT".into()));
    }

    #[tokio::test]
    async fn test_send_call_expires_at_valid_until_block() {
        let hub = ChainEventHub::new(4);
        let mut rpc = MockNeoRpc::new();
        rpc.expect_invoke_script().returning(|_, _| {
            Ok(Invocation {
                state: VmState::Halt,
                gas_consumed: 0,
                exception: None,
                stack: Vec::new(),
            })
        });
        rpc.expect_height().returning(|| Ok(10));
        rpc.expect_network_fee().returning(|_| Ok(0));
        let chain = hub.clone();
        rpc.expect_send_transaction().returning(move |tx| {
            chain.publish(ChainEvent::BlockAdded { height: 110 });
            Ok(tx.hash)
        });

        let err = actor(rpc, &hub)
            .send_call(Hash160::new([1; 20]), "finish".into(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::Rejected(msg) if msg.contains("not executed")));
    }

    fn deposit_rpc(hub: &ChainEventHub, transferred: bool) -> MockNeoRpc {
        let mut rpc = MockNeoRpc::new();
        rpc.expect_height().returning(|| Ok(1_000));
        rpc.expect_invoke_script()
            .withf(|script, _| script.windows(8).any(|w| w == b"transfer"))
            .returning(|_, _| {
                Ok(Invocation {
                    state: VmState::Halt,
                    gas_consumed: 0,
                    exception: None,
                    stack: vec![StackItem::Boolean(true)],
                })
            });
        rpc.expect_network_fee().returning(|_| Ok(0));
        let chain = hub.clone();
        rpc.expect_send_transaction().returning(move |tx| {
            let stack = vec![StackItem::Boolean(transferred)];
            chain.publish(ChainEvent::TransactionExecuted(halted(tx.hash, stack)));
            Ok(tx.hash)
        });
        rpc
    }

    #[tokio::test]
    async fn test_notary_deposit_returns_transfer_hash() {
        let hub = ChainEventHub::new(4);
        let actor = actor(deposit_rpc(&hub, true), &hub);
        let hash = actor.notary_deposit(USER, 100_000_000, 5_760).await.unwrap();
        assert!(!hash.is_zero());
    }

    #[tokio::test]
    async fn test_notary_deposit_fails_on_refused_transfer() {
        let hub = ChainEventHub::new(4);
        let actor = actor(deposit_rpc(&hub, false), &hub);
        let err = actor.notary_deposit(USER, 100_000_000, 5_760).await.unwrap_err();
        assert!(matches!(err, NeoError::Faulted(msg) if msg.contains("false")));
    }
}
