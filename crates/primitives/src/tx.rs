//! Transaction and notary request types, as far as the backend inspects them.

use serde::{Deserialize, Serialize};

use crate::hash::{Hash160, Hash256};

/// Witness scope attached to a signer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WitnessScope {
    None,
    CalledByEntry,
    CustomContracts,
    CustomGroups,
    WitnessRules,
    Global,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub account: Hash160,
    pub scopes: WitnessScope,
}

/// Invocation and verification scripts proving one signer's consent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    #[serde(with = "hex::serde")]
    pub invocation: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub verification: Vec<u8>,
}

impl Witness {
    /// A slot that still waits for its signature.
    pub fn is_unsigned(&self) -> bool {
        self.invocation.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TxAttribute {
    HighPriority,
    /// Transaction may not be included below this height.
    NotValidBefore { height: u32 },
    /// At most one of this transaction and `hash` can be included.
    Conflicts { hash: Hash256 },
    NotaryAssisted { nkeys: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash256,
    pub version: u8,
    pub nonce: u32,
    pub system_fee: i64,
    pub network_fee: i64,
    pub valid_until_block: u32,
    pub signers: Vec<Signer>,
    #[serde(default)]
    pub attributes: Vec<TxAttribute>,
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// Position of `account` in the signer list.
    pub fn signer_index(&self, account: &Hash160) -> Option<usize> {
        self.signers.iter().position(|s| &s.account == account)
    }

    pub fn notary_keys(&self) -> Option<u8> {
        self.attributes.iter().find_map(|attr| match attr {
            TxAttribute::NotaryAssisted { nkeys } => Some(*nkeys),
            _ => None,
        })
    }
}

/// Request sent to the notary service: a main transaction that still waits
/// for signatures, the sender's fallback for it, and the sender's witness
/// over both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotaryPayload {
    pub main: Transaction,
    pub fallback: Transaction,
    pub witness: Witness,
}

/// Candidate request received from the notary feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryRequest {
    pub hash: Hash256,
    pub main_transaction: Transaction,
}
