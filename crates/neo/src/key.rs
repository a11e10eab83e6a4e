//! The backend's signing key and the account derived from it.

use std::fmt;

use auction_primitives::{sign_data, Hash160, Hash256, Witness};
use auction_script::{interop_id, ScriptBuilder};
use bitcoin::{
    base58,
    hashes::{hash160, Hash},
};
use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};

use crate::error::KeyError;

/// Version byte of N3 addresses.
pub const ADDRESS_VERSION: u8 = 0x35;

const WIF_VERSION: u8 = 0x80;
const WIF_COMPRESSED: u8 = 0x01;
const WIF_LEN: usize = 34;

const SIGNATURE_LEN: usize = 64;

/// Signature push as found in a single-key invocation script.
const INVOCATION_PREFIX: [u8; 2] = [0x0c, SIGNATURE_LEN as u8];

const CHECK_SIG: &str = "System.Crypto.CheckSig";

/// A secp256r1 key of a single-signature account.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    verification: Vec<u8>,
    account: Hash160,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, KeyError> {
        let signing = SigningKey::from_slice(secret).map_err(|_| KeyError::Scalar)?;
        let public = signing.verifying_key().to_encoded_point(true);

        let mut script = ScriptBuilder::new();
        script
            .push_data(public.as_bytes())
            .syscall(interop_id(CHECK_SIG).to_le_bytes());
        let verification = script.into_script();
        let account = script_hash(&verification);

        Ok(Self {
            signing,
            verification,
            account,
        })
    }

    /// Parses a compressed-key WIF.
    pub fn from_wif(wif: &str) -> Result<Self, KeyError> {
        let data = base58::decode_check(wif.trim())?;
        if data.len() != WIF_LEN || data[0] != WIF_VERSION || data[WIF_LEN - 1] != WIF_COMPRESSED {
            return Err(KeyError::Wif);
        }
        Self::from_bytes(&data[1..WIF_LEN - 1])
    }

    /// Compressed public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn verification_script(&self) -> &[u8] {
        &self.verification
    }

    pub fn account(&self) -> Hash160 {
        self.account
    }

    pub fn address(&self) -> String {
        address_from_script_hash(&self.account)
    }

    /// ECDSA over SHA-256 of `data`, as `r || s`.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let sig: Signature = self.signing.sign(data);
        let mut out = [0; SIGNATURE_LEN];
        out.copy_from_slice(&sig.to_bytes());
        out
    }

    /// Witness proving this account signed `hash` on `network`.
    pub fn witness(&self, network: u32, hash: &Hash256) -> Witness {
        let sig = self.sign(&sign_data(network, hash));
        Witness {
            invocation: invocation_script(&sig),
            verification: self.verification.clone(),
        }
    }
}

pub fn invocation_script(sig: &[u8; SIGNATURE_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(INVOCATION_PREFIX.len() + SIGNATURE_LEN);
    out.extend_from_slice(&INVOCATION_PREFIX);
    out.extend_from_slice(sig);
    out
}

/// Invocation of the right size for fee estimation, before signing.
pub fn dummy_invocation() -> Vec<u8> {
    invocation_script(&[0; SIGNATURE_LEN])
}

/// RIPEMD-160 of SHA-256 of `script`, in script byte order.
pub fn script_hash(script: &[u8]) -> Hash160 {
    Hash160::new(hash160::Hash::hash(script).to_byte_array())
}

pub fn address_from_script_hash(hash: &Hash160) -> String {
    let mut data = Vec::with_capacity(1 + Hash160::LEN);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(hash.as_bytes());
    base58::encode_check(&data)
}

pub fn script_hash_from_address(address: &str) -> Result<Hash160, KeyError> {
    let invalid = || KeyError::Address(address.to_owned());
    let data = base58::decode_check(address).map_err(|_| invalid())?;
    match data.split_first() {
        Some((&ADDRESS_VERSION, hash)) => Hash160::from_be_slice(hash).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
