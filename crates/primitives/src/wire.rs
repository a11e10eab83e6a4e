//! Binary encoding of transactions and notary payloads as nodes exchange
//! them.
//!
//! Integers are little-endian, lengths are var-ints and hashes are written
//! in script order. A transaction hash is the SHA-256 of its unsigned part.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    hash::{Hash160, Hash256},
    tx::{NotaryPayload, Signer, Transaction, TxAttribute, Witness, WitnessScope},
};

/// Largest serialized transaction a node relays.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Upper bound on signers plus attributes.
pub const MAX_SIGNERS_AND_ATTRIBUTES: usize = 16;

const MAX_SCRIPT_SIZE: usize = u16::MAX as usize;
const MAX_INVOCATION_SIZE: usize = 1024;
const MAX_VERIFICATION_SIZE: usize = 1024;

const ATTR_HIGH_PRIORITY: u8 = 0x01;
const ATTR_NOT_VALID_BEFORE: u8 = 0x20;
const ATTR_CONFLICTS: u8 = 0x21;
const ATTR_NOTARY_ASSISTED: u8 = 0x22;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),

    #[error("{what} has {len} entries or bytes, limit is {max}")]
    TooLong {
        what: &'static str,
        len: u64,
        max: usize,
    },

    /// Scopes that carry extra data (contracts, groups, rules) or combine
    /// flags are not modelled.
    #[error("witness scope {0:#04x} is not supported")]
    UnsupportedScope(u8),

    #[error("attribute type {0:#04x} is not supported")]
    UnsupportedAttribute(u8),

    #[error("signer {0} is listed twice")]
    DuplicateSigner(Hash160),

    #[error("{0} bytes left after the transaction")]
    TrailingBytes(usize),
}

/// Append-only buffer for the wire format.
#[derive(Debug, Default)]
pub struct BinWriter {
    buf: Vec<u8>,
}

impl BinWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn write_var_uint(&mut self, v: u64) {
        if v < 0xfd {
            self.write_u8(v as u8);
        } else if let Ok(v) = u16::try_from(v) {
            self.write_u8(0xfd);
            self.write_bytes(&v.to_le_bytes());
        } else if let Ok(v) = u32::try_from(v) {
            self.write_u8(0xfe);
            self.write_u32(v);
        } else {
            self.write_u8(0xff);
            self.write_bytes(&v.to_le_bytes());
        }
    }

    pub fn write_var_bytes(&mut self, b: &[u8]) {
        self.write_var_uint(b.len() as u64);
        self.write_bytes(b);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Forward-only cursor over wire bytes.
#[derive(Debug)]
pub struct BinReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(WireError::UnexpectedEnd(self.pos))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_var_uint(&mut self) -> Result<u64, WireError> {
        Ok(match self.read_u8()? {
            0xfd => u64::from(u16::from_le_bytes(self.read_array()?)),
            0xfe => u64::from(self.read_u32()?),
            0xff => u64::from_le_bytes(self.read_array()?),
            small => u64::from(small),
        })
    }

    /// Reads a var-int count and checks it against `max`.
    pub fn read_count(&mut self, what: &'static str, max: usize) -> Result<usize, WireError> {
        let len = self.read_var_uint()?;
        match usize::try_from(len) {
            Ok(n) if n <= max => Ok(n),
            _ => Err(WireError::TooLong { what, len, max }),
        }
    }

    pub fn read_var_bytes(&mut self, what: &'static str, max: usize) -> Result<Vec<u8>, WireError> {
        let len = self.read_count(what, max)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Errors if anything is left unread.
    pub fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}

fn scope_to_byte(scope: WitnessScope) -> Result<u8, WireError> {
    match scope {
        WitnessScope::None => Ok(0x00),
        WitnessScope::CalledByEntry => Ok(0x01),
        WitnessScope::Global => Ok(0x80),
        WitnessScope::CustomContracts => Err(WireError::UnsupportedScope(0x10)),
        WitnessScope::CustomGroups => Err(WireError::UnsupportedScope(0x20)),
        WitnessScope::WitnessRules => Err(WireError::UnsupportedScope(0x40)),
    }
}

fn scope_from_byte(b: u8) -> Result<WitnessScope, WireError> {
    match b {
        0x00 => Ok(WitnessScope::None),
        0x01 => Ok(WitnessScope::CalledByEntry),
        0x80 => Ok(WitnessScope::Global),
        other => Err(WireError::UnsupportedScope(other)),
    }
}

fn write_attribute(w: &mut BinWriter, attr: &TxAttribute) {
    match attr {
        TxAttribute::HighPriority => w.write_u8(ATTR_HIGH_PRIORITY),
        TxAttribute::NotValidBefore { height } => {
            w.write_u8(ATTR_NOT_VALID_BEFORE);
            w.write_u32(*height);
        }
        TxAttribute::Conflicts { hash } => {
            w.write_u8(ATTR_CONFLICTS);
            w.write_bytes(hash.as_bytes());
        }
        TxAttribute::NotaryAssisted { nkeys } => {
            w.write_u8(ATTR_NOTARY_ASSISTED);
            w.write_u8(*nkeys);
        }
    }
}

fn read_attribute(r: &mut BinReader<'_>) -> Result<TxAttribute, WireError> {
    Ok(match r.read_u8()? {
        ATTR_HIGH_PRIORITY => TxAttribute::HighPriority,
        ATTR_NOT_VALID_BEFORE => TxAttribute::NotValidBefore {
            height: r.read_u32()?,
        },
        ATTR_CONFLICTS => TxAttribute::Conflicts {
            hash: Hash256::new(r.read_array()?),
        },
        ATTR_NOTARY_ASSISTED => TxAttribute::NotaryAssisted {
            nkeys: r.read_u8()?,
        },
        other => return Err(WireError::UnsupportedAttribute(other)),
    })
}

impl Witness {
    pub fn encode(&self, w: &mut BinWriter) {
        w.write_var_bytes(&self.invocation);
        w.write_var_bytes(&self.verification);
    }

    pub fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            invocation: r.read_var_bytes("invocation script", MAX_INVOCATION_SIZE)?,
            verification: r.read_var_bytes("verification script", MAX_VERIFICATION_SIZE)?,
        })
    }
}

impl Transaction {
    /// Writes every field the hash covers.
    pub fn encode_unsigned(&self, w: &mut BinWriter) -> Result<(), WireError> {
        w.write_u8(self.version);
        w.write_u32(self.nonce);
        w.write_i64(self.system_fee);
        w.write_i64(self.network_fee);
        w.write_u32(self.valid_until_block);

        w.write_var_uint(self.signers.len() as u64);
        for signer in &self.signers {
            w.write_bytes(signer.account.as_bytes());
            w.write_u8(scope_to_byte(signer.scopes)?);
        }

        w.write_var_uint(self.attributes.len() as u64);
        for attr in &self.attributes {
            write_attribute(w, attr);
        }

        w.write_var_bytes(&self.script);
        Ok(())
    }

    pub fn encode(&self, w: &mut BinWriter) -> Result<(), WireError> {
        self.encode_unsigned(w)?;
        w.write_var_uint(self.witnesses.len() as u64);
        for witness in &self.witnesses {
            witness.encode(w);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut w = BinWriter::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Hash of the unsigned part. Does not read or update `self.hash`.
    pub fn compute_hash(&self) -> Result<Hash256, WireError> {
        let mut w = BinWriter::new();
        self.encode_unsigned(&mut w)?;
        Ok(sha256(&w.into_bytes()))
    }

    /// Decodes one transaction and fills in its hash.
    pub fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        let start = r.position();
        let version = r.read_u8()?;
        let nonce = r.read_u32()?;
        let system_fee = r.read_i64()?;
        let network_fee = r.read_i64()?;
        let valid_until_block = r.read_u32()?;

        let n_signers = r.read_count("signers", MAX_SIGNERS_AND_ATTRIBUTES)?;
        let mut signers: Vec<Signer> = Vec::with_capacity(n_signers);
        for _ in 0..n_signers {
            let account = Hash160::new(r.read_array()?);
            if signers.iter().any(|s| s.account == account) {
                return Err(WireError::DuplicateSigner(account));
            }
            let scopes = scope_from_byte(r.read_u8()?)?;
            signers.push(Signer { account, scopes });
        }

        let n_attrs = r.read_count("attributes", MAX_SIGNERS_AND_ATTRIBUTES - n_signers)?;
        let mut attributes = Vec::with_capacity(n_attrs);
        for _ in 0..n_attrs {
            attributes.push(read_attribute(r)?);
        }

        let script = r.read_var_bytes("script", MAX_SCRIPT_SIZE)?;
        let unsigned_end = r.position();

        let n_witnesses = r.read_count("witnesses", MAX_SIGNERS_AND_ATTRIBUTES)?;
        let mut witnesses = Vec::with_capacity(n_witnesses);
        for _ in 0..n_witnesses {
            witnesses.push(Witness::decode(r)?);
        }

        let size = r.position() - start;
        if size > MAX_TRANSACTION_SIZE {
            return Err(WireError::TooLong {
                what: "transaction",
                len: size as u64,
                max: MAX_TRANSACTION_SIZE,
            });
        }

        Ok(Self {
            hash: sha256(&r.data[start..unsigned_end]),
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
        })
    }

    /// Decodes `data`, which must hold exactly one transaction.
    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        let mut r = BinReader::new(data);
        let tx = Self::decode(&mut r)?;
        r.finish()?;
        Ok(tx)
    }
}

impl NotaryPayload {
    /// Hash of both transactions, which the payload witness signs.
    pub fn compute_hash(&self) -> Result<Hash256, WireError> {
        let mut w = BinWriter::new();
        self.main.encode(&mut w)?;
        self.fallback.encode(&mut w)?;
        Ok(sha256(&w.into_bytes()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut w = BinWriter::new();
        self.main.encode(&mut w)?;
        self.fallback.encode(&mut w)?;
        self.witness.encode(&mut w);
        Ok(w.into_bytes())
    }
}

/// Message a witness signs for `hash` on the network with magic `network`.
pub fn sign_data(network: u32, hash: &Hash256) -> [u8; 36] {
    let mut out = [0; 36];
    out[..4].copy_from_slice(&network.to_le_bytes());
    out[4..].copy_from_slice(hash.as_bytes());
    out
}

fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    Hash256::new(digest.into())
}
