use auction_primitives::{ArgType, Hash160};
use auction_script::{CallFlags, DecodeError, OpCode};
use thiserror::Error;

/// Why a candidate script was rejected. Every variant is final for the
/// request: nothing is signed and no fee is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Script could not be disassembled.
    #[error("malformed script: {0}")]
    MalformedScript(#[from] DecodeError),

    /// Script does not end in the `System.Contract.Call` sequence.
    #[error("not a contract call: {reason}")]
    NotAContractCall { reason: &'static str },

    /// Called contract is not the one the operation is bound to, or is not
    /// a 20-byte hash at all (`found` is `None`).
    #[error("unexpected call target {found:?} (expected {expected:?})")]
    UnexpectedTarget {
        expected: Option<Hash160>,
        found: Option<Hash160>,
    },

    /// Contract is known but the method is not allowed on it.
    #[error("method '{found}' is not allowed on {target}")]
    UnexpectedMethod { target: Hash160, found: String },

    /// Call flag push is not a small integer at or below the maximum.
    #[error("call flag instruction {opcode:?} exceeds permitted flags {max}")]
    InvalidPermission { opcode: OpCode, max: CallFlags },

    /// Argument region is not an array-packing sequence.
    #[error("invalid argument packing: {reason}")]
    InvalidArgumentPacking { reason: String },

    #[error("expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Argument at `position` (declaration order) has the wrong encoding.
    #[error("argument {position} ({expected}): {source}")]
    ArgumentDecode {
        position: usize,
        expected: ArgType,
        #[source]
        source: ArgumentError,
    },

    #[error("no call named '{0}' is configured")]
    UnknownOperation(String),
}

/// Why a single argument instruction could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("{0:?} cannot encode this argument type")]
    UnexpectedOpcode(OpCode),

    #[error("hash is {0} bytes long, expected 20")]
    HashLength(usize),

    #[error("integer does not fit in 64 bits")]
    IntegerOverflow,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors building the call spec table at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecTableError {
    #[error("call '{0}' has no built-in ABI; set method and args")]
    UnknownBuiltin(String),

    #[error("call '{0}' is defined twice")]
    DuplicateName(String),

    #[error("calls '{first}' and '{second}' both bind {method} on {target}")]
    AmbiguousCall {
        first: String,
        second: String,
        target: Hash160,
        method: String,
    },

    #[error("max call flags {0} is not a valid flag set")]
    InvalidMaxFlags(u8),
}
