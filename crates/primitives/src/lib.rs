//! Data types shared by the auction backend crates: ledger hashes,
//! transactions, method argument values and execution results.

#[macro_use]
mod macros;

pub mod abi;
pub mod exec;
pub mod hash;
pub mod tx;
pub mod wire;

pub use abi::{ArgType, ArgValue};
pub use exec::{ApplicationLog, ExecError, ExecutionResult, Notification, StackItem, VmState};
pub use hash::{Hash160, Hash256, HashError};
pub use tx::{
    NotaryPayload, NotaryRequest, Signer, Transaction, TxAttribute, Witness, WitnessScope,
};
pub use wire::{sign_data, BinReader, BinWriter, WireError};
