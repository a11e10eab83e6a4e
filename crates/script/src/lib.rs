//! NeoVM script handling: the opcode table, a forward-only instruction
//! decoder and an emitter for contract-call scripts.

pub mod builder;
pub mod call_flags;
pub mod decode;
pub mod instruction;
pub mod interop;
pub mod opcode;

pub use builder::ScriptBuilder;
pub use call_flags::CallFlags;
pub use decode::{decode, decode_with, DecodeError, Instructions, ReturnPolicy};
pub use instruction::Instruction;
pub use interop::{interop_id, CONTRACT_CALL_ID, SYSTEM_CONTRACT_CALL};
pub use opcode::{OpCode, OperandSize, MAX_ITEM_SIZE};
