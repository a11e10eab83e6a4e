//! Instruction decoder.
//!
//! Walks a script strictly forward and splits it into instructions. Nothing
//! is executed; jump targets and syscall ids are carried as opaque operands.

use thiserror::Error;

use crate::{
    instruction::Instruction,
    opcode::{OpCode, OperandSize, MAX_ITEM_SIZE},
};

/// Reasons a script cannot be disassembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Byte at `offset` is not an assigned opcode.
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },

    /// Operand of the instruction at `offset` runs past the end of the script.
    #[error("truncated {opcode:?} operand at offset {offset}")]
    Truncated { offset: usize, opcode: OpCode },

    /// `PUSHDATA*` declares a payload above the VM item size limit.
    #[error("push of {len} bytes at offset {offset} exceeds item size limit")]
    OperandTooLarge { offset: usize, len: usize },

    /// Script ended before a `RET` instruction.
    #[error("script of {len} bytes has no terminal RET")]
    MissingReturn { len: usize },
}

/// What to do when the script runs out without an explicit `RET`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReturnPolicy {
    /// A `RET` instruction must be present.
    #[default]
    Explicit,
    /// End of script counts as `RET`, as the VM itself treats it.
    ImplicitAtEnd,
}

/// Iterator over the instructions of a script.
///
/// Yields every instruction including `RET`, then stops at the end of the
/// byte stream. After an error it yields nothing more.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(script: &'a [u8]) -> Self {
        Self {
            script,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next instruction.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, start: usize, len: usize, opcode: OpCode) -> Result<&'a [u8], DecodeError> {
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.script.len())
            .ok_or(DecodeError::Truncated {
                offset: self.offset,
                opcode,
            })?;
        Ok(&self.script[start..end])
    }

    fn read_next(&mut self) -> Result<Instruction<'a>, DecodeError> {
        let offset = self.offset;
        let byte = self.script[offset];
        let opcode =
            OpCode::try_from(byte).map_err(|_| DecodeError::UnknownOpcode { offset, byte })?;

        let body = offset + 1;
        let (operand, next) = match opcode.operand_size() {
            OperandSize::Fixed(n) => (self.take(body, n, opcode)?, body + n),
            OperandSize::Prefixed(width) => {
                let prefix = self.take(body, width, opcode)?;
                let mut len_bytes = [0u8; 4];
                len_bytes[..width].copy_from_slice(prefix);
                let len = u32::from_le_bytes(len_bytes) as usize;
                if len > MAX_ITEM_SIZE {
                    return Err(DecodeError::OperandTooLarge { offset, len });
                }
                let data_start = body + width;
                (self.take(data_start, len, opcode)?, data_start + len)
            }
        };

        self.offset = next;
        Ok(Instruction::new(offset, opcode, operand))
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.script.len() {
            return None;
        }
        let res = self.read_next();
        self.failed = res.is_err();
        Some(res)
    }
}

/// Decodes `script` up to its terminal `RET`, which must be present.
///
/// The returned list excludes the `RET`. Bytes after it are not read.
pub fn decode(script: &[u8]) -> Result<Vec<Instruction<'_>>, DecodeError> {
    decode_with(script, ReturnPolicy::Explicit)
}

/// Decodes `script` up to its terminal `RET` under the given policy.
pub fn decode_with(
    script: &[u8],
    policy: ReturnPolicy,
) -> Result<Vec<Instruction<'_>>, DecodeError> {
    let mut instrs = Vec::new();
    for res in Instructions::new(script) {
        let instr = res?;
        if instr.opcode() == OpCode::Ret {
            return Ok(instrs);
        }
        instrs.push(instr);
    }

    match policy {
        ReturnPolicy::Explicit => Err(DecodeError::MissingReturn { len: script.len() }),
        ReturnPolicy::ImplicitAtEnd => Ok(instrs),
    }
}
