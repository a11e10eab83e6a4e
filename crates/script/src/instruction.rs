use std::fmt;

use crate::opcode::OpCode;

/// One decoded instruction, borrowing its operand from the script.
///
/// For `PUSHDATA*` the operand is the payload only; the length prefix is
/// consumed by the decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction<'a> {
    offset: usize,
    opcode: OpCode,
    operand: &'a [u8],
}

impl<'a> Instruction<'a> {
    pub fn new(offset: usize, opcode: OpCode, operand: &'a [u8]) -> Self {
        Self {
            offset,
            opcode,
            operand,
        }
    }

    /// Byte offset of the opcode inside the script.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn operand(&self) -> &'a [u8] {
        self.operand
    }
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} {:?}", self.offset, self.opcode)?;
        if !self.operand.is_empty() {
            f.write_str(" ")?;
            for byte in self.operand {
                write!(f, "{byte:02x}")?;
            }
        }
        Ok(())
    }
}
