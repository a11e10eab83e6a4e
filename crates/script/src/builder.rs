//! Script emitter producing the same encodings as the node tooling.

use auction_primitives::{ArgValue, Hash160};

use crate::{call_flags::CallFlags, interop::CONTRACT_CALL_ID, opcode::OpCode};

#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    buf: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.buf.push(opcode.into());
        self
    }

    /// Emits `opcode` followed by `operand` verbatim.
    pub fn emit_raw(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.buf.push(opcode.into());
        self.buf.extend_from_slice(operand);
        self
    }

    /// Pushes `value` using the shortest encoding.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        if value == -1 {
            return self.emit(OpCode::PushM1);
        }
        if let Some(op) = u8::try_from(value).ok().and_then(OpCode::push_small) {
            return self.emit(op);
        }

        let le = value.to_le_bytes();
        if i8::try_from(value).is_ok() {
            self.emit_raw(OpCode::PushInt8, &le[..1])
        } else if i16::try_from(value).is_ok() {
            self.emit_raw(OpCode::PushInt16, &le[..2])
        } else if i32::try_from(value).is_ok() {
            self.emit_raw(OpCode::PushInt32, &le[..4])
        } else {
            self.emit_raw(OpCode::PushInt64, &le)
        }
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PushT } else { OpCode::PushF })
    }

    /// Pushes `data` with the smallest `PUSHDATA*` that fits its length.
    pub fn push_data(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if let Ok(len) = u8::try_from(len) {
            self.emit_raw(OpCode::PushData1, &[len]);
        } else if let Ok(len) = u16::try_from(len) {
            self.emit_raw(OpCode::PushData2, &len.to_le_bytes());
        } else {
            let len = u32::try_from(len).unwrap_or(u32::MAX);
            self.emit_raw(OpCode::PushData4, &len.to_le_bytes());
        }
        self.buf.extend_from_slice(data);
        self
    }

    pub fn push_hash160(&mut self, hash: &Hash160) -> &mut Self {
        self.push_data(hash.as_bytes())
    }

    pub fn push_arg(&mut self, arg: &ArgValue) -> &mut Self {
        match arg {
            ArgValue::Hash160(h) => self.push_hash160(h),
            ArgValue::Integer(v) => self.push_int(*v),
            ArgValue::Bytes(b) => self.push_data(b),
            ArgValue::String(s) => self.push_data(s.as_bytes()),
        }
    }

    /// Pushes `args` packed into one array, last argument first.
    pub fn push_packed_args(&mut self, args: &[ArgValue]) -> &mut Self {
        if args.is_empty() {
            return self.emit(OpCode::NewArray0);
        }
        for arg in args.iter().rev() {
            self.push_arg(arg);
        }
        self.push_int(args.len() as i64).emit(OpCode::Pack)
    }

    pub fn syscall(&mut self, id: [u8; 4]) -> &mut Self {
        self.emit_raw(OpCode::Syscall, &id)
    }

    /// Emits a complete `System.Contract.Call` of `method` on `contract`.
    pub fn contract_call(
        &mut self,
        contract: &Hash160,
        method: &str,
        flags: CallFlags,
        args: &[ArgValue],
    ) -> &mut Self {
        self.push_packed_args(args)
            .push_int(i64::from(flags.bits()))
            .push_data(method.as_bytes())
            .push_hash160(contract)
            .syscall(CONTRACT_CALL_ID)
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(OpCode::Ret)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_script(self) -> Vec<u8> {
        self.buf
    }
}
