//! NeoVM instruction set.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Largest payload a `PUSHDATA*` instruction may carry.
pub const MAX_ITEM_SIZE: usize = 131_070;

/// One NeoVM operation code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OpCode {
    PushInt8 = 0x00,
    PushInt16 = 0x01,
    PushInt32 = 0x02,
    PushInt64 = 0x03,
    PushInt128 = 0x04,
    PushInt256 = 0x05,
    PushT = 0x08,
    PushF = 0x09,
    PushA = 0x0a,
    PushNull = 0x0b,
    PushData1 = 0x0c,
    PushData2 = 0x0d,
    PushData4 = 0x0e,
    PushM1 = 0x0f,
    Push0 = 0x10,
    Push1 = 0x11,
    Push2 = 0x12,
    Push3 = 0x13,
    Push4 = 0x14,
    Push5 = 0x15,
    Push6 = 0x16,
    Push7 = 0x17,
    Push8 = 0x18,
    Push9 = 0x19,
    Push10 = 0x1a,
    Push11 = 0x1b,
    Push12 = 0x1c,
    Push13 = 0x1d,
    Push14 = 0x1e,
    Push15 = 0x1f,
    Push16 = 0x20,

    Nop = 0x21,
    Jmp = 0x22,
    JmpL = 0x23,
    JmpIf = 0x24,
    JmpIfL = 0x25,
    JmpIfNot = 0x26,
    JmpIfNotL = 0x27,
    JmpEq = 0x28,
    JmpEqL = 0x29,
    JmpNe = 0x2a,
    JmpNeL = 0x2b,
    JmpGt = 0x2c,
    JmpGtL = 0x2d,
    JmpGe = 0x2e,
    JmpGeL = 0x2f,
    JmpLt = 0x30,
    JmpLtL = 0x31,
    JmpLe = 0x32,
    JmpLeL = 0x33,
    Call = 0x34,
    CallL = 0x35,
    CallA = 0x36,
    CallT = 0x37,
    Abort = 0x38,
    Assert = 0x39,
    Throw = 0x3a,
    Try = 0x3b,
    TryL = 0x3c,
    EndTry = 0x3d,
    EndTryL = 0x3e,
    EndFinally = 0x3f,
    Ret = 0x40,
    Syscall = 0x41,

    Depth = 0x43,
    Drop = 0x45,
    Nip = 0x46,
    XDrop = 0x48,
    Clear = 0x49,
    Dup = 0x4a,
    Over = 0x4b,
    Pick = 0x4d,
    Tuck = 0x4e,
    Swap = 0x50,
    Rot = 0x51,
    Roll = 0x52,
    Reverse3 = 0x53,
    Reverse4 = 0x54,
    ReverseN = 0x55,

    InitSSlot = 0x56,
    InitSlot = 0x57,
    LdSFld0 = 0x58,
    LdSFld1 = 0x59,
    LdSFld2 = 0x5a,
    LdSFld3 = 0x5b,
    LdSFld4 = 0x5c,
    LdSFld5 = 0x5d,
    LdSFld6 = 0x5e,
    LdSFld = 0x5f,
    StSFld0 = 0x60,
    StSFld1 = 0x61,
    StSFld2 = 0x62,
    StSFld3 = 0x63,
    StSFld4 = 0x64,
    StSFld5 = 0x65,
    StSFld6 = 0x66,
    StSFld = 0x67,
    LdLoc0 = 0x68,
    LdLoc1 = 0x69,
    LdLoc2 = 0x6a,
    LdLoc3 = 0x6b,
    LdLoc4 = 0x6c,
    LdLoc5 = 0x6d,
    LdLoc6 = 0x6e,
    LdLoc = 0x6f,
    StLoc0 = 0x70,
    StLoc1 = 0x71,
    StLoc2 = 0x72,
    StLoc3 = 0x73,
    StLoc4 = 0x74,
    StLoc5 = 0x75,
    StLoc6 = 0x76,
    StLoc = 0x77,
    LdArg0 = 0x78,
    LdArg1 = 0x79,
    LdArg2 = 0x7a,
    LdArg3 = 0x7b,
    LdArg4 = 0x7c,
    LdArg5 = 0x7d,
    LdArg6 = 0x7e,
    LdArg = 0x7f,
    StArg0 = 0x80,
    StArg1 = 0x81,
    StArg2 = 0x82,
    StArg3 = 0x83,
    StArg4 = 0x84,
    StArg5 = 0x85,
    StArg6 = 0x86,
    StArg = 0x87,

    NewBuffer = 0x88,
    MemCpy = 0x89,
    Cat = 0x8b,
    SubStr = 0x8c,
    Left = 0x8d,
    Right = 0x8e,

    Invert = 0x90,
    And = 0x91,
    Or = 0x92,
    Xor = 0x93,
    Equal = 0x97,
    NotEqual = 0x98,

    Sign = 0x99,
    Abs = 0x9a,
    Negate = 0x9b,
    Inc = 0x9c,
    Dec = 0x9d,
    Add = 0x9e,
    Sub = 0x9f,
    Mul = 0xa0,
    Div = 0xa1,
    Mod = 0xa2,
    Pow = 0xa3,
    Sqrt = 0xa4,
    ModMul = 0xa5,
    ModPow = 0xa6,
    Shl = 0xa8,
    Shr = 0xa9,
    Not = 0xaa,
    BoolAnd = 0xab,
    BoolOr = 0xac,
    Nz = 0xb1,
    NumEqual = 0xb3,
    NumNotEqual = 0xb4,
    Lt = 0xb5,
    Le = 0xb6,
    Gt = 0xb7,
    Ge = 0xb8,
    Min = 0xb9,
    Max = 0xba,
    Within = 0xbb,

    PackMap = 0xbe,
    PackStruct = 0xbf,
    Pack = 0xc0,
    Unpack = 0xc1,
    NewArray0 = 0xc2,
    NewArray = 0xc3,
    NewArrayT = 0xc4,
    NewStruct0 = 0xc5,
    NewStruct = 0xc6,
    NewMap = 0xc8,
    Size = 0xca,
    HasKey = 0xcb,
    Keys = 0xcc,
    Values = 0xcd,
    PickItem = 0xce,
    Append = 0xcf,
    SetItem = 0xd0,
    ReverseItems = 0xd1,
    Remove = 0xd2,
    ClearItems = 0xd3,
    PopItem = 0xd4,

    IsNull = 0xd8,
    IsType = 0xd9,
    Convert = 0xdb,

    AbortMsg = 0xe0,
    AssertMsg = 0xe1,
}

/// How an opcode's operand is laid out after the opcode byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandSize {
    /// Exactly this many bytes.
    Fixed(usize),
    /// A little-endian length of this many bytes, then that many bytes.
    Prefixed(usize),
}

impl OpCode {
    pub const fn operand_size(self) -> OperandSize {
        use OpCode::*;

        match self {
            PushInt8 | Jmp | JmpIf | JmpIfNot | JmpEq | JmpNe | JmpGt | JmpGe | JmpLt | JmpLe
            | Call | EndTry | InitSSlot | LdSFld | StSFld | LdLoc | StLoc | LdArg | StArg
            | NewArrayT | IsType | Convert => OperandSize::Fixed(1),
            PushInt16 | CallT | Try | InitSlot => OperandSize::Fixed(2),
            PushInt32 | PushA | JmpL | JmpIfL | JmpIfNotL | JmpEqL | JmpNeL | JmpGtL | JmpGeL
            | JmpLtL | JmpLeL | CallL | EndTryL | Syscall => OperandSize::Fixed(4),
            PushInt64 | TryL => OperandSize::Fixed(8),
            PushInt128 => OperandSize::Fixed(16),
            PushInt256 => OperandSize::Fixed(32),
            PushData1 => OperandSize::Prefixed(1),
            PushData2 => OperandSize::Prefixed(2),
            PushData4 => OperandSize::Prefixed(4),
            _ => OperandSize::Fixed(0),
        }
    }

    /// Pushes a constant onto the stack without touching existing items.
    pub const fn is_push(self) -> bool {
        (self as u8) <= (OpCode::Push16 as u8) && !matches!(self, OpCode::PushA)
    }

    pub const fn is_push_data(self) -> bool {
        matches!(self, OpCode::PushData1 | OpCode::PushData2 | OpCode::PushData4)
    }

    /// Value of `PUSHM1` and `PUSH0..=PUSH16`.
    pub const fn small_int(self) -> Option<i64> {
        let code = self as u8;
        if code == OpCode::PushM1 as u8 {
            Some(-1)
        } else if code >= OpCode::Push0 as u8 && code <= OpCode::Push16 as u8 {
            Some((code - OpCode::Push0 as u8) as i64)
        } else {
            None
        }
    }

    /// `PUSH<n>` for `n` in `0..=16`.
    pub fn push_small(n: u8) -> Option<Self> {
        if n > 16 {
            return None;
        }
        Self::try_from(OpCode::Push0 as u8 + n).ok()
    }
}
