//! Call-shape validation.
//!
//! A contract call script ends with a fixed suffix, counted from the end:
//!
//! ```text
//! ... <packed args> PUSH<flags> PUSHDATA1 <method> PUSHDATA1 <contract BE> SYSCALL <System.Contract.Call>
//! ```
//!
//! Everything before the flags push is the argument region.

use auction_primitives::Hash160;
use auction_script::{CallFlags, Instruction, OpCode, CONTRACT_CALL_ID};

use crate::error::ValidationError;

/// Instructions of the fixed call suffix, plus the argument region.
#[derive(Clone, Copy, Debug)]
pub struct CallSuffix<'i, 'a> {
    arguments: &'i [Instruction<'a>],
    flags: &'i Instruction<'a>,
    method: &'i Instruction<'a>,
    target: &'i Instruction<'a>,
}

impl<'i, 'a> CallSuffix<'i, 'a> {
    /// Splits `instrs` into argument region and call suffix.
    ///
    /// Fails with [`ValidationError::NotAContractCall`] unless the last
    /// instruction is the contract-call syscall.
    pub fn locate(instrs: &'i [Instruction<'a>]) -> Result<Self, ValidationError> {
        let [arguments @ .., flags, method, target, syscall] = instrs else {
            return Err(ValidationError::NotAContractCall {
                reason: "script is shorter than a contract call",
            });
        };

        if syscall.opcode() != OpCode::Syscall || syscall.operand() != CONTRACT_CALL_ID.as_slice() {
            return Err(ValidationError::NotAContractCall {
                reason: "last instruction is not System.Contract.Call",
            });
        }

        Ok(Self {
            arguments,
            flags,
            method,
            target,
        })
    }

    /// Called contract, if the target push holds exactly 20 bytes.
    pub fn target(&self) -> Option<Hash160> {
        if self.target.opcode() != OpCode::PushData1 {
            return None;
        }
        Hash160::from_be_slice(self.target.operand()).ok()
    }

    /// Raw method name bytes, if the method instruction is a data push.
    pub fn method(&self) -> Option<&'a [u8]> {
        self.method
            .opcode()
            .is_push_data()
            .then(|| self.method.operand())
    }

    /// Method name as text; invalid UTF-8 is replaced.
    pub fn method_name(&self) -> String {
        String::from_utf8_lossy(self.method().unwrap_or_default()).into_owned()
    }

    pub fn arguments(&self) -> &'i [Instruction<'a>] {
        self.arguments
    }

    /// Reads the call flags push and checks it against `max`.
    ///
    /// The level is the opcode's distance from `PUSH0`; anything below
    /// `PUSH0` or above `max` is refused.
    pub fn call_flags(&self, max: CallFlags) -> Result<CallFlags, ValidationError> {
        let opcode = self.flags.opcode();
        u8::from(opcode)
            .checked_sub(u8::from(OpCode::Push0))
            .filter(|level| *level <= max.bits())
            .and_then(CallFlags::from_bits)
            .ok_or(ValidationError::InvalidPermission { opcode, max })
    }
}

/// Result of a successful shape check.
#[derive(Clone, Debug)]
pub struct CallShape<'i, 'a> {
    pub call_flags: CallFlags,
    pub target: Hash160,
    pub method: String,
    pub arguments: &'i [Instruction<'a>],
}

/// Proves `instrs` is a single call to `expected_target` with call flags at
/// or below `max_flags`, and returns the candidate argument region.
pub fn validate_shape<'i, 'a>(
    instrs: &'i [Instruction<'a>],
    expected_target: &Hash160,
    max_flags: CallFlags,
) -> Result<CallShape<'i, 'a>, ValidationError> {
    let suffix = CallSuffix::locate(instrs)?;

    let target = suffix.target();
    if target.as_ref() != Some(expected_target) {
        return Err(ValidationError::UnexpectedTarget {
            expected: Some(*expected_target),
            found: target,
        });
    }

    let call_flags = suffix.call_flags(max_flags)?;

    if suffix.method().is_none() {
        return Err(ValidationError::NotAContractCall {
            reason: "method name is not a data push",
        });
    }

    Ok(CallShape {
        call_flags,
        target: *expected_target,
        method: suffix.method_name(),
        arguments: suffix.arguments(),
    })
}

#[cfg(test)]
mod tests {
    use auction_primitives::ArgValue;
    use auction_script::{decode, ScriptBuilder};
    use proptest::prelude::*;

    use super::*;

    fn target() -> Hash160 {
        Hash160::new([0x42; 20])
    }

    fn call_script(flags: u8, args: &[ArgValue]) -> Vec<u8> {
        let mut b = ScriptBuilder::new();
        b.push_packed_args(args)
            .push_int(i64::from(flags))
            .push_data(b"finish")
            .push_hash160(&target())
            .syscall(CONTRACT_CALL_ID)
            .ret();
        b.into_script()
    }

    #[test]
    fn test_accepts_well_formed_call() {
        let script = call_script(15, &[ArgValue::Integer(3)]);
        let instrs = decode(&script).unwrap();
        let shape = validate_shape(&instrs, &target(), CallFlags::ALL).unwrap();

        assert_eq!(shape.call_flags, CallFlags::ALL);
        assert_eq!(shape.target, target());
        assert_eq!(shape.method, "finish");
        assert_eq!(shape.arguments.len(), 3);
    }

    #[test]
    fn test_too_short() {
        let script = [0x11, 0x12, 0x40];
        let instrs = decode(&script).unwrap();
        assert!(matches!(
            validate_shape(&instrs, &target(), CallFlags::ALL),
            Err(ValidationError::NotAContractCall { .. })
        ));
    }

    #[test]
    fn test_other_syscall_is_not_a_call() {
        let mut b = ScriptBuilder::new();
        b.emit(OpCode::NewArray0)
            .push_int(15)
            .push_data(b"finish")
            .push_hash160(&target())
            .syscall([0xb2, 0x79, 0xfc, 0xf6])
            .ret();
        let script = b.into_script();
        let instrs = decode(&script).unwrap();
        assert!(matches!(
            validate_shape(&instrs, &target(), CallFlags::ALL),
            Err(ValidationError::NotAContractCall { .. })
        ));
    }

    #[test]
    fn test_short_target_is_unexpected() {
        let mut b = ScriptBuilder::new();
        b.emit(OpCode::NewArray0)
            .push_int(15)
            .push_data(b"finish")
            .push_data(&[0x42; 19])
            .syscall(CONTRACT_CALL_ID)
            .ret();
        let script = b.into_script();
        let instrs = decode(&script).unwrap();
        assert_eq!(
            validate_shape(&instrs, &target(), CallFlags::ALL).unwrap_err(),
            ValidationError::UnexpectedTarget {
                expected: Some(target()),
                found: None
            }
        );
    }

    #[test]
    fn test_flags_below_push0_are_refused() {
        let mut b = ScriptBuilder::new();
        b.emit(OpCode::NewArray0)
            .emit(OpCode::PushM1)
            .push_data(b"finish")
            .push_hash160(&target())
            .syscall(CONTRACT_CALL_ID)
            .ret();
        let script = b.into_script();
        let instrs = decode(&script).unwrap();
        assert_eq!(
            validate_shape(&instrs, &target(), CallFlags::ALL).unwrap_err(),
            ValidationError::InvalidPermission {
                opcode: OpCode::PushM1,
                max: CallFlags::ALL
            }
        );
    }

    proptest! {
        #[test]
        fn proptest_wrong_target_is_rejected(bytes in any::<[u8; 20]>()) {
            prop_assume!(bytes != [0x42; 20]);
            let other = Hash160::new(bytes);
            let script = call_script(15, &[]);
            let instrs = decode(&script).unwrap();
            prop_assert_eq!(
                validate_shape(&instrs, &other, CallFlags::ALL).unwrap_err(),
                ValidationError::UnexpectedTarget { expected: Some(other), found: Some(target()) }
            );
        }

        #[test]
        fn proptest_flag_levels(flags in 0u8..=16, max in 0u8..=15) {
            let script = call_script(flags, &[]);
            let instrs = decode(&script).unwrap();
            let max = CallFlags::from_bits(max).unwrap();
            let res = validate_shape(&instrs, &target(), max);
            if flags <= max.bits() {
                prop_assert_eq!(res.unwrap().call_flags.bits(), flags);
            } else {
                let is_permission_error = matches!(res, Err(ValidationError::InvalidPermission { .. }));
                prop_assert!(is_permission_error);
            }
        }

        #[test]
        fn proptest_non_call_tail_is_rejected(tail in proptest::collection::vec(0x10u8..=0x20, 0..12)) {
            // push-only scripts never end in a syscall
            let mut script = tail;
            script.push(0x40);
            let instrs = decode(&script).unwrap();
            let is_not_a_call = matches!(
                validate_shape(&instrs, &target(), CallFlags::ALL),
                Err(ValidationError::NotAContractCall { .. })
            );
            prop_assert!(is_not_a_call);
        }
    }
}
