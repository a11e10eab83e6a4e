//! Argument extraction.
//!
//! Arguments are pushed last-first and then packed, so the region reads
//! `argN .. arg1 <count> PACK`, or a lone `NEWARRAY0` for no arguments.

use auction_primitives::{ArgType, ArgValue, Hash160};
use auction_script::{Instruction, OpCode};

use crate::error::{ArgumentError, ValidationError};

/// Strips the packing instructions and returns the element pushes.
pub fn unpack<'i, 'a>(
    region: &'i [Instruction<'a>],
) -> Result<&'i [Instruction<'a>], ValidationError> {
    match region {
        [] => Ok(region),
        [only] if only.opcode() == OpCode::NewArray0 => Ok(&[]),
        [only] if only.opcode() == OpCode::Pack => {
            Err(packing_error("PACK without an element count".to_owned()))
        }
        [elements @ .., count, pack] if pack.opcode() == OpCode::Pack => {
            let declared = decode_integer(count).map_err(|_| {
                packing_error(format!("element count is pushed with {:?}", count.opcode()))
            })?;
            if usize::try_from(declared).ok() != Some(elements.len()) {
                return Err(packing_error(format!(
                    "declares {declared} elements but {} are pushed",
                    elements.len()
                )));
            }
            Ok(elements)
        }
        [.., last] => Err(packing_error(format!(
            "region ends with {:?} instead of PACK",
            last.opcode()
        ))),
    }
}

fn packing_error(reason: String) -> ValidationError {
    ValidationError::InvalidArgumentPacking { reason }
}

/// Unpacks `region` and decodes one value per entry of `expected`, in
/// declaration order.
pub fn extract_arguments(
    region: &[Instruction<'_>],
    expected: &[ArgType],
) -> Result<Vec<ArgValue>, ValidationError> {
    let elements = unpack(region)?;
    if elements.len() != expected.len() {
        return Err(ValidationError::ArityMismatch {
            expected: expected.len(),
            found: elements.len(),
        });
    }

    elements
        .iter()
        .rev()
        .zip(expected)
        .enumerate()
        .map(|(position, (instr, ty))| {
            decode_argument(instr, *ty).map_err(|source| ValidationError::ArgumentDecode {
                position,
                expected: *ty,
                source,
            })
        })
        .collect()
}

/// Decodes one push instruction as a value of type `ty`.
pub fn decode_argument(instr: &Instruction<'_>, ty: ArgType) -> Result<ArgValue, ArgumentError> {
    let opcode = instr.opcode();
    match ty {
        ArgType::Integer => decode_integer(instr).map(ArgValue::Integer),
        ArgType::Hash160 => {
            if opcode != OpCode::PushData1 {
                return Err(ArgumentError::UnexpectedOpcode(opcode));
            }
            Hash160::from_be_slice(instr.operand())
                .map(ArgValue::Hash160)
                .map_err(|_| ArgumentError::HashLength(instr.operand().len()))
        }
        ArgType::Bytes => {
            if !opcode.is_push_data() {
                return Err(ArgumentError::UnexpectedOpcode(opcode));
            }
            Ok(ArgValue::Bytes(instr.operand().to_vec()))
        }
        ArgType::String => {
            if !opcode.is_push_data() {
                return Err(ArgumentError::UnexpectedOpcode(opcode));
            }
            String::from_utf8(instr.operand().to_vec())
                .map(ArgValue::String)
                .map_err(|_| ArgumentError::InvalidUtf8)
        }
    }
}

/// Reads an integer push: `PUSHM1`, `PUSH0..=PUSH16` or a `PUSHINT*`
/// operand as little-endian two's complement of its natural width.
fn decode_integer(instr: &Instruction<'_>) -> Result<i64, ArgumentError> {
    let opcode = instr.opcode();
    if let Some(v) = opcode.small_int() {
        return Ok(v);
    }
    match opcode {
        OpCode::PushInt8
        | OpCode::PushInt16
        | OpCode::PushInt32
        | OpCode::PushInt64
        | OpCode::PushInt128
        | OpCode::PushInt256 => le_to_i64(instr.operand()).ok_or(ArgumentError::IntegerOverflow),
        _ => Err(ArgumentError::UnexpectedOpcode(opcode)),
    }
}

fn le_to_i64(bytes: &[u8]) -> Option<i64> {
    let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
    let fill = if negative { 0xff } else { 0x00 };

    let (low, high) = bytes.split_at(bytes.len().min(8));
    if high.iter().any(|b| *b != fill) {
        return None;
    }

    let mut buf = [fill; 8];
    buf[..low.len()].copy_from_slice(low);
    let value = i64::from_le_bytes(buf);
    // wide operands must keep their sign after truncation
    if !high.is_empty() && (value < 0) != negative {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use auction_script::{decode, ScriptBuilder};
    use proptest::prelude::*;

    use super::*;

    fn region(build: impl FnOnce(&mut ScriptBuilder)) -> Vec<u8> {
        let mut b = ScriptBuilder::new();
        build(&mut b);
        b.ret();
        b.into_script()
    }

    #[test]
    fn test_empty_and_newarray0_mean_no_arguments() {
        assert_eq!(extract_arguments(&[], &[]).unwrap(), vec![]);

        let script = region(|b| {
            b.emit(OpCode::NewArray0);
        });
        let instrs = decode(&script).unwrap();
        assert_eq!(extract_arguments(&instrs, &[]).unwrap(), vec![]);
    }

    #[test]
    fn test_reverse_order_is_restored() {
        let owner = Hash160::new([9; 20]);
        let args = vec![
            ArgValue::Hash160(owner),
            ArgValue::Bytes(b"1234".to_vec()),
            ArgValue::Integer(100),
        ];
        let script = region(|b| {
            b.push_packed_args(&args);
        });
        let instrs = decode(&script).unwrap();

        let values = extract_arguments(
            &instrs,
            &[ArgType::Hash160, ArgType::Bytes, ArgType::Integer],
        )
        .unwrap();
        assert_eq!(values, args);
    }

    #[test]
    fn test_arity_mismatch() {
        let script = region(|b| {
            b.push_packed_args(&[ArgValue::Integer(1), ArgValue::Integer(2)]);
        });
        let instrs = decode(&script).unwrap();
        assert_eq!(
            extract_arguments(&instrs, &[ArgType::Integer]).unwrap_err(),
            ValidationError::ArityMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_count_disagreeing_with_pushes() {
        let script = region(|b| {
            b.push_int(1).push_int(2).push_int(3).emit(OpCode::Pack);
        });
        let instrs = decode(&script).unwrap();
        assert!(matches!(
            extract_arguments(&instrs, &[ArgType::Integer]),
            Err(ValidationError::InvalidArgumentPacking { .. })
        ));
    }

    #[test]
    fn test_region_without_pack() {
        let script = region(|b| {
            b.push_int(1).push_int(2);
        });
        let instrs = decode(&script).unwrap();
        assert!(matches!(
            extract_arguments(&instrs, &[ArgType::Integer]),
            Err(ValidationError::InvalidArgumentPacking { .. })
        ));
    }

    #[test]
    fn test_decode_error_names_position() {
        // makeBet(bidder, bet) with the bet pushed as bytes
        let script = region(|b| {
            b.push_packed_args(&[
                ArgValue::Hash160(Hash160::new([1; 20])),
                ArgValue::Bytes(vec![1, 2]),
            ]);
        });
        let instrs = decode(&script).unwrap();
        assert_eq!(
            extract_arguments(&instrs, &[ArgType::Hash160, ArgType::Integer]).unwrap_err(),
            ValidationError::ArgumentDecode {
                position: 1,
                expected: ArgType::Integer,
                source: ArgumentError::UnexpectedOpcode(OpCode::PushData1),
            }
        );
    }

    #[test]
    fn test_hash_argument_length() {
        let script = region(|b| {
            b.push_data(&[1; 21]);
        });
        let instrs = decode(&script).unwrap();
        assert_eq!(
            decode_argument(&instrs[0], ArgType::Hash160),
            Err(ArgumentError::HashLength(21))
        );
    }

    #[test]
    fn test_string_must_be_utf8() {
        let script = region(|b| {
            b.push_data(&[0xff, 0xfe]);
        });
        let instrs = decode(&script).unwrap();
        assert_eq!(
            decode_argument(&instrs[0], ArgType::String),
            Err(ArgumentError::InvalidUtf8)
        );
    }

    #[test]
    fn test_wide_integers() {
        let mut wide = vec![0xff; 16];
        wide[0] = 0xfe;
        assert_eq!(le_to_i64(&wide), Some(-2));

        let mut big = vec![0; 16];
        big[8] = 1;
        assert_eq!(le_to_i64(&big), None);

        // 2^63 as a 16-byte positive value
        let mut edge = vec![0; 16];
        edge[7] = 0x80;
        assert_eq!(le_to_i64(&edge), None);

        assert_eq!(le_to_i64(&[0x00, 0x80]), Some(-32768));
    }

    proptest! {
        #[test]
        fn proptest_integers_survive_push(value in any::<i64>()) {
            let script = region(|b| {
                b.push_int(value);
            });
            let instrs = decode(&script).unwrap();
            prop_assert_eq!(decode_argument(&instrs[0], ArgType::Integer), Ok(ArgValue::Integer(value)));
        }

        #[test]
        fn proptest_arity_law(pushed in 0usize..6, expected in 0usize..6) {
            prop_assume!(pushed != expected);
            let args: Vec<_> = (0..pushed as i64).map(ArgValue::Integer).collect();
            let script = region(|b| {
                b.push_packed_args(&args);
            });
            let instrs = decode(&script).unwrap();
            let types = vec![ArgType::Integer; expected];
            prop_assert_eq!(
                extract_arguments(&instrs, &types).unwrap_err(),
                ValidationError::ArityMismatch { expected, found: pushed }
            );
        }
    }
}
