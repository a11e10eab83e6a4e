//! Native contracts the backend calls directly.

use auction_primitives::{ArgValue, Hash160};
use auction_script::{CallFlags, OpCode, ScriptBuilder, CONTRACT_CALL_ID};

/// Notary contract, holder of notary deposits.
pub const NOTARY: Hash160 = Hash160::new([
    0x3b, 0xec, 0x35, 0x31, 0x11, 0x9b, 0xba, 0xd7, 0x6d, 0xd0, 0x44, 0x92, 0x0b, 0x0d, 0xe6, 0xc3,
    0x19, 0x4f, 0xe1, 0xc1,
]);

/// GAS token contract.
pub const GAS: Hash160 = Hash160::new([
    0xcf, 0x76, 0xe2, 0x8b, 0xd0, 0x06, 0x2c, 0x4a, 0x47, 0x8e, 0xe3, 0x55, 0x61, 0x01, 0x13, 0x19,
    0xf3, 0xcf, 0xa4, 0xd2,
]);

/// `GAS.transfer(from, Notary, amount, [to, till])`, which the Notary
/// contract credits as a deposit for `to` locked until block `till`.
pub fn notary_deposit_script(from: &Hash160, to: &Hash160, amount: i64, till: u32) -> Vec<u8> {
    let mut b = ScriptBuilder::new();
    // data argument: [to, till]
    b.push_int(i64::from(till))
        .push_hash160(to)
        .push_int(2)
        .emit(OpCode::Pack);
    for arg in [
        ArgValue::Integer(amount),
        ArgValue::Hash160(NOTARY),
        ArgValue::Hash160(*from),
    ] {
        b.push_arg(&arg);
    }
    b.push_int(4)
        .emit(OpCode::Pack)
        .push_int(i64::from(CallFlags::ALL.bits()))
        .push_data(b"transfer")
        .push_hash160(&GAS)
        .syscall(CONTRACT_CALL_ID)
        .ret();
    b.into_script()
}
