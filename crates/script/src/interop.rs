//! Interop service identifiers used as `SYSCALL` operands.

use sha2::{Digest, Sha256};

pub const SYSTEM_CONTRACT_CALL: &str = "System.Contract.Call";

/// `SYSCALL` operand of `System.Contract.Call`.
pub const CONTRACT_CALL_ID: [u8; 4] = [0x62, 0x7d, 0x5b, 0x52];

/// Interop id of a service: the first four bytes of the SHA-256 of its name,
/// read little-endian.
pub fn interop_id(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_call_id_matches_hash() {
        assert_eq!(
            interop_id(SYSTEM_CONTRACT_CALL).to_le_bytes(),
            CONTRACT_CALL_ID
        );
        assert_eq!(interop_id(SYSTEM_CONTRACT_CALL), 0x525b_7d62);
    }
}
