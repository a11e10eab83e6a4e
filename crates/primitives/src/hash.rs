//! Ledger hash types.

use thiserror::Error;

/// Errors parsing a hash from bytes or text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HashError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Input had the wrong number of bytes.
    #[error("expected {expected} bytes, got {found}")]
    Length { expected: usize, found: usize },
}

/// 160-bit script hash identifying a contract or an account.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash160([u8; 20]);

impl_hash_core!(Hash160, 20);
impl_hash_fmt!(Hash160);
impl_hash_serde!(Hash160, 20);

/// 256-bit transaction or request hash.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256([u8; 32]);

impl_hash_core!(Hash256, 32);
impl_hash_fmt!(Hash256);
impl_hash_serde!(Hash256, 32);

#[cfg(test)]
mod tests {
    use super::*;

    const AUCTION_LE: &str = "29c1332ede5f2ac639fa2c72b9e29babf110faaf";

    #[test]
    fn test_le_hex_reverses_script_order() {
        let hash = Hash160::from_le_hex(AUCTION_LE).unwrap();
        assert_eq!(hash.as_bytes()[0], 0xaf);
        assert_eq!(hash.as_bytes()[19], 0x29);
        assert_eq!(hash.to_le_hex(), AUCTION_LE);
        assert_eq!(hash.to_string(), format!("0x{AUCTION_LE}"));
    }

    #[test]
    fn test_prefixed_and_bare_forms_agree() {
        let bare: Hash160 = AUCTION_LE.parse().unwrap();
        let prefixed: Hash160 = format!("0x{AUCTION_LE}").parse().unwrap();
        assert_eq!(bare, prefixed);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = Hash160::from_be_slice(&[1u8; 19]).unwrap_err();
        assert_eq!(
            err,
            HashError::Length {
                expected: 20,
                found: 19
            }
        );
        assert!(matches!(
            Hash256::from_le_hex("zz"),
            Err(HashError::Hex(_))
        ));
    }

    #[test]
    fn test_hex_error_compares_by_value() {
        assert_eq!(
            Hash160::from_le_hex("0xzz").unwrap_err(),
            HashError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
        assert_ne!(
            Hash160::from_le_hex("abc").unwrap_err(),
            HashError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'a', index: 0 })
        );
    }

    #[test]
    fn test_serde_uses_le_hex() {
        let hash = Hash160::from_le_hex(AUCTION_LE).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{AUCTION_LE}\""));
        let back: Hash160 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
