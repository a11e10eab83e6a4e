//! Method argument types and decoded values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::Hash160;

/// Primitive type a method expects at one argument position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// 20-byte account or contract hash.
    Hash160,
    /// Integer literal that fits in 64 bits.
    Integer,
    /// Opaque byte string.
    Bytes,
    /// UTF-8 byte string.
    String,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Hash160 => "hash160",
            ArgType::Integer => "integer",
            ArgType::Bytes => "bytes",
            ArgType::String => "string",
        };
        f.write_str(name)
    }
}

/// An argument decoded out of a call script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    Hash160(Hash160),
    Integer(i64),
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
    String(String),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Hash160(_) => ArgType::Hash160,
            ArgValue::Integer(_) => ArgType::Integer,
            ArgValue::Bytes(_) => ArgType::Bytes,
            ArgValue::String(_) => ArgType::String,
        }
    }

    pub fn as_hash160(&self) -> Option<&Hash160> {
        match self {
            ArgValue::Hash160(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ArgValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Raw payload of a byte or string argument.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArgValue::Bytes(b) => Some(b),
            ArgValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Hash160(h) => write!(f, "{h}"),
            ArgValue::Integer(v) => write!(f, "{v}"),
            ArgValue::Bytes(b) => write!(f, "{}", hex::encode(b)),
            ArgValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_value_json() {
        let v = ArgValue::Bytes(b"1234".to_vec());
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"type":"bytes","value":"31323334"}"#
        );

        let v: ArgValue = serde_json::from_str(r#"{"type":"integer","value":100}"#).unwrap();
        assert_eq!(v, ArgValue::Integer(100));
        assert_eq!(v.arg_type(), ArgType::Integer);
    }

    #[test]
    fn test_string_exposes_bytes() {
        let v = ArgValue::String("cat".into());
        assert_eq!(v.as_bytes(), Some(&b"cat"[..]));
        assert_eq!(v.as_str(), Some("cat"));
        assert_eq!(v.as_integer(), None);
    }
}
