//! Impl generators for the fixed-size ledger hash types.
//!
//! Hashes are held in the byte order they take inside a script (big-endian).
//! Every textual form (display, config, JSON) is the reversed, little-endian
//! hex form that node tooling prints.

/// Generates constructors, accessors and conversion traits.
macro_rules! impl_hash_core {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(data: [u8; $len]) -> Self {
                Self(data)
            }

            pub const fn zero() -> Self {
                Self([0; $len])
            }

            /// Script-order bytes.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Builds the hash from script-order bytes.
            pub fn from_be_slice(bytes: &[u8]) -> Result<Self, $crate::hash::HashError> {
                let array: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| $crate::hash::HashError::Length {
                            expected: $len,
                            found: bytes.len(),
                        })?;
                Ok(Self(array))
            }

            /// Parses the little-endian hex form, with or without a `0x` prefix.
            pub fn from_le_hex(s: &str) -> Result<Self, $crate::hash::HashError> {
                let stripped = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                let mut bytes = ::hex::decode(stripped)?;
                bytes.reverse();
                Self::from_be_slice(&bytes)
            }

            /// Little-endian bytes, the order used by the textual form.
            pub fn to_le_bytes(&self) -> [u8; $len] {
                let mut le = self.0;
                le.reverse();
                le
            }

            pub fn to_le_hex(&self) -> String {
                ::hex::encode(self.to_le_bytes())
            }
        }

        impl ::std::convert::AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl ::std::convert::From<[u8; $len]> for $name {
            fn from(data: [u8; $len]) -> Self {
                Self(data)
            }
        }

        impl ::std::convert::From<$name> for [u8; $len] {
            fn from(hash: $name) -> Self {
                hash.0
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::hash::HashError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_le_hex(s)
            }
        }
    };
}

/// Generates `Debug` and `Display`, both in little-endian hex.
macro_rules! impl_hash_fmt {
    ($name:ident) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), self.to_le_hex())
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "0x{}", self.to_le_hex())
            }
        }
    };
}

/// Generates serde impls over the little-endian hex string.
macro_rules! impl_hash_serde {
    ($name:ident, $len:expr) => {
        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_str(&self.to_le_hex())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                struct HashVisitor;

                impl ::serde::de::Visitor<'_> for HashVisitor {
                    type Value = $name;

                    fn expecting(
                        &self,
                        formatter: &mut ::std::fmt::Formatter<'_>,
                    ) -> ::std::fmt::Result {
                        write!(
                            formatter,
                            "a little-endian hex string of {} bytes with an optional 0x prefix",
                            $len
                        )
                    }

                    fn visit_str<E>(self, v: &str) -> Result<$name, E>
                    where
                        E: ::serde::de::Error,
                    {
                        $name::from_le_hex(v).map_err(E::custom)
                    }
                }

                deserializer.deserialize_str(HashVisitor)
            }
        }
    };
}
