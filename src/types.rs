//! Core hash types shared by the header codec, chain and Merkle verifier

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SpvError};

/// Hash type: 256-bit hash in wire (internal) byte order
pub type Hash = [u8; 32];

/// Block height
pub type Height = u64;

macro_rules! wire_hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(Hash);

        impl $name {
            /// All-zero hash (the "previous block" of a genesis header).
            pub const ZERO: $name = $name([0u8; 32]);

            /// Wrap bytes that are already in wire order.
            pub const fn from_wire(bytes: Hash) -> Self {
                $name(bytes)
            }

            /// Bytes in wire order.
            pub fn as_wire(&self) -> &Hash {
                &self.0
            }

            /// Bytes in wire order, by value.
            pub fn to_wire(self) -> Hash {
                self.0
            }

            /// Bytes in display order (reversed wire order).
            pub fn to_display_bytes(&self) -> Hash {
                let mut out = self.0;
                out.reverse();
                out
            }

            /// Parse a 64-char hex string given in display order.
            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes = hex::decode(s)?;
                if bytes.len() != 32 {
                    return Err(SpvError::Decode(format!(
                        "{} must be 32 bytes, got {}",
                        stringify!($name),
                        bytes.len()
                    )));
                }
                let mut wire = [0u8; 32];
                wire.copy_from_slice(&bytes);
                wire.reverse();
                Ok($name(wire))
            }

            /// Render as display-order hex.
            pub fn to_hex(&self) -> String {
                hex::encode(self.to_display_bytes())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = SpvError;

            fn from_str(s: &str) -> Result<Self> {
                $name::from_hex(s)
            }
        }

        impl From<Hash> for $name {
            fn from(bytes: Hash) -> Self {
                $name(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $name::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_hash_newtype!(
    /// Block hash. Stored in wire order, displayed and parsed in reversed
    /// ("corrected") order, so equality never depends on byte order.
    BlockHash
);

wire_hash_newtype!(
    /// Transaction id, same byte-order conventions as [`BlockHash`].
    Txid
);
