//! Core types for difficulty retargeting
//!
//! Fundamental types consumed by the retargeting engine with proper
//! validation, hex round-trips, and JSON/YAML serialization.

use crate::{Error, Result};
use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block height, 0 = genesis
pub type Height = u64;

/// Packed 32-bit representation of a 256-bit difficulty target
/// (1-byte exponent + 3-byte signed mantissa)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactBits(u32);

impl CompactBits {
    /// Create compact bits from the raw packed value
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Get the raw packed value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl FromStr for CompactBits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > 8 {
            return Err(Error::parse(format!(
                "invalid compact bits '{}': expected up to 8 hex chars",
                s
            )));
        }
        let bits = u32::from_str_radix(digits, 16)
            .map_err(|e| Error::parse(format!("invalid compact bits '{}': {}", s, e)))?;
        Ok(Self(bits))
    }
}

impl fmt::Display for CompactBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Serialize for CompactBits {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CompactBits {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CompactBits::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Full-precision difficulty target: the maximum numeric value a block hash
/// may have to be considered valid. Lower target = higher difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(U256);

impl Target {
    /// The largest representable target
    pub const MAX: Target = Target(U256::MAX);

    /// Create a target from a 256-bit value
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    /// The zero target (never valid as a proof-of-work threshold)
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    /// Get the underlying 256-bit value
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Whether this target is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Convert to bytes (32 bytes, big-endian)
    pub fn to_bytes_be(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    /// Convert to hexadecimal string (64 chars, big-endian)
    pub fn to_hex_be(&self) -> String {
        hex::encode(self.to_bytes_be())
    }

    /// Compute `floor(self * num / den)` through a 512-bit intermediate, so
    /// the multiply-before-divide order never loses precision. Saturates at
    /// the maximum target if the quotient exceeds 256 bits; callers clamp to
    /// the proof-of-work limit right after, so saturation is not observable.
    ///
    /// `den` must be nonzero (guaranteed by validated parameters).
    pub fn mul_div(&self, num: u64, den: u64) -> Target {
        let wide = self.0.full_mul(U256::from(num)) / U512::from(den);
        match U256::try_from(wide) {
            Ok(value) => Target(value),
            Err(_) => Target::MAX,
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(Error::parse(format!(
                "invalid target hex length: expected 64 chars, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| Error::parse(format!("invalid hex in target: {}", e)))?;
        Ok(Self(U256::from_big_endian(&bytes)))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_be())
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_be())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Target::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Block hash (32 bytes, big-endian display order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Create a hash from raw big-endian bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a hash whose numeric value equals the given 256-bit integer
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interpret the hash as an unsigned 256-bit integer
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Whether this hash numerically meets (is at most) the given target
    pub fn meets_target(&self, target: &Target) -> bool {
        self.to_u256() <= target.as_u256()
    }
}

impl FromStr for BlockHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(Error::parse(format!(
                "invalid block hash length: expected 64 hex chars, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| Error::parse(format!("invalid hex in block hash: {}", e)))?;
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Block header view: the subset of header fields the engine consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Packed difficulty bits declared by the header
    pub bits: CompactBits,
    /// Header timestamp (seconds since Unix epoch)
    pub time: i64,
    /// Header hash
    pub hash: BlockHash,
}
