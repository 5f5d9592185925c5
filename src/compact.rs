//! Compact target codec
//!
//! Packs a 256-bit difficulty target into the 32-bit floating-point-like
//! representation stored in block headers: a 1-byte base-256 exponent
//! followed by a 3-byte signed mantissa. Decoding reports the negative and
//! overflow conditions; both make the encoding invalid for proof-of-work and
//! must fail downstream validation.

use crate::types::{CompactBits, Target};
use primitive_types::U256;

/// Mantissa width in bits
const PRECISION: u32 = 24;

/// Sign bit of the packed mantissa
const SIGN_BIT: u32 = 1 << (PRECISION - 1);

/// Unsigned mantissa mask (also the maximum unsigned mantissa)
const MANTISSA_MASK: u32 = SIGN_BIT - 1;

/// Result of unpacking a compact representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// The expanded target. Meaningless when `negative` or `overflow` is set.
    pub target: Target,
    /// The packed sign bit was set with a nonzero mantissa
    pub negative: bool,
    /// The implied byte shift exceeds 256 bits
    pub overflow: bool,
}

impl Decoded {
    /// Whether the decoded value is usable as a proof-of-work threshold
    pub fn is_valid(&self) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero()
    }
}

/// Unpack compact bits into a full-width target with validity flags.
pub fn decode(bits: CompactBits) -> Decoded {
    let compact = bits.value();
    let size = compact >> PRECISION;
    let mantissa = compact & MANTISSA_MASK;

    // The exponent counts total bytes; a mantissa of 3 bytes means sizes
    // below 4 shift right instead of left.
    let target = if size <= 3 {
        U256::from(mantissa >> (8 * (3 - size)))
    } else {
        U256::from(mantissa) << (8 * (size - 3) as usize)
    };

    let negative = mantissa != 0 && compact & SIGN_BIT != 0;
    let overflow = mantissa != 0
        && (size > 34 || (mantissa > 0xff && size > 33) || (mantissa > 0xffff && size > 32));

    Decoded {
        target: Target::new(target),
        negative,
        overflow,
    }
}

/// Pack a target into its minimal normalized compact form.
///
/// The inverse of [`decode`] for every normalized value: low-order bits
/// beyond the 3-byte mantissa are truncated, and a mantissa whose high bit
/// would read as a sign is renormalized by bumping the exponent.
pub fn encode(target: Target) -> CompactBits {
    let value = target.as_u256();
    let mut size = (value.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (value.low_u64() << (8 * (3 - size))) as u32
    } else {
        (value >> (8 * (size - 3))).low_u64() as u32
    };

    // The packed mantissa is signed; renormalize if the sign bit is set.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    CompactBits::new(compact | (size as u32) << PRECISION)
}
