//!
//! This module defines the Target and CompactTarget types used for representing
//! difficulty targets on the Unicity Alpha network, together with the proof of
//! work check performed on every incoming header.
//!
//! A Target is a 256-bit value that represents the difficulty threshold for mining
//! a block. The lower the target, the higher the difficulty. CompactTarget is the
//! 32-bit floating-point-like encoding of a target stored in the `bits` field of
//! block headers. Decoding and encoding follow the reference node bit for bit,
//! including its handling of negative and overflowing encodings, because every
//! node must derive the same target from the same `bits`.
//!
use std::{fmt, str::FromStr};

use bitcoin::{BlockHash, hashes::Hash};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::params::Params;

/// Sign bit of the compact mantissa.
const COMPACT_SIGN_BIT: u32 = 0x0080_0000;
/// Mantissa bits of a compact target, excluding the sign bit.
const COMPACT_MANTISSA_MASK: u32 = 0x007f_ffff;

/// Represents a target value expressed as an unsigned 256-bit integer.
///
/// # Example
///
/// ```
/// use unicity_prism_pow::pow::{CompactTarget, Target};
///
/// let target = Target::from_hex("00000000ffff0000000000000000000000000000000000000000000000000000").unwrap();
/// let compact = target.to_compact();
///
/// assert_eq!(compact, CompactTarget::new(0x1d00ffff));
/// assert_eq!(Target::from_compact(compact), Some(target));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(U256);

impl Target {
    /// Creates a new Target instance with the specified U256 value.
    ///
    /// # Arguments
    ///
    /// * `target` - A U256 value representing the target to be stored
    ///
    /// # Example
    ///
    /// ```
    /// use primitive_types::U256;
    /// use unicity_prism_pow::pow::Target;
    ///
    /// let target = Target::new(U256::from(100u64));
    /// assert_eq!(target.as_u256(), U256::from(100u64));
    /// ```
    pub const fn new(target: U256) -> Self {
        Target(target)
    }

    /// Creates a new `Target` from a big-endian hexadecimal string.
    ///
    /// Returns `None` if the string is not valid hex or does not fit in 256
    /// bits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        U256::from_str_radix(hex, 16).ok().map(Target)
    }

    /// Creates a Target from bytes (big-endian).
    ///
    /// # Arguments
    ///
    /// * `bytes` - The big-endian byte representation of a 256-bit target
    ///
    /// # Example
    ///
    /// ```
    /// use unicity_prism_pow::pow::Target;
    ///
    /// let mut bytes = [0u8; 32];
    /// bytes[31] = 0x01;
    /// assert_eq!(Target::from_be_bytes(&bytes), Target::from_hex("01").unwrap());
    /// ```
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        Self(U256::from_big_endian(bytes))
    }

    /// Creates a Target from bytes (little-endian), the byte order of hashes
    /// as they are produced by the hashing functions.
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        Self(U256::from_little_endian(bytes))
    }

    /// Returns the target as 32 big-endian bytes.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    /// Creates a new instance of `Target` with a zero-valued underlying `U256` integer.
    pub const fn zero() -> Self {
        Target(U256::zero())
    }

    /// The easiest target allowed on mainnet and testnet,
    /// `00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff`.
    pub const fn mainnet_max_target() -> Self {
        Target(U256([u64::MAX, u64::MAX, u64::MAX, 0x0000_0fff_ffff_ffff]))
    }

    /// The easiest target allowed on regtest,
    /// `7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff`.
    pub const fn regtest_max_target() -> Self {
        Target(U256([u64::MAX, u64::MAX, u64::MAX, 0x7fff_ffff_ffff_ffff]))
    }

    /// Returns the underlying 256-bit magnitude.
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Returns `true` if the target is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Number of significant bits of the target (0 for zero).
    pub fn bits(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation, reason = "bit length of a U256 is at most 256")]
        let bits = self.0.bits() as u32;
        bits
    }

    /// Calculates the difficulty of the current target relative to a maximum attainable target.
    ///
    /// The result is `max_attainable_target / self`, saturated at `u128::MAX`.
    ///
    /// # Arguments
    /// * `max_attainable_target` - The easiest target allowed on the network,
    ///   which has difficulty 1
    ///
    /// # Returns
    /// * `Some(u128)` - The calculated difficulty
    /// * `None` - When the current target is zero
    ///
    /// # Example
    ///
    /// ```
    /// use unicity_prism_pow::pow::Target;
    ///
    /// let max_target = Target::from_hex("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").unwrap();
    /// let target = Target::from_hex("0000000000000000000000000000000000000000000000000000000000000100").unwrap();
    ///
    /// assert_eq!(Target::from_hex("01").unwrap().difficulty(max_target), Some(u128::MAX));
    /// assert_eq!(target.difficulty(max_target), Some(u128::MAX));
    /// ```
    pub fn difficulty(self, max_attainable_target: Target) -> Option<u128> {
        let diff = max_attainable_target.0.checked_div(self.0)?;
        if diff > U256::from(u128::MAX) {
            Some(u128::MAX)
        } else {
            Some(diff.as_u128())
        }
    }

    /// Converts the difficulty value to a floating-point representation.
    ///
    /// Only meant for display; consensus code never looks at this value.
    pub fn difficulty_float(self, max_attainable_target: Target) -> Option<f64> {
        let diff = self.difficulty(max_attainable_target)?;
        #[allow(clippy::cast_precision_loss, reason = "display only")]
        let diff = diff as f64;
        Some(diff)
    }

    /// Expected number of hashes needed to meet this target,
    /// `2^256 / (target + 1)`. Chain work is the sum of this value over all
    /// blocks.
    ///
    /// A zero target cannot be met by any hash and yields the maximum value.
    pub fn to_work(self) -> Option<Work> {
        if self.0.is_zero() {
            return Some(Work::new(U256::max_value()));
        }

        // 2^256 / 2^256
        if self.0 == U256::max_value() {
            return Some(Work::new(U256::one()));
        }

        // 2^256 does not fit in 256 bits, so use (~x / (x + 1)) + 1 instead.
        let increment = self.0.checked_add(U256::one())?;
        let inverted = !self.0;

        let result = inverted.checked_div(increment)?;
        Some(Work::new(result.checked_add(U256::one())?))
    }

    /// Converts a compact target into a Target, accepting only encodings that
    /// can be a valid proof of work target.
    ///
    /// The compact format stores a 1-byte exponent and a 3-byte mantissa
    /// whose top bit is a sign bit. The target is
    /// `mantissa * 256^(exponent - 3)`.
    ///
    /// # Arguments
    ///
    /// * `compact` - The `bits` field of a block header
    ///
    /// # Returns
    ///
    /// * `Some(Target)` - The decoded target
    /// * `None` - If the encoding is negative, overflows 256 bits or decodes
    ///   to zero. Use [`CompactTarget::decode`] to inspect the flags
    ///   individually.
    ///
    /// # Example
    ///
    /// ```
    /// use unicity_prism_pow::pow::{CompactTarget, Target};
    ///
    /// assert!(Target::from_compact(CompactTarget::new(0x1e0fffff)).is_some());
    /// // Sign bit set.
    /// assert_eq!(Target::from_compact(CompactTarget::new(0x04923456)), None);
    /// ```
    pub fn from_compact(compact: CompactTarget) -> Option<Self> {
        let decoded = compact.decode();
        if decoded.negative || decoded.overflow || decoded.target.is_zero() {
            return None;
        }
        Some(decoded.target)
    }

    /// Converts a target value into its normalized compact representation.
    ///
    /// The size byte holds the number of significant bytes and the mantissa
    /// the three most significant of them. If the top mantissa bit would be
    /// set it is shifted out into an extra size byte, so the result never
    /// reads as negative. Precision beyond 24 significant bits is truncated.
    #[allow(clippy::arithmetic_side_effects, reason = "size is at most 33, shifts stay in range")]
    pub fn to_compact(self) -> CompactTarget {
        let mut size = self.bits().div_ceil(8);

        let mut compact = if size <= 3 {
            self.0.low_u32() << (8 * (3 - size))
        } else {
            (self.0 >> (8 * (size - 3))).low_u32()
        };

        if compact & COMPACT_SIGN_BIT != 0 {
            compact >>= 8;
            size += 1;
        }

        CompactTarget(compact | (size << 24))
    }
}

impl From<BlockHash> for Target {
    /// Interprets a block hash as a little-endian 256-bit number.
    fn from(hash: BlockHash) -> Self {
        Target::from_le_bytes(&hash.to_byte_array())
    }
}

impl fmt::LowerHex for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Errors returned when parsing a [`CompactTarget`] from text.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompactTargetError {
    /// The string is not a hexadecimal `u32`.
    #[error("Invalid compact target: {0}")]
    InvalidHex(String),
}

/// Compact representation of a Target, as used in block headers.
///
/// # Example
///
/// ```
/// use unicity_prism_pow::pow::CompactTarget;
///
/// let compact: CompactTarget = "0x1d00ffff".parse().unwrap();
/// assert_eq!(compact, CompactTarget::new(0x1d00ffff));
/// assert_eq!(compact.to_string(), "1d00ffff");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompactTarget(u32);

/// The result of decoding a [`CompactTarget`] without validation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodedTarget {
    /// The decoded magnitude, truncated to 256 bits.
    pub target: Target,
    /// The sign bit was set on a non-zero mantissa.
    pub negative: bool,
    /// The encoded value does not fit in 256 bits.
    pub overflow: bool,
}

impl CompactTarget {
    /// Wraps a raw `bits` value as found in a block header.
    pub const fn new(target: u32) -> Self {
        CompactTarget(target)
    }

    /// Returns the raw `bits` value.
    pub const fn to_consensus(self) -> u32 {
        self.0
    }

    /// Decodes the compact value into a magnitude together with its sign and
    /// overflow flags.
    ///
    /// The magnitude is `mantissa * 256^(exponent - 3)`, computed in 256 bits
    /// with high bits discarded. The flags are only raised when the mantissa
    /// left after dropping bytes for a small exponent is non-zero, so
    /// encodings of zero are never negative or overflowing.
    #[allow(clippy::arithmetic_side_effects, reason = "shift widths are range checked")]
    pub fn decode(self) -> DecodedTarget {
        let size = self.0 >> 24;
        let mut word = self.0 & COMPACT_MANTISSA_MASK;

        // Small exponents drop mantissa bytes before the flags are computed.
        let target = if size <= 3 {
            word >>= 8 * (3 - size);
            U256::from(word)
        } else {
            let shift = 8 * (size - 3);
            if shift >= 256 { U256::zero() } else { U256::from(word) << shift }
        };

        let negative = word != 0 && self.0 & COMPACT_SIGN_BIT != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

        DecodedTarget { target: Target(target), negative, overflow }
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::LowerHex for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for CompactTarget {
    type Err = CompactTargetError;

    /// Parses a hexadecimal `bits` value, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u32::from_str_radix(digits, 16)
            .map(CompactTarget)
            .map_err(|_| CompactTargetError::InvalidHex(s.to_string()))
    }
}

impl From<u32> for CompactTarget {
    fn from(bits: u32) -> Self {
        CompactTarget(bits)
    }
}

/// Amount of work represented by a target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Work(U256);

impl Work {
    /// Creates a new Work value.
    pub fn new(work: U256) -> Self {
        Work(work)
    }

    /// Returns the underlying 256-bit amount.
    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

/// Checks that `hash` satisfies the target claimed by `bits`.
///
/// # Arguments
///
/// * `hash` - The block hash, read as a little-endian 256-bit number
/// * `bits` - The compact target claimed by the block header
/// * `params` - Consensus parameters supplying the maximum attainable target
///
/// # Returns
///
/// `false` if the claimed target is negative, zero, overflowing or easier
/// than the network's maximum attainable target, and `false` if the hash is
/// numerically greater than the target. A hash equal to the target passes.
///
/// # Example
///
/// ```
/// use bitcoin::{BlockHash, hashes::Hash};
/// use unicity_prism_pow::{Params, pow::{CompactTarget, check_proof_of_work}};
///
/// let bits = CompactTarget::new(0x1d00ffff);
/// assert!(check_proof_of_work(BlockHash::all_zeros(), bits, &Params::MAINNET));
/// assert!(!check_proof_of_work(BlockHash::all_zeros(), CompactTarget::new(0), &Params::MAINNET));
/// ```
pub fn check_proof_of_work(hash: BlockHash, bits: CompactTarget, params: &Params) -> bool {
    hash_meets_target(Target::from(hash), bits, params)
}

/// Same as [`check_proof_of_work`] for a hash already converted to a number.
pub fn hash_meets_target(hash: Target, bits: CompactTarget, params: &Params) -> bool {
    let DecodedTarget { target, negative, overflow } = bits.decode();

    if negative || target.is_zero() || overflow || target > params.max_attainable_target {
        trace!(%bits, negative, overflow, "Claimed target out of range");
        return false;
    }

    hash <= target
}
