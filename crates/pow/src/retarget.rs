//! Difficulty retargeting.
//!
//! The retargeting schedule changed several times over the life of the
//! Alpha chain. Every rule is keyed on the height of the last block before
//! the one being mined (the tip), so historical blocks are always checked
//! against the rules that were active when they were produced:
//!
//! | tip height      | timespan | spacing | interval | history factor |
//! |-----------------|----------|---------|----------|----------------|
//! | < 25199         | params   | params  | params   | 12             |
//! | 25199 ..= 64006 | 2 h      | 150 s   | 48       | 12             |
//! | 64007 ..= 68998 | 30 min   | 150 s   | 12       | 48             |
//! | >= 68999        | 30 min   | 150 s   | 12       | 4              |
//!
//! On top of that the measured timespan is clamped to a height dependent
//! band, and from 64595 it is averaged over `history factor` intervals.

use primitive_types::U256;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::{
    chain::ChainEntry,
    params::Params,
    pow::{CompactTarget, Target},
};

/// Tip height from which the interval shrinks to 48 blocks.
pub const TWO_HOUR_TIMESPAN_HEIGHT: u32 = 25_199;
/// Tip height from which the interval shrinks to 12 blocks.
pub const HALF_HOUR_TIMESPAN_HEIGHT: u32 = 64_007;
/// Tip height from which the history factor drops from 48 to 4.
pub const SHORT_HISTORY_HEIGHT: u32 = 68_999;
/// First tip height of the temporary long look-back window.
pub const LONG_WINDOW_START_HEIGHT: u32 = 62_400;
/// End (exclusive) of the temporary long look-back window.
pub const LONG_WINDOW_END_HEIGHT: u32 = 64_000;
/// Tip height from which the long look-back window is permanent and the
/// measured timespan is averaged.
pub const AVERAGED_WINDOW_HEIGHT: u32 = 64_595;
/// First tip height of the temporary quarter clamp band.
pub const QUARTER_CLAMP_START_HEIGHT: u32 = 60_000;
/// Tip height from which the ten percent clamp band applies.
pub const TENTH_CLAMP_HEIGHT: u32 = 64_079;

/// Default history factor.
const DEFAULT_HISTORY_FACTOR: i64 = 12;

/// Bits above which a target is halved before scaling so the product with a
/// timespan cannot leave 256 bits.
const SCALE_SHIFT_THRESHOLD: u32 = 235;

/// Errors from the retargeting code.
///
/// Neither variant means the candidate block is invalid. Both mean the caller
/// handed over inconsistent inputs, and must be treated as fatal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetargetError {
    /// The block index ran out of history before the look-back window was
    /// covered.
    #[error(
        "Insufficient history at height {height}: needed {required} predecessors, found {walked}"
    )]
    InsufficientHistory { height: u32, required: i64, walked: i64 },

    /// The consensus parameters cannot produce a retarget interval.
    #[error("Invalid consensus parameters: {0}")]
    InvalidParams(&'static str),
}

/// How far the measured timespan may stray from the target timespan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClampBand {
    /// `[timespan / 4, timespan * 4]`.
    Quarter,
    /// `[timespan / 2, timespan * 8]`.
    HalfToEightfold,
    /// `[timespan / 1.1, timespan * 1.1]`.
    Tenth,
}

impl ClampBand {
    /// Selects the band for a tip height.
    pub fn for_height(height: u32) -> Self {
        if height < TWO_HOUR_TIMESPAN_HEIGHT
            || (QUARTER_CLAMP_START_HEIGHT..TENTH_CLAMP_HEIGHT).contains(&height)
        {
            ClampBand::Quarter
        } else if height >= TENTH_CLAMP_HEIGHT {
            ClampBand::Tenth
        } else {
            ClampBand::HalfToEightfold
        }
    }

    /// Lower and upper bound for the measured timespan.
    ///
    /// The ten percent band was historically computed in floating point and
    /// truncated on assignment. `floor(t * 10 / 11)` and `floor(t * 11 / 10)`
    /// select the same bounds for every timespan in use.
    #[allow(clippy::arithmetic_side_effects, reason = "constant non-zero divisors")]
    pub fn bounds(self, timespan: i64) -> (i64, i64) {
        match self {
            ClampBand::Quarter => (timespan / 4, timespan.saturating_mul(4)),
            ClampBand::HalfToEightfold => (timespan / 2, timespan.saturating_mul(8)),
            ClampBand::Tenth => {
                (timespan.saturating_mul(10) / 11, timespan.saturating_mul(11) / 10)
            }
        }
    }

    /// Clamps `actual` into the band.
    pub fn clamp(self, actual: i64, timespan: i64) -> i64 {
        let (lower, upper) = self.bounds(timespan);
        actual.max(lower).min(upper)
    }
}

/// The retargeting rules in force for the block after a given tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetargetRules {
    /// Target duration of one retarget interval, in seconds.
    pub timespan: i64,
    /// Target duration of one block, in seconds.
    pub spacing: i64,
    /// Blocks between retargets.
    pub interval: i64,
    /// Number of intervals the long look-back window covers.
    pub history_factor: i64,
    /// Allowed band for the measured timespan.
    pub clamp: ClampBand,
    /// Look back `history_factor * interval` blocks instead of one interval.
    pub long_window: bool,
    /// Divide the measured timespan by `history_factor`.
    pub averaged: bool,
}

impl RetargetRules {
    /// Evaluates the schedule for the block following a tip at `height`.
    pub fn for_height(height: u32, params: &Params) -> Result<Self, RetargetError> {
        let (timespan, spacing, history_factor) = if height < TWO_HOUR_TIMESPAN_HEIGHT {
            let timespan = i64::try_from(params.pow_target_timespan)
                .map_err(|_| RetargetError::InvalidParams("target timespan out of range"))?;
            let spacing = i64::try_from(params.pow_target_spacing)
                .map_err(|_| RetargetError::InvalidParams("target spacing out of range"))?;
            (timespan, spacing, DEFAULT_HISTORY_FACTOR)
        } else if height < HALF_HOUR_TIMESPAN_HEIGHT {
            (2 * 60 * 60, 150, DEFAULT_HISTORY_FACTOR)
        } else if height < SHORT_HISTORY_HEIGHT {
            (30 * 60, 150, 48)
        } else {
            (30 * 60, 150, 4)
        };

        let interval = timespan
            .checked_div(spacing)
            .filter(|interval| *interval > 0)
            .ok_or(RetargetError::InvalidParams("retarget interval must be positive"))?;

        let rules = RetargetRules {
            timespan,
            spacing,
            interval,
            history_factor,
            clamp: ClampBand::for_height(height),
            long_window: (LONG_WINDOW_START_HEIGHT..LONG_WINDOW_END_HEIGHT).contains(&height)
                || height >= AVERAGED_WINDOW_HEIGHT,
            averaged: height >= AVERAGED_WINDOW_HEIGHT,
        };
        trace!(height, ?rules, "Selected retarget rules");
        Ok(rules)
    }

    /// Whether the block after a tip at `height` starts a new interval.
    #[allow(clippy::arithmetic_side_effects, reason = "interval is positive by construction")]
    pub fn is_retarget_height(&self, height: u32) -> bool {
        (i64::from(height) + 1) % self.interval == 0
    }

    /// Number of predecessors of the tip to walk back to the first block of
    /// the measured window.
    ///
    /// The first retarget after genesis has one block less to look at, since
    /// nothing precedes genesis.
    #[allow(clippy::arithmetic_side_effects, reason = "small positive schedule constants")]
    pub fn lookback(&self, height: u32) -> i64 {
        if self.long_window {
            self.history_factor * self.interval
        } else if i64::from(height) + 1 == self.interval {
            self.interval - 1
        } else {
            self.interval
        }
    }
}

/// Computes the compact target the block following `tip` must meet.
///
/// # Arguments
///
/// * `tip` - The last block of the chain, or `None` when the next block is
///   genesis
/// * `candidate_time` - Timestamp of the block being built or validated. It
///   only matters on networks that allow minimum difficulty blocks.
/// * `params` - Consensus parameters of the network
///
/// # Errors
///
/// [`RetargetError::InsufficientHistory`] if the block index cannot supply the
/// look-back window, [`RetargetError::InvalidParams`] for parameters without a
/// valid retarget interval. Neither is a verdict on the candidate block.
#[allow(clippy::arithmetic_side_effects, reason = "history factor is a non-zero constant")]
pub fn next_work_required<E: ChainEntry>(
    tip: Option<E>,
    candidate_time: i64,
    params: &Params,
) -> Result<CompactTarget, RetargetError> {
    let pow_limit = params.max_attainable_target;
    let pow_limit_bits = pow_limit.to_compact();

    let Some(tip) = tip else {
        return Ok(pow_limit_bits);
    };

    let height = tip.height();
    let rules = RetargetRules::for_height(height, params)?;

    if !rules.is_retarget_height(height) {
        if params.allow_min_difficulty_blocks {
            // A block arriving more than two spacings after the tip may be
            // mined at minimum difficulty.
            if candidate_time > tip.time().saturating_add(rules.spacing.saturating_mul(2)) {
                warn!(height, candidate_time, "Allowing minimum difficulty block");
                return Ok(pow_limit_bits);
            }
            return Ok(last_non_min_difficulty_bits(tip, rules.interval, pow_limit_bits));
        }
        return Ok(tip.bits());
    }

    let required = rules.lookback(height);
    let first = walk_back(&tip, required).ok_or_else(|| {
        let walked = available_history(&tip, required);
        error!(height, required, walked, "Block index does not cover the retarget window");
        RetargetError::InsufficientHistory { height, required, walked }
    })?;

    if params.no_pow_retargeting {
        return Ok(tip.bits());
    }

    let mut actual = tip.time().saturating_sub(first.time());
    if rules.averaged {
        actual /= rules.history_factor;
    }
    let clamped = rules.clamp.clamp(actual, rules.timespan);

    let old_target = tip.bits().decode().target;
    let mut new_target = scale_target(old_target, clamped, rules.timespan);
    if new_target > pow_limit {
        new_target = pow_limit;
    }
    let new_bits = new_target.to_compact();

    debug!(
        height,
        actual,
        clamped,
        timespan = rules.timespan,
        old_bits = %tip.bits(),
        %new_bits,
        "Retargeted difficulty"
    );
    Ok(new_bits)
}

/// Checks that a header's `bits` equal the value the chain requires after
/// `tip`.
///
/// # Returns
///
/// * `Ok(true)` - The header claims exactly the required target
/// * `Ok(false)` - The header claims any other target
///
/// # Errors
///
/// Same as [`next_work_required`].
pub fn check_header_bits<E: ChainEntry>(
    tip: Option<E>,
    header_time: i64,
    bits: CompactTarget,
    params: &Params,
) -> Result<bool, RetargetError> {
    let expected = next_work_required(tip, header_time, params)?;
    if expected != bits {
        debug!(%expected, %bits, "Header bits do not match required work");
    }
    Ok(expected == bits)
}

/// Scales `target` by `actual / timespan`.
///
/// # Arguments
///
/// * `target` - The target of the last block
/// * `actual` - Measured (and clamped) timespan in seconds
/// * `timespan` - Target timespan in seconds
///
/// Wide targets are halved first and doubled afterwards so that the
/// intermediate product stays within 256 bits; the multiplication happens
/// before the division and wraps like the reference arithmetic. A
/// non-positive timespan leaves the target unchanged.
pub fn scale_target(target: Target, actual: i64, timespan: i64) -> Target {
    let (Ok(actual), Ok(timespan)) = (u64::try_from(actual), u64::try_from(timespan)) else {
        return target;
    };
    if timespan == 0 {
        return target;
    }

    let shift = target.bits() > SCALE_SHIFT_THRESHOLD;
    let mut value = target.as_u256();
    if shift {
        value = value >> 1u32;
    }
    let (product, _) = value.overflowing_mul(U256::from(actual));
    value = product.checked_div(U256::from(timespan)).unwrap_or(product);
    if shift {
        value = value << 1u32;
    }
    Target::new(value)
}

/// Walks back from `tip` past blocks mined under the minimum difficulty rule
/// and returns the bits of the first block that was not, stopping at an
/// interval boundary or the start of the history.
#[allow(clippy::arithmetic_side_effects, reason = "interval is positive by construction")]
fn last_non_min_difficulty_bits<E: ChainEntry>(
    tip: E,
    interval: i64,
    pow_limit_bits: CompactTarget,
) -> CompactTarget {
    let mut entry = tip;
    loop {
        // The order of these checks is consensus critical.
        let Some(prev) = entry.prev() else { break };
        if i64::from(entry.height()) % interval == 0 || entry.bits() != pow_limit_bits {
            break;
        }
        entry = prev;
    }
    entry.bits()
}

/// Follows `steps` predecessor links from `tip`.
fn walk_back<E: ChainEntry>(tip: &E, steps: i64) -> Option<E> {
    let mut entry = tip.clone();
    for _ in 0..steps {
        entry = entry.prev()?;
    }
    Some(entry)
}

/// Number of predecessor links available from `tip`, up to `limit`.
#[allow(clippy::arithmetic_side_effects, reason = "bounded by limit")]
fn available_history<E: ChainEntry>(tip: &E, limit: i64) -> i64 {
    let mut entry = tip.clone();
    let mut walked = 0;
    while walked < limit {
        let Some(prev) = entry.prev() else { break };
        entry = prev;
        walked += 1;
    }
    walked
}
