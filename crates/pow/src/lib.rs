//! Proof of work for the Unicity Alpha network.
//!
//! This library computes the compact target a block must meet given the
//! chain it extends, and checks a block hash against a claimed target. Both
//! are consensus critical: they reproduce the reference node's arithmetic,
//! including every historical change to the retargeting schedule.

#![cfg_attr(test, allow(clippy::arithmetic_side_effects))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::cast_sign_loss))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::cast_possible_truncation))]

/// Read-only block history used for retargeting.
pub mod chain;
/// Network types and constants.
pub mod network;
/// Consensus parameters.
pub mod params;
/// Targets, compact encoding and the proof of work check.
pub mod pow;
/// Difficulty retargeting.
pub mod retarget;
/// Hex parsing helpers.
pub mod util;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use chain::{ChainEntry, HeaderChain};
pub use network::Network;
pub use params::Params;
pub use pow::{CompactTarget, Target, check_proof_of_work};
pub use retarget::{RetargetError, next_work_required};
