//! Randomized properties of the proof of work check and the retarget clamp.

use bitcoin::{BlockHash, hashes::Hash};
use primitive_types::U256;
use rand::{Rng, SeedableRng, rngs::StdRng};
use unicity_prism_pow::{
    chain::{ChainNode, HeaderChain},
    params::Params,
    pow::{CompactTarget, Target, check_proof_of_work, hash_meets_target},
};

const T0: i64 = 1_700_000_000;

fn random_u256(rng: &mut StdRng) -> U256 {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    let shift: u32 = rng.gen_range(0..256);
    U256::from_big_endian(&bytes) >> shift
}

#[test]
fn test_check_is_anti_monotonic_in_hash() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let params = Params::MAINNET;

    for bits in [0x1e0f_ffffu32, 0x1d00_ffff, 0x1b04_864c, 0x0312_3456] {
        let bits = CompactTarget::new(bits);
        for _ in 0..500 {
            let (a, b) = (random_u256(&mut rng), random_u256(&mut rng));
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            if hash_meets_target(Target::new(high), bits, &params) {
                assert!(hash_meets_target(Target::new(low), bits, &params));
            }
        }
    }
}

#[test]
fn test_check_proof_of_work_on_block_hashes() {
    let params = Params::MAINNET;
    let bits = CompactTarget::new(0x1d00_ffff);

    // Hashes are little-endian numbers: the last byte is the most significant.
    let mut bytes = [0xffu8; 32];
    bytes[26..].fill(0);
    assert!(check_proof_of_work(BlockHash::from_byte_array(bytes), bits, &params));

    bytes[28] = 0x01;
    assert!(!check_proof_of_work(BlockHash::from_byte_array(bytes), bits, &params));

    // Target exactly: 0x00000000ffff0000...
    let mut exact = [0u8; 32];
    exact[26] = 0xff;
    exact[27] = 0xff;
    assert!(check_proof_of_work(BlockHash::from_byte_array(exact), bits, &params));
    exact[0] = 1;
    assert!(!check_proof_of_work(BlockHash::from_byte_array(exact), bits, &params));

    assert!(check_proof_of_work(BlockHash::all_zeros(), bits, &params));
    assert!(!check_proof_of_work(BlockHash::all_zeros(), CompactTarget::new(0), &params));
}

/// Builds a `window + 1` block history ending at `tip` whose end points are
/// `actual` seconds apart.
fn history(tip: u32, window: u32, actual: i64, bits: CompactTarget) -> HeaderChain {
    let start = tip - window;
    let nodes = (start..=tip)
        .map(|height| {
            let time = if height == tip { T0 + actual } else { T0 };
            ChainNode { height, time: u32::try_from(time).unwrap(), bits }
        })
        .collect();
    HeaderChain::from_nodes(nodes).unwrap()
}

#[test]
fn test_adjustment_stays_within_clamp_band() {
    let mut rng = StdRng::seed_from_u64(42);

    // (tip height, look-back, timespan, lower, upper, history factor when
    // the measured timespan is averaged, else 1)
    let cases = [
        (4031u32, 2016u32, 302_400u64, 75_600u64, 1_209_600u64, 1i64),
        (25_247, 48, 7200, 3600, 57_600, 1),
        (60_047, 48, 7200, 1800, 28_800, 1),
        (64_079, 12, 1800, 1636, 1980, 1),
        (64_595, 576, 1800, 1636, 1980, 48),
        (69_011, 48, 1800, 1636, 1980, 4),
    ];

    for (tip, window, timespan, lower, upper, factor) in cases {
        let span = i64::try_from(timespan).unwrap() * factor;
        for bits in [CompactTarget::new(0x1d00_ffff), CompactTarget::new(0x1c12_3456)] {
            let old = Target::from_compact(bits).unwrap().as_u256();
            let floor = Target::new(old * U256::from(lower) / U256::from(timespan))
                .to_compact()
                .decode()
                .target;
            let ceiling = Target::new(old * U256::from(upper) / U256::from(timespan));

            for _ in 0..200 {
                let actual = rng.gen_range(-2 * span..10 * span);
                let headers = history(tip, window, actual, bits);
                let next = headers.next_work_required(0, &Params::MAINNET).unwrap();
                let target = Target::from_compact(next).unwrap();

                assert!(target >= floor, "tip {tip} actual {actual}: {next} below band");
                assert!(target <= ceiling, "tip {tip} actual {actual}: {next} above band");
            }
        }
    }
}
