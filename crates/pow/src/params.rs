use crate::{network::Network, pow::Target};

/// Consensus parameters for different networks.
///
/// The spacing and timespan given here only apply below the first
/// retargeting fork; later heights use the schedule in
/// [`crate::retarget::RetargetRules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Network for which these parameters are defined.
    pub network: Network,
    /// The maximum attainable target value for these params.
    pub max_attainable_target: Target,
    /// Expected amount of time to mine one block, in seconds.
    pub pow_target_spacing: u64,
    /// Difficulty recalculation window, in seconds.
    pub pow_target_timespan: u64,
    /// Determines whether minimal difficulty may be used for blocks or not.
    pub allow_min_difficulty_blocks: bool,
    /// Determines whether retargeting is disabled for this network or not.
    pub no_pow_retargeting: bool,
}

impl Params {
    /// Consensus parameters for the Unicity mainnet network.
    pub const MAINNET: Self = Self {
        network: Network::Mainnet,
        max_attainable_target: Target::mainnet_max_target(),
        pow_target_spacing: 150,                 // 2.5 minutes
        pow_target_timespan: 7 * 24 * 60 * 60 / 2, // 3.5 days
        allow_min_difficulty_blocks: false,
        no_pow_retargeting: false,
    };
    /// Consensus parameters for the Unicity testnet network.
    pub const TESTNET: Self = Self {
        network: Network::Testnet,
        max_attainable_target: Target::mainnet_max_target(),
        pow_target_spacing: 150,                 // 2.5 minutes
        pow_target_timespan: 7 * 24 * 60 * 60 / 2, // 3.5 days
        allow_min_difficulty_blocks: true,
        no_pow_retargeting: false,
    };
    /// Consensus parameters for the Unicity regtest network.
    pub const REGTEST: Self = Self {
        network: Network::Regtest,
        max_attainable_target: Target::regtest_max_target(),
        pow_target_spacing: 150,                 // 2.5 minutes
        pow_target_timespan: 7 * 24 * 60 * 60 / 2, // 3.5 days
        allow_min_difficulty_blocks: true,
        no_pow_retargeting: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_flags() {
        assert!(!Params::MAINNET.allow_min_difficulty_blocks);
        assert!(Params::TESTNET.allow_min_difficulty_blocks);
        assert!(!Params::TESTNET.no_pow_retargeting);
        assert!(Params::REGTEST.no_pow_retargeting);
        assert!(Params::REGTEST.max_attainable_target > Params::MAINNET.max_attainable_target);
    }
}
