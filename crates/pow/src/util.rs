use bitcoin::{BlockHash, hashes::Hash};
use hex::FromHex;

use crate::pow::Target;

/// Convert a hex string in internal byte order to a BlockHash.
pub fn hex_to_blockhash(hex: &str) -> Result<BlockHash, hex::FromHexError> {
    let bytes = <[u8; 32]>::from_hex(hex)?;
    Ok(BlockHash::from_byte_array(bytes))
}

/// Convert a hex string in display order (as printed by explorers and RPC)
/// to a BlockHash.
pub fn display_hex_to_blockhash(hex: &str) -> Result<BlockHash, hex::FromHexError> {
    let mut bytes = <[u8; 32]>::from_hex(hex)?;
    bytes.reverse();
    Ok(BlockHash::from_byte_array(bytes))
}

/// Convert a 64 digit big-endian hex string to a Target.
pub fn hex_to_target(hex: &str) -> Result<Target, hex::FromHexError> {
    let bytes = <[u8; 32]>::from_hex(hex)?;
    Ok(Target::from_be_bytes(&bytes))
}

/// Formats a target as 64 big-endian hex digits.
pub fn target_to_hex(target: &Target) -> String {
    hex::encode(target.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_blockhash() {
        let hex = "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048";
        let blockhash = hex_to_blockhash(hex).unwrap();
        // Hashes are displayed in reverse byte order
        assert_eq!(
            blockhash.to_string(),
            "4860eb18bf1b1620e37e9490fc8a427514416fd75159ab86688e9a8300000000"
        );
    }

    #[test]
    fn test_display_hex_to_blockhash() {
        let hex = "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048";
        let blockhash = display_hex_to_blockhash(hex).unwrap();
        assert_eq!(blockhash.to_string(), hex);
        // The leading zeros of the display form are the high bytes of the number.
        assert!(Target::from(blockhash) < Target::mainnet_max_target());
    }

    #[test]
    fn test_hex_to_target() {
        let target =
            hex_to_target("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff")
                .unwrap();
        assert_eq!(target, Target::mainnet_max_target());
        assert_eq!(
            target_to_hex(&target),
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
        );
    }

    #[test]
    fn test_invalid_hex() {
        let hex = "invalid_hex";
        assert!(hex_to_blockhash(hex).is_err());
        assert!(display_hex_to_blockhash(hex).is_err());
        assert!(hex_to_target("00ff").is_err());
    }
}
