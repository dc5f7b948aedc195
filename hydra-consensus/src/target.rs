//! Compact target encoding and proof-of-work checks.

use hydra_core::Hash;
use primitive_types::U256;

/// Converts a compact target ("bits") into a 256-bit target, following
/// Bitcoin's compact representation. Negative or overflowing encodings
/// yield zero, which no hash can meet.
pub fn compact_to_target(bits: u32) -> U256 {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 {
        return U256::zero();
    }

    if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        let shift = 8 * (exponent - 3);
        if shift >= 256 || U256::from(mantissa).bits() as u32 + shift > 256 {
            return U256::zero();
        }
        U256::from(mantissa) << shift as usize
    }
}

/// Converts a 256-bit target into its compact form.
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;

    let mut compact = if size <= 3 {
        (target.low_u64() as u32) << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).low_u64() as u32
    };

    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Returns true if `hash`, read as a little-endian integer, meets `bits`.
pub fn check_proof_of_work(hash: &Hash, bits: u32) -> bool {
    let target = compact_to_target(bits);
    !target.is_zero() && hash.to_u256() <= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regtest_limit() {
        let target = compact_to_target(0x207f_ffff);
        assert_eq!(target, U256::from(0x7f_ffffu64) << 232);
        assert_eq!(target_to_compact(target), 0x207f_ffff);
    }

    #[test]
    fn test_small_exponent_shifts_right() {
        assert_eq!(compact_to_target(0x0112_3456), U256::from(0x12u64));
    }

    #[test]
    fn test_negative_and_overflowing_targets_are_zero() {
        assert!(compact_to_target(0x0480_0000).is_zero());
        assert!(compact_to_target(0xff12_3456).is_zero());
    }

    #[test]
    fn test_zero_hash_meets_any_positive_target() {
        assert!(check_proof_of_work(&Hash::zero(), 0x1d00_ffff));
        assert!(!check_proof_of_work(&Hash([0xff; 32]), 0x1d00_ffff));
    }
}
