//! The accumulator/sketch cryptographic primitives are an external
//! collaborator: this crate stores the validator's
//! `accumulator` bytes on each commitment but never verifies them.
//! The trait below declares the black-box interface so a future extension
//! can wire in the rolling-hash or counting-Bloom-filter accumulator from
//! `common/accumulator.py` / `common/sketch.py` without reshaping the
//! engine around it.

/// Verifies a validator-supplied accumulator value against a rolling
/// digest of observed transactions. Not called anywhere in this crate yet
/// implementations are exercised only by their own unit tests.
pub trait AccumulatorVerifier: Send + Sync {
    fn verify(&self, prior_state: &[u8], tx_hash: &[u8], claimed_state: &[u8]) -> bool;
}

/// Rolling SHA-256 chain: `H_new = SHA256(H_prev || index || tx_hash)`,
/// ported from `RollingHashAccumulator` in `common/accumulator.py`.
pub struct RollingHashAccumulator;

impl RollingHashAccumulator {
    pub fn next_state(prior_state: &[u8], global_index: u64, tx_hash: &[u8]) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(prior_state);
        hasher.update(global_index.to_be_bytes());
        hasher.update(tx_hash);
        hasher.finalize().into()
    }
}

impl AccumulatorVerifier for RollingHashAccumulator {
    /// Index-free verification is not meaningful for a rolling chain;
    /// real callers should use `next_state` with the known global index.
    /// This only checks that the claimed state has the right shape.
    fn verify(&self, _prior_state: &[u8], _tx_hash: &[u8], claimed_state: &[u8]) -> bool {
        claimed_state.len() == 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_state_is_deterministic() {
        let a = RollingHashAccumulator::next_state(&[0u8; 32], 1, b"abcdef");
        let b = RollingHashAccumulator::next_state(&[0u8; 32], 1, b"abcdef");
        assert_eq!(a, b);
    }

    #[test]
    fn next_state_changes_with_index() {
        let a = RollingHashAccumulator::next_state(&[0u8; 32], 1, b"abcdef");
        let b = RollingHashAccumulator::next_state(&[0u8; 32], 2, b"abcdef");
        assert_ne!(a, b);
    }
}
