//! Bitfield for tracking which validators have signed.

use bincode::{Decode, Encode};

/// A compact bitfield representing which validators have signed.
///
/// Bit `i` refers to the validator at index `i` of the epoch's validator set.
/// Carried by finalized headers to identify the signers behind the
/// aggregated signature.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SignerBitfield {
    /// The bitfield bytes.
    bits: Vec<u8>,
    /// Number of validators (bits that are valid).
    num_validators: u32,
}

impl SignerBitfield {
    /// Create a new empty bitfield for the given number of validators.
    pub fn new(num_validators: usize) -> Self {
        let num_bytes = num_validators.div_ceil(8);
        Self {
            bits: vec![0u8; num_bytes],
            num_validators: num_validators as u32,
        }
    }

    /// Set a bit (mark validator as having signed).
    pub fn set(&mut self, index: usize) {
        if index < self.num_validators() {
            self.bits[index / 8] |= 1 << (index % 8);
        }
    }

    /// Check if a bit is set.
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.num_validators() {
            return false;
        }
        match self.bits.get(index / 8) {
            Some(byte) => (byte >> (index % 8)) & 1 == 1,
            None => false,
        }
    }

    /// Count the number of set bits.
    pub fn count(&self) -> usize {
        self.set_indices().count()
    }

    /// Get the number of validators this bitfield can represent.
    pub fn num_validators(&self) -> usize {
        self.num_validators as usize
    }

    /// Get iterator over indices of set bits.
    pub fn set_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_validators()).filter(|&i| self.is_set(i))
    }

    /// Check if the bitfield is empty (no bits set).
    pub fn is_empty(&self) -> bool {
        self.set_indices().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_basic() {
        let mut bf = SignerBitfield::new(10);

        assert!(bf.is_empty());

        bf.set(0);
        bf.set(5);
        bf.set(9);
        bf.set(10); // Out of bounds, ignored

        assert!(bf.is_set(0));
        assert!(bf.is_set(5));
        assert!(bf.is_set(9));
        assert!(!bf.is_set(1));
        assert!(!bf.is_set(10));

        assert_eq!(bf.count(), 3);
        assert_eq!(bf.set_indices().collect::<Vec<_>>(), vec![0, 5, 9]);
    }

    #[test]
    fn test_setting_twice_counts_once() {
        let mut bf = SignerBitfield::new(4);
        bf.set(2);
        bf.set(2);
        assert_eq!(bf.count(), 1);
    }

    #[test]
    fn test_forged_padding_bits_are_ignored() {
        // A decoded bitfield may carry bits beyond num_validators.
        let bf = SignerBitfield {
            bits: vec![0b1111_0001],
            num_validators: 3,
        };
        assert_eq!(bf.count(), 1);
        assert_eq!(bf.set_indices().collect::<Vec<_>>(), vec![0]);
    }
}
