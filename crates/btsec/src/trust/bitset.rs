//! Fixed-capacity bitset packed into 32-bit words

use crate::error::{SecurityError, SecurityResult};
use std::fmt;

/// Number of bits held by each storage word
pub const WORD_BITS: usize = u32::BITS as usize;

/// Number of words needed to hold `bits` bits
pub const fn words_for(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

/// A bitset of exactly `N` bits addressed by small integer ids.
///
/// Every accessor checks the index against `N`, so a request for an
/// out-of-range id is reported instead of touching a neighbouring word or
/// the unused tail of the last word.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceBitSet<const N: usize> {
    words: Vec<u32>,
}

impl<const N: usize> ServiceBitSet<N> {
    /// Total number of addressable bits
    pub const CAPACITY: usize = N;

    /// Create an empty bitset
    pub fn new() -> Self {
        Self {
            words: vec![0; words_for(N)],
        }
    }

    fn locate(id: u16) -> SecurityResult<(usize, u32)> {
        let index = id as usize;
        if index >= N {
            return Err(SecurityError::InvalidServiceId(id));
        }
        Ok((index / WORD_BITS, 1u32 << (index % WORD_BITS)))
    }

    /// Set bit `id`
    pub fn set(&mut self, id: u16) -> SecurityResult<()> {
        let (word, mask) = Self::locate(id)?;
        self.words[word] |= mask;
        Ok(())
    }

    /// Clear bit `id`
    pub fn clear(&mut self, id: u16) -> SecurityResult<()> {
        let (word, mask) = Self::locate(id)?;
        self.words[word] &= !mask;
        Ok(())
    }

    /// Test bit `id`
    pub fn contains(&self, id: u16) -> SecurityResult<bool> {
        let (word, mask) = Self::locate(id)?;
        Ok(self.words[word] & mask != 0)
    }

    /// Clear every bit
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the ids of all set bits in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..N as u16).filter(move |id| {
            let index = *id as usize;
            self.words[index / WORD_BITS] & (1u32 << (index % WORD_BITS)) != 0
        })
    }

    /// Raw storage words, lowest ids first
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Rebuild a bitset from raw storage words.
    ///
    /// Fails if the word count does not match or if any bit at or beyond `N`
    /// is set.
    pub fn from_words(words: &[u32]) -> SecurityResult<Self> {
        if words.len() != words_for(N) {
            return Err(SecurityError::InvalidRecord(format!(
                "expected {} service words, got {}",
                words_for(N),
                words.len()
            )));
        }

        let tail = N % WORD_BITS;
        if tail != 0 {
            let unused = !((1u32 << tail) - 1);
            if words[words.len() - 1] & unused != 0 {
                return Err(SecurityError::InvalidRecord(
                    "service bits set beyond capacity".into(),
                ));
            }
        }

        Ok(Self {
            words: words.to_vec(),
        })
    }
}

impl<const N: usize> Default for ServiceBitSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for ServiceBitSet<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_packing() {
        assert_eq!(words_for(75), 3);
        assert_eq!(words_for(64), 2);
        assert_eq!(words_for(1), 1);

        let mut set = ServiceBitSet::<75>::new();
        set.set(0).unwrap();
        set.set(33).unwrap();
        set.set(74).unwrap();
        assert_eq!(set.words(), &[0x0000_0001, 0x0000_0002, 0x0000_0400]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 33, 74]);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let mut set = ServiceBitSet::<75>::new();
        set.set(74).unwrap();
        let before = set.clone();

        assert_eq!(set.set(75), Err(SecurityError::InvalidServiceId(75)));
        assert_eq!(set.clear(96), Err(SecurityError::InvalidServiceId(96)));
        assert_eq!(set.contains(u16::MAX), Err(SecurityError::InvalidServiceId(u16::MAX)));
        assert_eq!(set, before);
    }

    #[test]
    fn test_from_words_validates_tail() {
        assert!(ServiceBitSet::<75>::from_words(&[0, 0, 0x0000_0400]).is_ok());
        assert!(ServiceBitSet::<75>::from_words(&[0, 0, 0x0000_0800]).is_err());
        assert!(ServiceBitSet::<75>::from_words(&[0, 0]).is_err());
    }
}
