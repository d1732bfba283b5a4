//! Sample Blocks
//!
//! A [`Block`] is the fixed-size batch of samples a node produces for one
//! tick. The server owns one block per registered node and hands it to the
//! node mutably while it computes; downstream nodes only ever see it as a
//! borrowed slice for the remainder of that tick.

/// Block size used when a server config leaves it unset
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// One tick of a node's output
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    samples: Vec<f64>,
}

impl Block {
    /// Silent block of `size` samples
    pub fn new(size: usize) -> Self {
        Self {
            samples: vec![0.0; size],
        }
    }

    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// What downstream readers see during a tick
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    /// What the owning node writes while it computes
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.samples
    }

    /// Silence the block; used for stopped and failed nodes
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Largest magnitude in the block
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0_f64, |acc, &s| acc.max(s.abs()))
    }

    /// DC offset of the block, 0.0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_block_is_silent() {
        let block = Block::new(64);
        assert_eq!(block.len(), 64);
        assert!(!block.is_empty());
        assert_eq!(block.peak(), 0.0);
        assert!(Block::new(0).is_empty());
    }

    #[test]
    fn test_written_samples_visible_until_cleared() {
        let mut block = Block::new(4);
        block.as_mut_slice().copy_from_slice(&[0.5, -1.0, 0.25, 0.25]);
        assert_eq!(block.as_slice(), &[0.5, -1.0, 0.25, 0.25][..]);

        block.clear();
        assert_eq!(block.as_slice(), &[0.0; 4][..]);
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn test_block_stats() {
        let block = Block::from_samples(vec![1.0, -2.0, 1.5, -0.5]);
        assert_eq!(block.peak(), 2.0);
        assert_eq!(block.mean(), 0.0);
        assert_eq!(Block::new(0).mean(), 0.0);
    }
}
