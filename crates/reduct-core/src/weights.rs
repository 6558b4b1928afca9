//! Weight-space allocation
//!
//! Every model in the stack shares one flat parameter array. A reduction that
//! needs k sub-models asks the [`WeightSpace`] for k disjoint partitions and
//! selects partition i by shifting the example's feature addresses forward by
//! `i * increment` before delegating.

use crate::error::ConfigError;
use crate::example::Example;

/// Largest supported bit precision
pub const MAX_BITS: u32 = 32;

/// Flat parameter array addressed by feature index
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    data: Vec<f32>,
}

impl WeightVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn slot(&self, index: u64) -> usize {
        (index % self.data.len() as u64) as usize
    }

    #[inline]
    pub fn get(&self, index: u64) -> f32 {
        self.data[self.slot(index)]
    }

    #[inline]
    pub fn get_mut(&mut self, index: u64) -> &mut f32 {
        let slot = self.slot(index);
        &mut self.data[slot]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Stride/offset bookkeeping for the shared weight array.
///
/// `base_span` is what one un-replicated model occupies (`2^bits * stride`).
/// Each replicating reduction multiplies `weights_per_problem`; the vector is
/// allocated once after the whole stack has been set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightSpace {
    bits: u32,
    stride: u32,
    weights_per_problem: u64,
}

impl WeightSpace {
    pub fn new(bits: u32, stride: u32) -> Self {
        Self {
            bits,
            stride: stride.max(1),
            weights_per_problem: 1,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn weights_per_problem(&self) -> u64 {
        self.weights_per_problem
    }

    /// Addressable span of one base model
    pub fn base_span(&self) -> u64 {
        (1u64 << self.bits) * self.stride as u64
    }

    /// Weight address of a hashed feature inside partition 0
    #[inline]
    pub fn feature_address(&self, hash: u64) -> u64 {
        (hash & ((1u64 << self.bits) - 1)) * self.stride as u64
    }

    /// Reserve `k` partitions for a replicating reduction.
    pub fn replicate(&mut self, k: u32) -> Result<Partitioning, ConfigError> {
        if k == 0 {
            return Err(ConfigError::ZeroReplicates);
        }
        let too_large = || ConfigError::WeightSpaceTooLarge {
            bits: self.bits,
            stride: self.stride,
            replicas: self.weights_per_problem.saturating_mul(k as u64),
        };
        let increment = self
            .base_span()
            .checked_mul(self.weights_per_problem)
            .ok_or_else(too_large)?;
        let total_increment = increment.checked_mul(k as u64 - 1).ok_or_else(too_large)?;
        let weights_per_problem = self
            .weights_per_problem
            .checked_mul(k as u64)
            .ok_or_else(too_large)?;
        self.weights_per_problem = weights_per_problem;
        Ok(Partitioning {
            replicas: k,
            increment,
            total_increment,
        })
    }

    /// Total number of weights once every reduction has reserved its share
    pub fn total_len(&self) -> usize {
        (self.base_span() * self.weights_per_problem) as usize
    }

    pub fn allocate(&self) -> WeightVector {
        WeightVector::zeros(self.total_len())
    }
}

/// Partition layout handed to one replicating reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioning {
    pub replicas: u32,
    /// Span of one partition
    pub increment: u64,
    /// `increment * (replicas - 1)`
    pub total_increment: u64,
}

impl Partitioning {
    /// Select the next partition.
    #[inline]
    pub fn advance(&self, ex: &mut Example) {
        ex.shift_forward(self.increment);
    }

    /// Return to partition 0 after a full replicate cycle.
    #[inline]
    pub fn rewind(&self, ex: &mut Example) {
        ex.shift_back(self.total_increment);
    }
}
