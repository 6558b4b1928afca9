//! Online bootstrap aggregation
//!
//! `k` virtual sub-models live side by side in the shared weight vector. Every
//! example is shown to each of them once, with its importance weight replaced by
//! a Poisson(weight) draw, and the k predictions are folded into a mean plus a
//! percentile interval.
//!
//! The replicate loop is not interruptible: the feature addresses are only
//! restored after all k base calls have returned.

use std::fmt;
use std::fmt::Write as _;

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::example::Example;
use crate::learner::Learner;
use crate::weights::Partitioning;

/// Replicate count and one-sided tail fraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapParams {
    pub replicas: u32,
    /// `1 - percentile`; 0 disables interval reporting
    pub alpha: f64,
}

/// Percentile interval over the sorted replicate predictions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f32,
    pub upper: f32,
    /// `1 - alpha`
    pub coverage: f64,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} percentile: ({}, {})", self.coverage, self.lower, self.upper)
    }
}

/// Aggregate output of one example
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub mean: f32,
    /// Present in evaluation mode when alpha > 0
    pub interval: Option<Interval>,
    /// `"1:p1 2:p2 ..."` in replicate order, when requested
    pub raw: Option<String>,
}

/// Rank positions of the interval bounds in a sorted list of `k` predictions.
///
/// `lower = floor(k * alpha) - 1`, `upper = floor(k * (1 - alpha)) - 1`, both
/// clamped to `[0, k - 1]`.
pub fn percentile_indices(k: usize, alpha: f64) -> (usize, usize) {
    if k == 0 {
        return (0, 0);
    }
    let last = k as i64 - 1;
    let rank = |q: f64| ((k as f64 * q).floor() as i64 - 1).clamp(0, last) as usize;
    (rank(alpha), rank(1.0 - alpha))
}

pub struct BootstrapReduction {
    base: Box<dyn Learner>,
    params: BootstrapParams,
    partitioning: Partitioning,
    rng: Xoshiro256PlusPlus,
    training: bool,
    predictions: Vec<f32>,
}

impl BootstrapReduction {
    /// `partitioning` must come from reserving `params.replicas` partitions.
    pub fn new(
        base: Box<dyn Learner>,
        params: BootstrapParams,
        partitioning: Partitioning,
        seed: u64,
        training: bool,
    ) -> Self {
        debug_assert_eq!(params.replicas, partitioning.replicas);
        Self {
            base,
            params,
            partitioning,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            training,
            predictions: Vec::with_capacity(params.replicas as usize),
        }
    }

    pub fn params(&self) -> &BootstrapParams {
        &self.params
    }

    pub fn replicas(&self) -> u32 {
        self.params.replicas
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Replicate predictions of the last instance, sorted ascending
    pub fn sorted_predictions(&self) -> &[f32] {
        &self.predictions
    }

    /// Train (or evaluate) every replicate on `ex` and aggregate.
    ///
    /// Control records go straight to the base and yield `None`.
    pub fn learn_with_output(&mut self, ex: &mut Example, emit_raw: bool) -> Option<Estimate> {
        if ex.is_control() {
            self.base.learn(ex);
            return None;
        }

        let original = ex.label;
        let mut draws = Xoshiro256PlusPlus::seed_from_u64(self.rng.random());
        let poisson = Poisson::<f64>::new(f64::from(original.weight)).ok();

        self.predictions.clear();
        let mut raw = emit_raw.then(String::new);
        for i in 1..=self.params.replicas {
            if i > 1 {
                self.partitioning.advance(ex);
            }
            ex.label.weight = poisson.as_ref().map_or(0.0, |p| p.sample(&mut draws) as f32);

            self.base.learn(ex);
            self.predictions.push(ex.partial_prediction);

            if let Some(raw) = raw.as_mut() {
                if i > 1 {
                    raw.push(' ');
                }
                let _ = write!(raw, "{}:{}", i, ex.partial_prediction);
            }
            ex.partial_prediction = 0.0;
        }
        ex.label = original;
        self.partitioning.rewind(ex);

        self.predictions.sort_by(f32::total_cmp);
        let sum: f64 = self.predictions.iter().map(|&p| f64::from(p)).sum();
        let mean = (sum / self.predictions.len() as f64) as f32;
        ex.final_prediction = mean;

        let interval = (!self.training && self.params.alpha > 0.0).then(|| {
            let (lo, hi) = percentile_indices(self.predictions.len(), self.params.alpha);
            Interval {
                lower: self.predictions[lo],
                upper: self.predictions[hi],
                coverage: 1.0 - self.params.alpha,
            }
        });

        Some(Estimate {
            mean,
            interval,
            raw,
        })
    }
}

impl Learner for BootstrapReduction {
    /// Like [`BootstrapReduction::learn_with_output`], and also leaves the mean
    /// in `partial_prediction` for whatever wraps this reduction.
    fn learn(&mut self, ex: &mut Example) {
        if let Some(estimate) = self.learn_with_output(ex, false) {
            ex.partial_prediction = estimate.mean;
        }
    }

    fn finish(&mut self) {
        log::debug!(
            "bootstrap: finishing {} replicates (alpha {})",
            self.params.replicas,
            self.params.alpha
        );
        self.predictions = Vec::new();
        self.base.finish();
    }

    fn name(&self) -> &'static str {
        "bootstrap"
    }

    fn base(&self) -> Option<&dyn Learner> {
        Some(self.base.as_ref())
    }

    fn base_mut(&mut self) -> Option<&mut dyn Learner> {
        Some(self.base.as_mut())
    }
}
