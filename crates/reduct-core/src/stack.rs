//! Assembly of the learner stack: weight space, SGD base, bootstrap on top

use crate::bootstrap::{BootstrapParams, BootstrapReduction};
use crate::context::RunContext;
use crate::error::ConfigError;
use crate::model::PersistedOptions;
use crate::sgd::{Sgd, SgdParams};
use crate::stats::LossFunction;
use crate::weights::{MAX_BITS, WeightSpace};

/// Weights per feature in the base learner
pub const BASE_STRIDE: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct StackOptions {
    pub bits: u32,
    pub sgd: SgdParams,
    pub bootstrap: BootstrapParams,
}

impl StackOptions {
    /// Options to persist with the trained weights
    pub fn persisted(&self, percentile: Option<f64>, loss: LossFunction) -> PersistedOptions {
        PersistedOptions {
            bits: self.bits,
            replicas: self.bootstrap.replicas,
            percentile,
            sgd: self.sgd,
            loss,
        }
    }

    /// Weight space of one un-replicated model, as used by the parsers
    pub fn base_space(&self) -> WeightSpace {
        WeightSpace::new(self.bits, BASE_STRIDE)
    }
}

/// Reserve the partitions, allocate the weights and wire the reductions.
///
/// The bootstrap reduction's generator is seeded from `ctx`, so a run is
/// reproducible from the context's root seed.
pub fn build_stack(options: &StackOptions, ctx: &mut RunContext) -> Result<BootstrapReduction, ConfigError> {
    if options.bits == 0 || options.bits > MAX_BITS {
        return Err(ConfigError::BitsOutOfRange {
            bits: options.bits,
            max: MAX_BITS,
        });
    }
    let mut space = options.base_space();
    let partitioning = space.replicate(options.bootstrap.replicas)?;
    usize::try_from(space.base_span().saturating_mul(space.weights_per_problem()))
        .map_err(|_| ConfigError::WeightSpaceTooLarge {
            bits: space.bits(),
            stride: space.stride(),
            replicas: space.weights_per_problem(),
        })?;

    let base = Sgd::new(space.allocate(), options.sgd, ctx.training);
    let stack = BootstrapReduction::new(
        Box::new(base),
        options.bootstrap,
        partitioning,
        ctx.draw_seed(),
        ctx.training,
    );
    log::info!(
        "stack: bootstrap(k={}, alpha={}) over sgd, {} bits, {} weights, {} mode",
        options.bootstrap.replicas,
        options.bootstrap.alpha,
        options.bits,
        space.total_len(),
        if ctx.training { "training" } else { "evaluation" }
    );
    Ok(stack)
}
