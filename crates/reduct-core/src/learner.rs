//! Learner interface
//!
//! Every reduction and base model implements [`Learner`]. A reduction owns its
//! base exclusively and follows a strict wrap, delegate, unwrap discipline: any
//! change it makes to an example before delegating is undone before `learn`
//! returns, so a reduction never needs to know what sits above it.

use crate::example::Example;
use crate::weights::WeightVector;

pub trait Learner {
    /// Train on (or predict for) one example; sets `partial_prediction`.
    fn learn(&mut self, ex: &mut Example);

    /// Release this learner's resources, then finish the base.
    fn finish(&mut self);

    fn name(&self) -> &'static str;

    /// Wrapped learner, `None` at the end of the chain
    fn base(&self) -> Option<&dyn Learner> {
        None
    }

    fn base_mut(&mut self) -> Option<&mut dyn Learner> {
        None
    }

    /// Shared weight vector, owned by the learner at the end of the chain
    fn weights(&self) -> Option<&WeightVector> {
        self.base().and_then(|b| b.weights())
    }

    fn weights_mut(&mut self) -> Option<&mut WeightVector> {
        self.base_mut().and_then(|b| b.weights_mut())
    }
}

impl<L: Learner + ?Sized> Learner for Box<L> {
    fn learn(&mut self, ex: &mut Example) {
        (**self).learn(ex)
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn base(&self) -> Option<&dyn Learner> {
        (**self).base()
    }

    fn base_mut(&mut self) -> Option<&mut dyn Learner> {
        (**self).base_mut()
    }

    fn weights(&self) -> Option<&WeightVector> {
        (**self).weights()
    }

    fn weights_mut(&mut self) -> Option<&mut WeightVector> {
        (**self).weights_mut()
    }
}

/// Names of the learners from the top of the stack down
pub fn stack_names(top: &dyn Learner) -> Vec<&'static str> {
    let mut names = vec![top.name()];
    let mut cur = top.base();
    while let Some(l) = cur {
        names.push(l.name());
        cur = l.base();
    }
    names
}

/// Identity reduction: delegates every call unchanged.
pub struct PassThrough {
    base: Box<dyn Learner>,
}

impl PassThrough {
    pub fn new(base: Box<dyn Learner>) -> Self {
        Self { base }
    }
}

impl Learner for PassThrough {
    fn learn(&mut self, ex: &mut Example) {
        self.base.learn(ex);
    }

    fn finish(&mut self) {
        self.base.finish();
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn base(&self) -> Option<&dyn Learner> {
        Some(self.base.as_ref())
    }

    fn base_mut(&mut self) -> Option<&mut dyn Learner> {
        Some(self.base.as_mut())
    }
}
