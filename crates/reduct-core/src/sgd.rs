//! Linear SGD base learner
//!
//! Owns the shared weight vector. Reductions above it select a partition by
//! shifting feature addresses, so this learner never sees replicate indices.

use serde::{Deserialize, Serialize};

use crate::example::Example;
use crate::label;
use crate::learner::Learner;
use crate::weights::WeightVector;

/// Learning-rate schedule: `eta = learning_rate * (initial_t + t)^-power_t`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdParams {
    pub learning_rate: f32,
    pub power_t: f32,
    pub initial_t: f32,
}

impl Default for SgdParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            power_t: 0.5,
            initial_t: 0.0,
        }
    }
}

pub struct Sgd {
    weights: WeightVector,
    params: SgdParams,
    training: bool,
    /// Cumulative importance seen by updates
    t: f64,
}

impl Sgd {
    pub fn new(weights: WeightVector, params: SgdParams, training: bool) -> Self {
        Self {
            weights,
            params,
            training,
            t: 0.0,
        }
    }

    pub fn params(&self) -> &SgdParams {
        &self.params
    }

    pub fn predict(&self, ex: &Example) -> f32 {
        ex.features
            .iter()
            .fold(label::initial(&ex.label), |acc, f| acc + self.weights.get(f.index) * f.value)
    }

    fn learning_rate(&self) -> f64 {
        let p = &self.params;
        let base = f64::from(p.initial_t) + self.t;
        if base <= 0.0 {
            return f64::from(p.learning_rate);
        }
        f64::from(p.learning_rate) * base.powf(-f64::from(p.power_t))
    }

    fn update(&mut self, ex: &Example, prediction: f32, importance: f32) {
        let norm2: f32 = ex.features.iter().map(|f| f.value * f.value).sum();
        if norm2 <= 0.0 {
            return;
        }
        self.t += f64::from(importance);
        let step = (self.learning_rate() * f64::from(importance)).min(1.0 / f64::from(norm2)) as f32;
        let grad = step * (ex.label.value - prediction);
        for f in &ex.features {
            *self.weights.get_mut(f.index) += grad * f.value;
        }
    }
}

impl Learner for Sgd {
    fn learn(&mut self, ex: &mut Example) {
        if ex.is_control() {
            return;
        }
        let prediction = self.predict(ex);
        ex.partial_prediction = prediction;

        let importance = label::weight(&ex.label);
        if self.training && !ex.label.is_unknown() && importance > 0.0 {
            self.update(ex, prediction, importance);
        }
    }

    fn finish(&mut self) {
        log::debug!("sgd: finished after cumulative importance {:.1}", self.t);
    }

    fn name(&self) -> &'static str {
        "sgd"
    }

    fn weights(&self) -> Option<&WeightVector> {
        Some(&self.weights)
    }

    fn weights_mut(&mut self) -> Option<&mut WeightVector> {
        Some(&mut self.weights)
    }
}
