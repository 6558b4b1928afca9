//! Streaming example model

use crate::label::{self, Label};

/// One hashed feature: `index` is a weight address, `value` its input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub index: u64,
    pub value: f32,
}

impl Feature {
    pub fn new(index: u64, value: f32) -> Self {
        Self { index, value }
    }
}

/// Pass-through records that bypass training and statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRecord {
    /// End of one pass over the data
    EndOfPass,
    /// Request to persist the model (`'save` or `'save_<path>`)
    Save { path: Option<String> },
}

impl ControlRecord {
    /// Parse a `save` / `save_<path>` tag.
    pub fn from_save_tag(tag: &str) -> Option<Self> {
        match tag.strip_prefix("save")? {
            "" => Some(ControlRecord::Save { path: None }),
            rest => rest
                .strip_prefix('_')
                .filter(|p| !p.is_empty())
                .map(|p| ControlRecord::Save {
                    path: Some(p.to_string()),
                }),
        }
    }
}

/// What an example carries, resolved once when it is parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Instance,
    Control(ControlRecord),
}

/// A single record flowing through the reduction stack
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub features: Vec<Feature>,
    pub label: Label,
    /// Scratch output of the most recent base-learner call
    pub partial_prediction: f32,
    /// Aggregate output of the whole stack
    pub final_prediction: f32,
    pub tag: Option<String>,
    pub payload: Payload,
}

impl Example {
    pub fn new(label: Label, features: Vec<Feature>) -> Self {
        Self {
            features,
            label,
            partial_prediction: 0.0,
            final_prediction: 0.0,
            tag: None,
            payload: Payload::Instance,
        }
    }

    pub fn control(record: ControlRecord) -> Self {
        Self {
            features: Vec::new(),
            label: label::default_label(),
            partial_prediction: 0.0,
            final_prediction: 0.0,
            tag: None,
            payload: Payload::Control(record),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self.payload, Payload::Control(_))
    }

    pub fn control_record(&self) -> Option<&ControlRecord> {
        match &self.payload {
            Payload::Control(record) => Some(record),
            Payload::Instance => None,
        }
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Move every feature address forward by `amount` (wrapping).
    pub(crate) fn shift_forward(&mut self, amount: u64) {
        for f in &mut self.features {
            f.index = f.index.wrapping_add(amount);
        }
    }

    /// Move every feature address back by `amount` (wrapping).
    pub(crate) fn shift_back(&mut self, amount: u64) {
        for f in &mut self.features {
            f.index = f.index.wrapping_sub(amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_round_trip_wraps() {
        let mut ex = Example::new(
            Label::new(1.0, 1.0),
            vec![Feature::new(3, 1.0), Feature::new(u64::MAX - 1, 0.5)],
        );
        let before = ex.clone();
        ex.shift_forward(10);
        assert_eq!(ex.features[0].index, 13);
        assert_eq!(ex.features[1].index, 8);
        ex.shift_back(10);
        assert_eq!(ex, before);
    }

    #[test]
    fn test_control_record_payload() {
        let ex = Example::control(ControlRecord::Save { path: None }).with_tag("save");
        assert!(ex.is_control());
        assert_eq!(ex.control_record(), Some(&ControlRecord::Save { path: None }));
        assert_eq!(ex.num_features(), 0);
        assert!(!Example::new(Label::default(), Vec::new()).is_control());
    }

    #[test]
    fn test_save_tags() {
        assert_eq!(ControlRecord::from_save_tag("save"), Some(ControlRecord::Save { path: None }));
        assert_eq!(
            ControlRecord::from_save_tag("save_out/m.bin"),
            Some(ControlRecord::Save {
                path: Some("out/m.bin".to_string())
            })
        );
        assert_eq!(ControlRecord::from_save_tag("save_"), None);
        assert_eq!(ControlRecord::from_save_tag("saved"), None);
        assert_eq!(ControlRecord::from_save_tag("ex1"), None);
    }
}
