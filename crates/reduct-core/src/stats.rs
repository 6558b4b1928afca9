//! Running statistics and progress lines
//!
//! Progress is reported on an exponential back-off: a line is emitted each time
//! the weighted example count passes `dump_interval`, which then doubles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::label::{self, Label};

/// Column header printed before the first progress line
pub const PROGRESS_HEADER: &str = "average    since      example  example    current  current  current\n\
                                   loss       last       counter   weight      label  predict features";

/// Loss used for the running statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    #[default]
    Squared,
    /// 0 when the prediction equals the label exactly, else 1
    ZeroOne,
}

impl LossFunction {
    /// Unweighted loss of `prediction`; unknown labels cost nothing.
    pub fn loss(self, label: &Label, prediction: f32) -> f64 {
        if label.is_unknown() {
            return 0.0;
        }
        match self {
            LossFunction::Squared => {
                let diff = f64::from(prediction) - f64::from(label.value);
                diff * diff
            }
            LossFunction::ZeroOne => {
                if prediction == label.value {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

impl FromStr for LossFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "squared" => Ok(LossFunction::Squared),
            "zero_one" | "zero-one" | "01" => Ok(LossFunction::ZeroOne),
            other => Err(format!("unknown loss function '{other}' (expected squared or zero_one)")),
        }
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossFunction::Squared => f.write_str("squared"),
            LossFunction::ZeroOne => f.write_str("zero_one"),
        }
    }
}

/// Counters shared by the drive loop and output
#[derive(Debug, Clone, PartialEq)]
pub struct SharedData {
    sum_loss: f64,
    sum_loss_since_last_dump: f64,
    weighted_examples: f64,
    old_weighted_examples: f64,
    example_number: u64,
    total_features: u64,
    dump_interval: f64,
}

impl Default for SharedData {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedData {
    pub fn new() -> Self {
        Self {
            sum_loss: 0.0,
            sum_loss_since_last_dump: 0.0,
            weighted_examples: 0.0,
            old_weighted_examples: 0.0,
            example_number: 0,
            total_features: 0,
            dump_interval: 1.0,
        }
    }

    /// Account for one finished instance example.
    pub fn update(&mut self, label: &Label, loss: f64, num_features: usize) {
        let w = f64::from(label::weight(label));
        self.weighted_examples += w;
        self.total_features += num_features as u64;
        self.sum_loss += loss * w;
        self.sum_loss_since_last_dump += loss * w;
        self.example_number += 1;
    }

    #[inline]
    pub fn progress_due(&self) -> bool {
        self.weighted_examples > self.dump_interval
    }

    /// Build the next progress line and advance the back-off.
    pub fn take_progress(&mut self, label: &Label, prediction: f32, num_features: usize) -> ProgressLine {
        let since_weight = self.weighted_examples - self.old_weighted_examples;
        let line = ProgressLine {
            average_loss: self.average_loss(),
            since_last: if since_weight > 0.0 {
                self.sum_loss_since_last_dump / since_weight
            } else {
                0.0
            },
            example_number: self.example_number,
            weighted_examples: self.weighted_examples,
            label: (!label.is_unknown()).then_some(label.value),
            prediction,
            num_features,
        };
        self.sum_loss_since_last_dump = 0.0;
        self.old_weighted_examples = self.weighted_examples;
        self.dump_interval *= 2.0;
        line
    }

    pub fn average_loss(&self) -> f64 {
        if self.weighted_examples > 0.0 {
            self.sum_loss / self.weighted_examples
        } else {
            0.0
        }
    }

    pub fn example_number(&self) -> u64 {
        self.example_number
    }

    pub fn weighted_examples(&self) -> f64 {
        self.weighted_examples
    }

    pub fn total_features(&self) -> u64 {
        self.total_features
    }

    pub fn dump_interval(&self) -> f64 {
        self.dump_interval
    }

    pub fn summary(&self, control_records: u64) -> RunSummary {
        RunSummary {
            examples: self.example_number,
            weighted_examples: self.weighted_examples,
            average_loss: self.average_loss(),
            total_features: self.total_features,
            control_records,
        }
    }
}

/// One human-readable progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub average_loss: f64,
    pub since_last: f64,
    pub example_number: u64,
    pub weighted_examples: f64,
    pub label: Option<f32>,
    pub prediction: f32,
    pub num_features: usize,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.label {
            Some(v) => format!("{v:>8}"),
            None => " unknown".to_string(),
        };
        write!(
            f,
            "{:<10.6} {:<10.6} {:>8} {:>8.1}   {} {:>8.4} {:>8}",
            self.average_loss,
            self.since_last,
            self.example_number,
            self.weighted_examples,
            label,
            self.prediction,
            self.num_features
        )
    }
}

/// End-of-run totals
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub examples: u64,
    pub weighted_examples: f64,
    pub average_loss: f64,
    pub total_features: u64,
    pub control_records: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "finished run")?;
        writeln!(f, "number of examples = {}", self.examples)?;
        writeln!(f, "weighted example sum = {:.6}", self.weighted_examples)?;
        writeln!(f, "average loss = {:.6}", self.average_loss)?;
        write!(f, "total feature number = {}", self.total_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_backoff_doubles() {
        let mut sd = SharedData::new();
        let label = Label::new(1.0, 1.0);
        let mut emitted = Vec::new();
        for i in 1..=10u64 {
            sd.update(&label, 0.0, 2);
            if sd.progress_due() {
                sd.take_progress(&label, 1.0, 2);
                emitted.push(i);
            }
        }
        assert_eq!(emitted, vec![2, 3, 5, 9]);
        assert_eq!(sd.dump_interval(), 16.0);
        assert_eq!(sd.total_features(), 20);
    }

    #[test]
    fn test_loss_is_importance_weighted() {
        let mut sd = SharedData::new();
        let loss = LossFunction::Squared.loss(&Label::new(1.0, 2.0), 3.0);
        assert_eq!(loss, 4.0);
        sd.update(&Label::new(1.0, 2.0), loss, 1);
        sd.update(&Label::new(0.0, -1.0), 9.0, 1);
        assert_eq!(sd.weighted_examples(), 2.0);
        assert_eq!(sd.average_loss(), 4.0);
        assert_eq!(sd.example_number(), 2);
    }

    #[test]
    fn test_since_last_resets_after_progress() {
        let mut sd = SharedData::new();
        let label = Label::new(0.0, 1.0);
        sd.update(&label, 1.0, 1);
        sd.update(&label, 1.0, 1);
        let first = sd.take_progress(&label, 0.0, 1);
        assert_eq!(first.since_last, 1.0);
        sd.update(&label, 0.0, 1);
        let second = sd.take_progress(&label, 0.0, 1);
        assert_eq!(second.since_last, 0.0);
        assert!((second.average_loss - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_one_and_unknown_labels() {
        assert_eq!(LossFunction::ZeroOne.loss(&Label::new(2.0, 1.0), 2.0), 0.0);
        assert_eq!(LossFunction::ZeroOne.loss(&Label::new(2.0, 1.0), 2.5), 1.0);
        assert_eq!(LossFunction::Squared.loss(&label::default_label(), 9.0), 0.0);
    }

    #[test]
    fn test_progress_line_format() {
        let line = ProgressLine {
            average_loss: 0.5,
            since_last: 0.25,
            example_number: 4,
            weighted_examples: 4.0,
            label: None,
            prediction: 0.125,
            num_features: 3,
        };
        let text = line.to_string();
        assert!(text.starts_with("0.500000   0.250000"));
        assert!(text.contains(" unknown"));
        assert!(text.ends_with("0.1250        3"));
    }

    #[test]
    fn test_loss_function_from_str() {
        assert_eq!("squared".parse::<LossFunction>(), Ok(LossFunction::Squared));
        assert_eq!("zero-one".parse::<LossFunction>(), Ok(LossFunction::ZeroOne));
        assert!("hinge".parse::<LossFunction>().is_err());
    }
}
