//! reduct-core: online learning with composable reductions
//!
//! The central piece is [`bootstrap::BootstrapReduction`], which trains `k`
//! Poisson-resampled replicas of a base learner inside one shared weight vector
//! and reports their mean with a percentile interval, in a single pass.
//!
//! Layout:
//! - [`label`], [`example`]: records flowing through the stack
//! - [`learner`], [`weights`], [`sgd`], [`bootstrap`], [`stack`]: the stack itself
//! - [`driver`], [`text`], [`cache`]: example sources and the drive loop
//! - [`stats`], [`output`], [`context`]: run state and reporting
//! - [`config`], [`model`]: configuration and persistence
//! - [`search`]: structured-prediction tasks on top of any stack

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod example;
pub mod label;
pub mod learner;
pub mod model;
pub mod output;
pub mod search;
pub mod sgd;
pub mod stack;
pub mod stats;
pub mod text;
pub mod weights;

pub use bootstrap::{BootstrapParams, BootstrapReduction, Estimate, Interval, percentile_indices};
pub use context::RunContext;
pub use driver::{ChannelSource, ExampleSource, IterSource, SourcePoll, drive};
pub use error::{ConfigError, LabelError, ModelError};
pub use example::{ControlRecord, Example, Feature, Payload};
pub use label::Label;
pub use learner::Learner;
pub use stack::{StackOptions, build_stack};
pub use stats::{LossFunction, RunSummary};
