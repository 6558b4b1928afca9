//! Structured-prediction task interface
//!
//! A task drives a learner stack through a sequence of examples, one
//! [`Search::predict`] call per decision. The stack only has to honour the
//! [`Learner`] contract, so a task runs on top of a bootstrap stack unchanged.

use std::collections::BTreeMap;

use crate::example::Example;
use crate::label::{self, Label};
use crate::learner::Learner;

/// Behaviour switches a task enables during `initialize`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Count one unit of loss for every prediction that misses its oracle
    pub auto_hamming_loss: bool,
    /// Record every predicted action
    pub auto_history: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSetup {
    pub num_actions: u32,
    pub options: TaskOptions,
}

impl TaskSetup {
    pub fn new(num_actions: u32) -> Self {
        Self {
            num_actions: num_actions.max(1),
            options: TaskOptions::default(),
        }
    }
}

pub trait SearchTask {
    fn initialize(&mut self, setup: &mut TaskSetup) -> anyhow::Result<()>;

    fn finish(&mut self) {}

    /// Predict an action in `1..=num_actions` for every example.
    fn structured_predict(&mut self, search: &mut Search<'_>, examples: &mut [Example]) -> Vec<u32>;
}

/// Per-run handle a task predicts through
pub struct Search<'a> {
    learner: &'a mut dyn Learner,
    setup: TaskSetup,
    history: Vec<u32>,
    loss: f32,
}

impl<'a> Search<'a> {
    pub fn new(learner: &'a mut dyn Learner, setup: TaskSetup) -> Self {
        Self {
            learner,
            setup,
            history: Vec::new(),
            loss: 0.0,
        }
    }

    /// Predict one decision. With an oracle the learner is also trained
    /// towards it; the example's label is restored afterwards.
    pub fn predict(&mut self, ex: &mut Example, oracle: Option<u32>) -> u32 {
        let saved = ex.label;
        ex.label = match oracle {
            Some(action) => Label::new(action as f32, label::weight(&saved).max(1.0)),
            None => label::default_label(),
        };
        self.learner.learn(ex);
        ex.label = saved;

        let action = self.to_action(ex.partial_prediction);
        if self.setup.options.auto_hamming_loss && oracle.is_some_and(|o| o != action) {
            self.loss += 1.0;
        }
        if self.setup.options.auto_history {
            self.history.push(action);
        }
        action
    }

    fn to_action(&self, prediction: f32) -> u32 {
        let top = self.setup.num_actions as f32;
        if prediction.is_nan() {
            return 1;
        }
        prediction.round().clamp(1.0, top) as u32
    }

    pub fn add_loss(&mut self, loss: f32) {
        self.loss += loss;
    }

    pub fn loss(&self) -> f32 {
        self.loss
    }

    pub fn history(&self) -> &[u32] {
        &self.history
    }

    pub fn setup(&self) -> &TaskSetup {
        &self.setup
    }

    /// Reset per-sequence state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.loss = 0.0;
    }
}

pub type TaskFactory = fn() -> Box<dyn SearchTask>;

/// Named task constructors
#[derive(Default)]
pub struct TaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the tasks shipped with this crate
    pub fn with_builtin() -> Self {
        let mut r = Self::new();
        r.register("sequence", || Box::new(SequenceLabeler));
        r
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TaskFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn SearchTask>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Run `task` over one sequence with `learner`.
///
/// Returns the predicted actions and the loss the search handle accumulated.
pub fn run_task(
    task: &mut dyn SearchTask,
    learner: &mut dyn Learner,
    num_actions: u32,
    examples: &mut [Example],
) -> anyhow::Result<(Vec<u32>, f32)> {
    let mut setup = TaskSetup::new(num_actions);
    task.initialize(&mut setup)?;
    let mut search = Search::new(learner, setup);
    let output = search_sequence(task, &mut search, examples);
    task.finish();
    Ok((output, search.loss()))
}

fn search_sequence(task: &mut dyn SearchTask, search: &mut Search<'_>, examples: &mut [Example]) -> Vec<u32> {
    search.reset();
    let output = task.structured_predict(search, examples);
    log::debug!("search: {} decisions, loss {}", output.len(), search.loss());
    output
}

/// One independent decision per example, labelled by the example's own label.
pub struct SequenceLabeler;

impl SearchTask for SequenceLabeler {
    fn initialize(&mut self, setup: &mut TaskSetup) -> anyhow::Result<()> {
        setup.options.auto_hamming_loss = true;
        setup.options.auto_history = true;
        Ok(())
    }

    fn structured_predict(&mut self, search: &mut Search<'_>, examples: &mut [Example]) -> Vec<u32> {
        examples
            .iter_mut()
            .map(|ex| {
                let oracle = (!ex.label.is_unknown()).then(|| ex.label.value.max(0.0) as u32);
                search.predict(ex, oracle)
            })
            .collect()
    }
}
