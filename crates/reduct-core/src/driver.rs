//! Online drive loop
//!
//! Pulls examples from an [`ExampleSource`] one at a time, pushes each through
//! the bootstrap reduction and reports the result. The loop ends exactly when
//! the source says it is exhausted; a source that is merely not ready yet is
//! polled again after yielding the thread.

use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::bootstrap::{BootstrapReduction, Estimate};
use crate::context::RunContext;
use crate::example::{ControlRecord, Example};
use crate::output::OutputSinks;
use crate::stats::{LossFunction, RunSummary};

/// Default wait of [`ChannelSource`] before reporting `Pending`
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Result of one non-blocking poll
#[derive(Debug)]
pub enum SourcePoll {
    Ready(Example),
    /// Nothing available yet, but more may come
    Pending,
    /// Input is done and nothing is pending
    Exhausted,
}

pub trait ExampleSource {
    fn poll_next(&mut self) -> SourcePoll;
}

impl<S: ExampleSource + ?Sized> ExampleSource for Box<S> {
    fn poll_next(&mut self) -> SourcePoll {
        (**self).poll_next()
    }
}

/// Source over any in-memory iterator
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator<Item = Example>> IterSource<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Example>> ExampleSource for IterSource<I> {
    fn poll_next(&mut self) -> SourcePoll {
        match self.iter.next() {
            Some(ex) => SourcePoll::Ready(ex),
            None => SourcePoll::Exhausted,
        }
    }
}

/// Source fed by a parser thread; disconnect of every sender ends input.
pub struct ChannelSource {
    rx: Receiver<Example>,
    timeout: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Example>) -> Self {
        Self::with_timeout(rx, DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_timeout(rx: Receiver<Example>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }
}

impl ExampleSource for ChannelSource {
    fn poll_next(&mut self) -> SourcePoll {
        match self.rx.recv_timeout(self.timeout) {
            Ok(ex) => SourcePoll::Ready(ex),
            Err(RecvTimeoutError::Timeout) => SourcePoll::Pending,
            Err(RecvTimeoutError::Disconnected) => SourcePoll::Exhausted,
        }
    }
}

/// Run the stack over `source` until it is exhausted.
///
/// Instance examples update `ctx.stats` and are written to `sinks`; control
/// records bypass both and are handed to `on_control`.
pub fn drive<S, F>(
    source: &mut S,
    learner: &mut BootstrapReduction,
    ctx: &mut RunContext,
    sinks: &mut OutputSinks<'_>,
    loss: LossFunction,
    mut on_control: F,
) -> io::Result<RunSummary>
where
    S: ExampleSource + ?Sized,
    F: FnMut(&ControlRecord, &BootstrapReduction),
{
    let mut control_records = 0u64;
    loop {
        match source.poll_next() {
            SourcePoll::Ready(mut ex) => {
                let estimate = learner.learn_with_output(&mut ex, sinks.wants_raw());
                if let Some(record) = ex.control_record() {
                    control_records += 1;
                    log::debug!("control record: {record:?}");
                    on_control(record, learner);
                    continue;
                }
                if let Some(estimate) = estimate {
                    output_example(&ex, &estimate, ctx, sinks, loss)?;
                }
            }
            SourcePoll::Pending => thread::yield_now(),
            SourcePoll::Exhausted => break,
        }
    }

    let summary = ctx.stats.summary(control_records);
    if !ctx.quiet {
        sinks.write_summary(&summary)?;
    }
    sinks.flush()?;
    log::info!(
        "drive loop done: {} examples, weighted sum {:.1}, average loss {:.6}",
        summary.examples,
        summary.weighted_examples,
        summary.average_loss
    );
    Ok(summary)
}

fn output_example(
    ex: &Example,
    estimate: &Estimate,
    ctx: &mut RunContext,
    sinks: &mut OutputSinks<'_>,
    loss: LossFunction,
) -> io::Result<()> {
    let tag = ex.tag.as_deref();
    ctx.stats
        .update(&ex.label, loss.loss(&ex.label, ex.final_prediction), ex.num_features());

    sinks.write_prediction(ex.final_prediction, tag)?;
    if let Some(raw) = &estimate.raw {
        sinks.write_raw(raw, tag)?;
    }
    if let Some(interval) = &estimate.interval {
        sinks.write_interval(estimate.mean, interval)?;
    }

    if ctx.stats.progress_due() {
        let line = ctx
            .stats
            .take_progress(&ex.label, ex.final_prediction, ex.num_features());
        if !ctx.quiet {
            sinks.write_progress(&line)?;
        }
    }
    Ok(())
}
