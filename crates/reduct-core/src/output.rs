//! Output sinks for predictions, raw replicate outputs, intervals and progress

use std::io::{self, Write};

use crate::bootstrap::Interval;
use crate::stats::{PROGRESS_HEADER, ProgressLine, RunSummary};

/// Destinations for everything a run prints; every sink is optional.
///
/// Sinks may borrow their writers, so a caller can keep ownership of files
/// that need an explicit close once the run is over.
#[derive(Default)]
pub struct OutputSinks<'a> {
    predictions: Vec<Box<dyn Write + 'a>>,
    raw: Option<Box<dyn Write + 'a>>,
    intervals: Option<Box<dyn Write + 'a>>,
    progress: Option<Box<dyn Write + 'a>>,
    header_written: bool,
}

impl<'a> OutputSinks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_predictions(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.predictions.push(sink);
        self
    }

    pub fn with_raw(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.raw = Some(sink);
        self
    }

    pub fn with_intervals(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.intervals = Some(sink);
        self
    }

    pub fn with_progress(mut self, sink: Box<dyn Write + 'a>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn wants_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn has_progress(&self) -> bool {
        self.progress.is_some()
    }

    /// `"<prediction> <tag>"` to every prediction sink
    pub fn write_prediction(&mut self, prediction: f32, tag: Option<&str>) -> io::Result<()> {
        for sink in &mut self.predictions {
            write_tagged(sink, &format!("{prediction:.6}"), tag)?;
        }
        Ok(())
    }

    pub fn write_raw(&mut self, raw: &str, tag: Option<&str>) -> io::Result<()> {
        match self.raw.as_mut() {
            Some(sink) => write_tagged(sink, raw, tag),
            None => Ok(()),
        }
    }

    pub fn write_interval(&mut self, mean: f32, interval: &Interval) -> io::Result<()> {
        match self.intervals.as_mut() {
            Some(sink) => {
                writeln!(sink, "mean: {mean}")?;
                writeln!(sink, "{interval}")
            }
            None => Ok(()),
        }
    }

    /// Progress line, preceded by the column header the first time.
    pub fn write_progress(&mut self, line: &ProgressLine) -> io::Result<()> {
        let Some(sink) = self.progress.as_mut() else {
            return Ok(());
        };
        if !self.header_written {
            writeln!(sink, "{PROGRESS_HEADER}")?;
            self.header_written = true;
        }
        writeln!(sink, "{line}")
    }

    pub fn write_summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        match self.progress.as_mut() {
            Some(sink) => {
                writeln!(sink)?;
                writeln!(sink, "{summary}")
            }
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.predictions {
            sink.flush()?;
        }
        for sink in [&mut self.raw, &mut self.intervals, &mut self.progress].into_iter().flatten() {
            sink.flush()?;
        }
        Ok(())
    }
}

fn write_tagged<W: Write + ?Sized>(sink: &mut W, text: &str, tag: Option<&str>) -> io::Result<()> {
    match tag {
        Some(tag) if !tag.is_empty() => writeln!(sink, "{text} {tag}"),
        _ => writeln!(sink, "{text}"),
    }
}
