//! reduct: online bootstrap-aggregated learner
//!
//! Reads text examples (or a binary cache), trains or evaluates a bootstrap
//! stack in one pass and writes predictions, raw replicate outputs and
//! percentile intervals.

mod io;

use std::borrow::Cow;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use clap::Parser;
use reduct_core::cache::{CacheReader, CacheWriter};
use reduct_core::config::{
    BootstrapSettings, CliOverrides, RunConfig, load_config_file, merge_config, resolve_bits, resolve_bootstrap,
};
use reduct_core::model::{self, PersistedOptions};
use reduct_core::output::OutputSinks;
use reduct_core::text::TextParser;
use reduct_core::{
    BootstrapReduction, ChannelSource, ControlRecord, Example, Learner, LossFunction, RunContext,
    StackOptions, build_stack, drive,
};

use crate::io::{Writer, open_reader, open_writer};

/// Model path used by a bare `'save` record when no final regressor is given
const DEFAULT_SAVE_PATH: &str = "reduct.model";
/// Examples buffered between the parser thread and the learner
const CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about = "Online learner with bootstrap confidence intervals")]
struct Cli {
    /// Input examples in text format (`-` for stdin, `.gz` supported)
    #[arg(short, long, default_value = "-")]
    data: PathBuf,

    /// Binary example cache: read when it exists, otherwise written while parsing
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Number of bootstrap replicates
    #[arg(long)]
    bs: Option<u32>,

    /// Confidence level of the reported interval, e.g. 0.9
    #[arg(long)]
    bs_percentile: Option<f64>,

    /// Number of hash bits per model
    #[arg(short, long)]
    bit_precision: Option<u32>,

    #[arg(short, long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    power_t: Option<f32>,

    #[arg(long)]
    initial_t: Option<f32>,

    /// squared | zero_one
    #[arg(long)]
    loss_function: Option<LossFunction>,

    /// Root seed of the run
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate only: no updates, intervals reported
    #[arg(short, long)]
    testonly: bool,

    /// Model to start from
    #[arg(short, long)]
    initial_regressor: Option<PathBuf>,

    /// Model to write at the end of the run
    #[arg(short, long)]
    final_regressor: Option<PathBuf>,

    /// Prediction output (repeatable, `-` for stdout)
    #[arg(short, long)]
    predictions: Vec<PathBuf>,

    /// Raw replicate predictions output
    #[arg(short, long)]
    raw_predictions: Option<PathBuf>,

    /// Mean/interval output (defaults to stdout in evaluation mode)
    #[arg(long)]
    intervals: Option<PathBuf>,

    /// Do not add the constant feature
    #[arg(long)]
    noconstant: bool,

    /// TOML config file (command-line flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            replicas: self.bs,
            percentile: self.bs_percentile,
            bits: self.bit_precision,
            learning_rate: self.learning_rate,
            power_t: self.power_t,
            initial_t: self.initial_t,
            loss: self.loss_function,
            seed: self.seed,
            test_only: self.testonly,
            quiet: self.quiet,
        }
    }
}

fn init_logger(debug: bool, quiet: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .format(|buf, record| writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args()))
        .init();
}

/// Output files owned for the whole run and closed once it is over
struct OutputFiles {
    predictions: Vec<Writer>,
    raw: Option<Writer>,
    intervals: Option<Writer>,
}

fn create(path: &Path) -> Result<Writer> {
    open_writer(path).with_context(|| format!("failed to create {}", path.display()))
}

impl OutputFiles {
    fn open(cli: &Cli) -> Result<Self> {
        Ok(Self {
            predictions: cli.predictions.iter().map(|p| create(p)).collect::<Result<_>>()?,
            raw: cli.raw_predictions.as_deref().map(create).transpose()?,
            intervals: cli.intervals.as_deref().map(create).transpose()?,
        })
    }

    fn sinks(&mut self, cfg: &RunConfig, settings: &BootstrapSettings) -> OutputSinks<'_> {
        let mut sinks = OutputSinks::new();
        for w in &mut self.predictions {
            sinks = sinks.add_predictions(Box::new(w));
        }
        if let Some(w) = self.raw.as_mut() {
            sinks = sinks.with_raw(Box::new(w));
        }
        match self.intervals.as_mut() {
            Some(w) => sinks = sinks.with_intervals(Box::new(w)),
            None if cfg.test_only && settings.alpha > 0.0 => {
                sinks = sinks.with_intervals(Box::new(std::io::stdout()));
            }
            None => {}
        }
        if !cfg.quiet {
            sinks = sinks.with_progress(Box::new(std::io::stderr()));
        }
        sinks
    }

    fn close(self) -> Result<()> {
        for w in self.predictions.into_iter().chain(self.raw).chain(self.intervals) {
            w.close().context("failed to finish output file")?;
        }
        Ok(())
    }
}

/// Parse lines from `reader` into `tx` until EOF.
///
/// Bytes that are not valid UTF-8 are replaced and the line is kept; a read
/// error ends the stream with an error.
fn pump_lines<R: BufRead, W: Write>(
    mut reader: R,
    parser: &mut TextParser,
    mut cache: Option<&mut CacheWriter<W>>,
    tx: &mpsc::SyncSender<Example>,
) -> Result<u64> {
    let mut buf = Vec::new();
    let mut line_no = 0u64;
    let mut sent = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read input after line {line_no}"))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let line = String::from_utf8_lossy(&buf);
        if matches!(line, Cow::Owned(_)) {
            log::warn!("line {line_no}: invalid UTF-8 replaced");
        }
        let Some(ex) = parser.parse_line(&line) else {
            continue;
        };
        if let Some(c) = cache.as_deref_mut() {
            c.write(&ex).context("failed to write cache")?;
        }
        if tx.send(ex).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

/// Parse text on a background thread, optionally writing the cache as it goes.
fn spawn_text_parser(
    data: &Path,
    mut parser: TextParser,
    cache: Option<CacheWriter<Writer>>,
) -> Result<(mpsc::Receiver<Example>, JoinHandle<Result<u64>>)> {
    let reader = open_reader(data).with_context(|| format!("failed to open {}", data.display()))?;
    let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
    let handle = thread::spawn(move || -> Result<u64> {
        let mut cache = cache;
        let sent = pump_lines(reader, &mut parser, cache.as_mut(), &tx)?;
        let end = Example::control(ControlRecord::EndOfPass);
        if let Some(c) = cache.as_mut() {
            c.write(&end).context("failed to write cache")?;
        }
        let _ = tx.send(end);
        if let Some(c) = cache {
            c.finish()?.close().context("failed to close cache")?;
        }
        Ok(sent)
    });
    Ok((rx, handle))
}

fn save_target(path: Option<&str>, final_regressor: Option<&Path>) -> PathBuf {
    path.map(PathBuf::from)
        .or_else(|| final_regressor.map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_PATH))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.debug, cli.quiet);

    let file_cfg = match &cli.config {
        Some(path) => Some(load_config_file(path).with_context(|| format!("invalid config {}", path.display()))?),
        None => None,
    };
    let cfg = merge_config(file_cfg.as_ref(), &cli.overrides());

    let loaded = match &cli.initial_regressor {
        Some(path) => Some(model::load_model(path).with_context(|| format!("failed to load {}", path.display()))?),
        None => None,
    };
    let persisted: Option<&PersistedOptions> = loaded.as_ref().map(|(opts, _)| opts);
    let settings = resolve_bootstrap(&cfg.bootstrap, persisted)?;
    let (bits, _) = resolve_bits(cfg.bits, persisted);

    let stack_opts = StackOptions {
        bits,
        sgd: cfg.sgd,
        bootstrap: settings.params(),
    };
    let mut ctx = RunContext::new(cfg.seed, !cfg.test_only).with_quiet(cfg.quiet);
    let mut stack = build_stack(&stack_opts, &mut ctx)?;
    if let Some((_, weights)) = &loaded {
        model::load_into(&mut stack, weights)?;
    }
    let persist = stack_opts.persisted(settings.percentile, cfg.loss);

    let mut files = OutputFiles::open(&cli)?;
    let mut sinks = files.sinks(&cfg, &settings);
    let on_control = |record: &ControlRecord, reduction: &BootstrapReduction| {
        if let ControlRecord::Save { path } = record {
            let target = save_target(path.as_deref(), cli.final_regressor.as_deref());
            if let Err(e) = model::save_learner(&target, &persist, reduction) {
                log::error!("failed to save model to {}: {e}", target.display());
            }
        }
    };

    let mut parser = TextParser::new(stack_opts.base_space());
    if cli.noconstant {
        parser = parser.without_constant();
    }

    let cached = cli.cache_file.as_ref().filter(|p| p.is_file());
    let summary = if let Some(path) = cached {
        log::info!("reading examples from cache {}", path.display());
        let reader = open_reader(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut source = CacheReader::new(reader).with_context(|| format!("invalid cache {}", path.display()))?;
        drive(&mut source, &mut stack, &mut ctx, &mut sinks, cfg.loss, on_control)?
    } else {
        let cache = match &cli.cache_file {
            Some(path) => {
                Some(CacheWriter::new(create(path)?).context("failed to write cache header")?)
            }
            None => None,
        };
        let (rx, handle) = spawn_text_parser(&cli.data, parser, cache)?;
        let mut source = ChannelSource::new(rx);
        let summary = drive(&mut source, &mut stack, &mut ctx, &mut sinks, cfg.loss, on_control)?;
        let parsed = match handle.join() {
            Ok(parsed) => parsed,
            Err(_) => bail!("parser thread panicked"),
        };
        match parsed {
            Ok(n) => log::debug!("parser thread read {n} examples"),
            Err(e) => {
                // a partial cache would be replayed as if complete
                if let Some(path) = &cli.cache_file {
                    if fs::remove_file(path).is_ok() {
                        log::warn!("removed incomplete cache {}", path.display());
                    }
                }
                return Err(e.context("input ended early; model not saved"));
            }
        }
        summary
    };
    drop(sinks);
    files.close()?;

    if let Some(path) = &cli.final_regressor {
        model::save_learner(path, &persist, &stack).with_context(|| format!("failed to save {}", path.display()))?;
    }
    stack.finish();

    if summary.examples == 0 {
        log::warn!("no examples were read");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reduct_core::stack::BASE_STRIDE;
    use reduct_core::weights::WeightSpace;
    use std::io::{self, BufReader, Read};

    fn parser() -> TextParser {
        TextParser::new(WeightSpace::new(8, BASE_STRIDE))
    }

    /// Hands out `data`, then fails every later read.
    struct FailAfter {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::other("device gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_invalid_utf8_line_is_kept() {
        let input: &[u8] = b"1 'a | x:1\n0 'b | \xff\xfe y:1\n1 'c | x:2\n\n0 'd | z\n";
        let (tx, rx) = mpsc::sync_channel(16);
        let sent = pump_lines(input, &mut parser(), None::<&mut CacheWriter<Vec<u8>>>, &tx).unwrap();
        drop(tx);
        assert_eq!(sent, 4);
        let tags: Vec<String> = rx.iter().filter_map(|ex| ex.tag).collect();
        assert_eq!(tags, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_read_error_is_reported() {
        let reader = BufReader::new(FailAfter {
            data: io::Cursor::new(b"1 'a | x:1\n".to_vec()),
        });
        let (tx, rx) = mpsc::sync_channel(16);
        let mut cache = CacheWriter::new(Vec::new()).unwrap();
        let err = pump_lines(reader, &mut parser(), Some(&mut cache), &tx).unwrap_err();
        assert!(format!("{err:#}").contains("device gone"));
        assert_eq!(cache.records(), 1);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_save_target_fallbacks() {
        let f = Path::new("final.model");
        assert_eq!(save_target(Some("a.model"), Some(f)), PathBuf::from("a.model"));
        assert_eq!(save_target(None, Some(f)), PathBuf::from("final.model"));
        assert_eq!(save_target(None, None), PathBuf::from(DEFAULT_SAVE_PATH));
    }
}
