//! Run configuration
//!
//! Values come from three places, highest precedence first: command-line
//! flags, a TOML config file, built-in defaults. Options persisted in a loaded
//! model sit above all of them for anything that affects weight addressing.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapParams;
use crate::context::DEFAULT_SEED;
use crate::error::ConfigError;
use crate::model::PersistedOptions;
use crate::sgd::SgdParams;
use crate::stats::LossFunction;

pub const DEFAULT_BITS: u32 = 18;
/// Resolution of the tail fraction derived from a percentile
const ALPHA_RESOLUTION: f64 = 1e9;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub bootstrap: BootstrapSection,
    #[serde(default)]
    pub regressor: RegressorSection,
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSection {
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub percentile: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressorSection {
    #[serde(default)]
    pub bits: Option<u32>,
    #[serde(default)]
    pub learning_rate: Option<f32>,
    #[serde(default)]
    pub power_t: Option<f32>,
    #[serde(default)]
    pub initial_t: Option<f32>,
    #[serde(default)]
    pub loss: Option<LossFunction>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub test_only: Option<bool>,
    #[serde(default)]
    pub quiet: Option<bool>,
}

pub fn parse_config(text: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(text)?)
}

pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&data)
}

/// Values given on the command line; `None` / `false` means "not given".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CliOverrides {
    pub replicas: Option<u32>,
    pub percentile: Option<f64>,
    pub bits: Option<u32>,
    pub learning_rate: Option<f32>,
    pub power_t: Option<f32>,
    pub initial_t: Option<f32>,
    pub loss: Option<LossFunction>,
    pub seed: Option<u64>,
    pub test_only: bool,
    pub quiet: bool,
}

/// Bootstrap options as requested before a model is consulted
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BootstrapRequest {
    pub replicas: Option<u32>,
    pub percentile: Option<f64>,
}

/// Fully merged run configuration
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub bootstrap: BootstrapRequest,
    pub bits: u32,
    pub sgd: SgdParams,
    pub loss: LossFunction,
    pub seed: u64,
    pub test_only: bool,
    pub quiet: bool,
}

pub fn merge_config(file: Option<&ConfigFile>, cli: &CliOverrides) -> RunConfig {
    let defaults = SgdParams::default();
    let file = file.cloned().unwrap_or_default();
    let (b, r, run) = (&file.bootstrap, &file.regressor, &file.run);
    RunConfig {
        bootstrap: BootstrapRequest {
            replicas: cli.replicas.or(b.replicas),
            percentile: cli.percentile.or(b.percentile),
        },
        bits: cli.bits.or(r.bits).unwrap_or(DEFAULT_BITS),
        sgd: SgdParams {
            learning_rate: cli.learning_rate.or(r.learning_rate).unwrap_or(defaults.learning_rate),
            power_t: cli.power_t.or(r.power_t).unwrap_or(defaults.power_t),
            initial_t: cli.initial_t.or(r.initial_t).unwrap_or(defaults.initial_t),
        },
        loss: cli.loss.or(r.loss).unwrap_or_default(),
        seed: cli.seed.or(run.seed).unwrap_or(DEFAULT_SEED),
        test_only: cli.test_only || run.test_only.unwrap_or(false),
        quiet: cli.quiet || run.quiet.unwrap_or(false),
    }
}

/// Non-fatal setup findings; logged and kept for inspection
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigDiagnostic {
    /// Requested replicate count differs from the loaded model's
    ReplicateConflict { requested: u32, persisted: u32 },
    /// Requested bit precision differs from the loaded model's
    BitsConflict { requested: u32, persisted: u32 },
    /// `1 - percentile` outside [0, 1]; used unclamped
    AlphaOutOfRange { alpha: f64 },
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigDiagnostic::ReplicateConflict { requested, persisted } => write!(
                f,
                "requested {requested} replicates but the loaded model has {persisted}; using {persisted}"
            ),
            ConfigDiagnostic::BitsConflict { requested, persisted } => write!(
                f,
                "requested {requested} bits but the loaded model has {persisted}; using {persisted}"
            ),
            ConfigDiagnostic::AlphaOutOfRange { alpha } => {
                write!(f, "percentile should be between 0 and 1 (tail fraction {alpha})")
            }
        }
    }
}

/// Resolved bootstrap options
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapSettings {
    pub replicas: u32,
    pub alpha: f64,
    pub percentile: Option<f64>,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl BootstrapSettings {
    pub fn params(&self) -> BootstrapParams {
        BootstrapParams {
            replicas: self.replicas,
            alpha: self.alpha,
        }
    }
}

/// Settle replicate count and percentile against an optionally loaded model.
///
/// The persisted replicate count wins over the requested one (with a
/// diagnostic when they differ); a persisted percentile wins silently.
pub fn resolve_bootstrap(
    request: &BootstrapRequest,
    persisted: Option<&PersistedOptions>,
) -> Result<BootstrapSettings, ConfigError> {
    let mut diagnostics = Vec::new();

    let replicas = match (persisted, request.replicas) {
        (Some(p), Some(requested)) => {
            if requested != p.replicas {
                diagnostics.push(ConfigDiagnostic::ReplicateConflict {
                    requested,
                    persisted: p.replicas,
                });
            }
            p.replicas
        }
        (Some(p), None) => p.replicas,
        (None, Some(requested)) => requested,
        (None, None) => return Err(ConfigError::MissingReplicates),
    };
    if replicas == 0 {
        return Err(ConfigError::ZeroReplicates);
    }

    let percentile = persisted.and_then(|p| p.percentile).or(request.percentile);
    // 1 - 0.9 is 0.0999..., which would drop a rank in percentile_indices
    let alpha = percentile.map_or(0.0, |p| ((1.0 - p) * ALPHA_RESOLUTION).round() / ALPHA_RESOLUTION);
    if !(0.0..=1.0).contains(&alpha) {
        diagnostics.push(ConfigDiagnostic::AlphaOutOfRange { alpha });
    }

    for d in &diagnostics {
        log::warn!("{d}");
    }
    Ok(BootstrapSettings {
        replicas,
        alpha,
        percentile,
        diagnostics,
    })
}

/// Bit precision to build with; a loaded model's value wins.
pub fn resolve_bits(requested: u32, persisted: Option<&PersistedOptions>) -> (u32, Option<ConfigDiagnostic>) {
    match persisted {
        Some(p) if p.bits != requested => {
            let d = ConfigDiagnostic::BitsConflict {
                requested,
                persisted: p.bits,
            };
            log::warn!("{d}");
            (p.bits, Some(d))
        }
        Some(p) => (p.bits, None),
        None => (requested, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted(replicas: u32, percentile: Option<f64>) -> PersistedOptions {
        PersistedOptions {
            bits: 10,
            replicas,
            percentile,
            sgd: SgdParams::default(),
            loss: LossFunction::Squared,
        }
    }

    #[test]
    fn test_merge_precedence_cli_over_file() {
        let file = parse_config(
            r#"
[bootstrap]
replicas = 5
percentile = 0.9

[regressor]
bits = 12
learning_rate = 0.25
loss = "zero_one"

[run]
seed = 11
quiet = true
"#,
        )
        .unwrap();
        let cli = CliOverrides {
            replicas: Some(7),
            learning_rate: Some(1.0),
            ..Default::default()
        };
        let cfg = merge_config(Some(&file), &cli);
        assert_eq!(cfg.bootstrap.replicas, Some(7));
        assert_eq!(cfg.bootstrap.percentile, Some(0.9));
        assert_eq!(cfg.bits, 12);
        assert_eq!(cfg.sgd.learning_rate, 1.0);
        assert_eq!(cfg.sgd.power_t, SgdParams::default().power_t);
        assert_eq!(cfg.loss, LossFunction::ZeroOne);
        assert_eq!(cfg.seed, 11);
        assert!(cfg.quiet);
        assert!(!cfg.test_only);
    }

    #[test]
    fn test_merge_defaults_without_file() {
        let cfg = merge_config(None, &CliOverrides::default());
        assert_eq!(cfg.bits, DEFAULT_BITS);
        assert_eq!(cfg.bootstrap, BootstrapRequest::default());
        assert_eq!(cfg.loss, LossFunction::Squared);
        assert_eq!(cfg.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(parse_config("[bootstrap]\nreplica = 3\n"), Err(ConfigError::Parse(_))));
        assert!(matches!(parse_config("[other]\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config_file("/nonexistent/reduct.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_resolve_requested_only() {
        let req = BootstrapRequest {
            replicas: Some(10),
            percentile: Some(0.9),
        };
        let s = resolve_bootstrap(&req, None).unwrap();
        assert_eq!(s.replicas, 10);
        assert!((s.alpha - 0.1).abs() < 1e-12);
        assert!(s.diagnostics.is_empty());
        assert_eq!(s.params().replicas, 10);
    }

    #[test]
    fn test_persisted_replicas_win_with_warning() {
        let req = BootstrapRequest {
            replicas: Some(4),
            percentile: Some(0.8),
        };
        let s = resolve_bootstrap(&req, Some(&persisted(6, Some(0.95)))).unwrap();
        assert_eq!(s.replicas, 6);
        assert!((s.alpha - 0.05).abs() < 1e-12);
        assert_eq!(
            s.diagnostics,
            vec![ConfigDiagnostic::ReplicateConflict {
                requested: 4,
                persisted: 6
            }]
        );

        let same = resolve_bootstrap(
            &BootstrapRequest {
                replicas: Some(6),
                percentile: None,
            },
            Some(&persisted(6, None)),
        )
        .unwrap();
        assert!(same.diagnostics.is_empty());
        assert_eq!(same.alpha, 0.0);
    }

    #[test]
    fn test_alpha_is_exact_for_decimal_percentiles() {
        let req = BootstrapRequest {
            replicas: Some(20),
            percentile: Some(0.9),
        };
        let s = resolve_bootstrap(&req, None).unwrap();
        assert_eq!(s.alpha, 0.1);
        assert_eq!(crate::bootstrap::percentile_indices(20, s.alpha), (1, 17));

        let req = BootstrapRequest {
            replicas: Some(40),
            percentile: Some(0.95),
        };
        let s = resolve_bootstrap(&req, None).unwrap();
        assert_eq!(crate::bootstrap::percentile_indices(40, s.alpha), (1, 37));
    }

    #[test]
    fn test_alpha_out_of_range_is_kept() {
        let req = BootstrapRequest {
            replicas: Some(3),
            percentile: Some(1.5),
        };
        let s = resolve_bootstrap(&req, None).unwrap();
        assert!((s.alpha + 0.5).abs() < 1e-12);
        assert!(matches!(s.diagnostics[..], [ConfigDiagnostic::AlphaOutOfRange { .. }]));
    }

    #[test]
    fn test_zero_and_missing_replicates() {
        let zero = BootstrapRequest {
            replicas: Some(0),
            percentile: None,
        };
        assert!(matches!(resolve_bootstrap(&zero, None), Err(ConfigError::ZeroReplicates)));
        assert!(matches!(
            resolve_bootstrap(&BootstrapRequest::default(), None),
            Err(ConfigError::MissingReplicates)
        ));
        let s = resolve_bootstrap(&BootstrapRequest::default(), Some(&persisted(2, None))).unwrap();
        assert_eq!(s.replicas, 2);
    }

    #[test]
    fn test_resolve_bits() {
        assert_eq!(resolve_bits(18, None), (18, None));
        assert_eq!(resolve_bits(10, Some(&persisted(1, None))), (10, None));
        let (bits, diag) = resolve_bits(18, Some(&persisted(1, None)));
        assert_eq!(bits, 10);
        assert!(matches!(diag, Some(ConfigDiagnostic::BitsConflict { requested: 18, persisted: 10 })));
    }
}
