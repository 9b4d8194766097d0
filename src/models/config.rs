//! Configuration models for ezbhddm.
//!
//! Everything a sweep can vary is parameterized here and resolved at
//! runtime from a TOML file. Only the grid axes are required.

use super::{DesignType, Prior, TargetParameter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for ezbhddm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Design grid to sweep
    pub grid: GridConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Estimation engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Prior hyperparameters shared by every cell
    #[serde(default)]
    pub prior: Prior,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Axes and labels of the design grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Participant counts (rows)
    pub participants: Vec<usize>,

    /// Trials per participant (columns)
    pub trials: Vec<usize>,

    /// Parameters that carry the covariate; one grid per target and design
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetParameter>,

    /// Covariate layouts
    #[serde(default = "default_designs")]
    pub designs: Vec<DesignType>,

    /// Repetitions per cell
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Repetitions per dispatched task; the checkpoint is rewritten after each task
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_axis() -> Vec<usize> {
    vec![20, 40, 80, 160, 320]
}

fn default_targets() -> Vec<TargetParameter> {
    TargetParameter::ALL.to_vec()
}

fn default_designs() -> Vec<DesignType> {
    vec![DesignType::Ttest]
}

fn default_repetitions() -> usize {
    1000
}

fn default_checkpoint_every() -> usize {
    50
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            participants: default_axis(),
            trials: default_axis(),
            targets: default_targets(),
            designs: default_designs(),
            repetitions: default_repetitions(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of cell tasks running at once
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Times a task whose worker panicked is dispatched again
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,
}

fn default_pool_size() -> usize {
    12
}

fn default_max_task_retries() -> u32 {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            max_task_retries: default_max_task_retries(),
        }
    }
}

/// Which estimator fits each simulated dataset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Hierarchical Bayesian fit through the JAGS binary (default)
    #[default]
    Jags,
    /// Closed-form EZ inversion, no posterior
    Ez,
}

/// Estimation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,

    /// Engine executable; may contain ${ENV_VAR}
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Adaptation iterations
    #[serde(default = "default_adapt")]
    pub adapt: u32,

    /// Burn-in iterations
    #[serde(default)]
    pub burnin: u32,

    /// Retained iterations per chain
    #[serde(default = "default_samples")]
    pub samples: u32,

    /// Independent chains
    #[serde(default = "default_chains")]
    pub chains: u32,

    /// Wall-clock budget per fit; the engine process is killed on expiry
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: Option<u64>,

    /// Attempts per fit, counting the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Keep the scratch directory of each fit for inspection
    #[serde(default)]
    pub keep_workdir: bool,
}

fn default_binary() -> String {
    "jags".to_string()
}

fn default_adapt() -> u32 {
    100
}

fn default_samples() -> u32 {
    400
}

fn default_chains() -> u32 {
    4
}

fn default_engine_timeout() -> Option<u64> {
    Some(600)
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            binary: default_binary(),
            adapt: default_adapt(),
            burnin: 0,
            samples: default_samples(),
            chains: default_chains(),
            timeout_secs: default_engine_timeout(),
            max_attempts: default_max_attempts(),
            keep_workdir: false,
        }
    }
}

impl EngineConfig {
    /// Engine executable with environment variables expanded.
    pub fn resolved_binary(&self) -> String {
        expand_env_vars(&self.binary)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding one checkpoint artifact per (target, design)
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Master seed; drawn from the OS when absent and recorded in the checkpoint
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("cache")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Check that the grid is non-empty and every knob is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.participants.is_empty() || grid.trials.is_empty() {
            return Err(ConfigError::Invalid(
                "grid.participants and grid.trials must not be empty".to_string(),
            ));
        }
        if grid.participants.iter().any(|&p| p < 2) {
            return Err(ConfigError::Invalid(
                "every participant count must be at least 2".to_string(),
            ));
        }
        if grid.trials.iter().any(|&t| t < 2) {
            return Err(ConfigError::Invalid(
                "every trial count must be at least 2".to_string(),
            ));
        }
        if grid.targets.is_empty() || grid.designs.is_empty() {
            return Err(ConfigError::Invalid(
                "grid.targets and grid.designs must not be empty".to_string(),
            ));
        }
        if grid.checkpoint_every == 0 {
            return Err(ConfigError::Invalid(
                "grid.checkpoint_every must be positive".to_string(),
            ));
        }
        if self.workers.size == 0 {
            return Err(ConfigError::Invalid("workers.size must be positive".to_string()));
        }

        let engine = &self.engine;
        if engine.kind == EngineKind::Jags {
            if engine.samples == 0 || engine.chains == 0 {
                return Err(ConfigError::Invalid(
                    "engine.samples and engine.chains must be positive".to_string(),
                ));
            }
            if engine.resolved_binary().trim().is_empty() {
                return Err(ConfigError::Invalid("engine.binary is empty".to_string()));
            }
        }
        if engine.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_attempts must be at least 1".to_string(),
            ));
        }

        self.prior
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        toml::from_str(
            r#"
            [grid]
            participants = [20, 40]
            trials = [10]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = minimal();
        assert_eq!(config.grid.participants, vec![20, 40]);
        assert_eq!(config.grid.targets.len(), 3);
        assert_eq!(config.grid.designs, vec![DesignType::Ttest]);
        assert_eq!(config.grid.repetitions, 1000);
        assert_eq!(config.workers.size, 12);
        assert_eq!(config.engine.kind, EngineKind::Jags);
        assert_eq!(config.engine.samples, 400);
        assert_eq!(config.engine.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.output.checkpoint_dir, PathBuf::from("cache"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_axes_are_required() {
        let parsed: Result<Config, _> = toml::from_str("[grid]\ntrials = [10]\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_axis() {
        let mut config = minimal();
        config.grid.trials.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_prior() {
        let mut config = minimal();
        config.prior.nondt_sdev_upper = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_engine_section_parses() {
        let config: Config = toml::from_str(
            r#"
            [grid]
            participants = [20]
            trials = [20]
            targets = ["bound"]
            designs = ["linreg", "ttest"]

            [engine]
            kind = "ez"
            timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.kind, EngineKind::Ez);
        assert_eq!(config.grid.targets, vec![TargetParameter::Bound]);
        assert_eq!(config.grid.designs.len(), 2);
        assert_eq!(config.engine.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown() {
        assert_eq!(
            expand_env_vars("${EZBHDDM_SURELY_UNSET_VAR}/jags"),
            "${EZBHDDM_SURELY_UNSET_VAR}/jags"
        );
        assert_eq!(expand_env_vars("/usr/bin/jags"), "/usr/bin/jags");
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
