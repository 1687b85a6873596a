//! Run configuration.
//!
//! A run is described by a JSON or YAML file listing the jobs, the policy
//! and a few knobs. Command-line flags may override the knobs after load.

use crate::process::DEFAULT_GRACE;
use crate::scheduler::{Job, Policy, PolicyFactory, PolicyType};
use crate::telemetry::DeviceSelection;
use crate::timeseries::TIMESERIES_FILE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Jobs in submission order
    pub jobs: Vec<JobSpec>,

    pub policy: PolicyConfig,

    /// Seconds a signalled job may take to exit before it is killed
    #[serde(default = "default_grace_secs")]
    pub grace_secs: f64,

    /// Directory receiving `timeseries.csv`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub device: DeviceSelection,

    /// Stop after this many quanta even if jobs remain
    #[serde(default)]
    pub max_quanta: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(rename = "type")]
    pub policy_type: PolicyType,

    pub quantum_secs: f64,

    /// Lottery seed; drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_grace_secs() -> f64 {
    DEFAULT_GRACE.as_secs_f64()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON config file '{path}'")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse YAML config file '{path}'")]
    ParseYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no jobs configured")]
    NoJobs,

    #[error("duplicate job name {0:?}")]
    DuplicateJob(String),

    #[error("job {0:?} has an empty command")]
    EmptyCommand(String),

    #[error("quantum must be a positive number of seconds, got {0}")]
    NonPositiveQuantum(f64),

    #[error("grace period must be a non-negative number of seconds, got {0}")]
    InvalidGrace(f64),
}

impl RunConfig {
    /// Load configuration from a JSON or YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| ConfigError::Io {
            path: path_ref.to_string_lossy().to_string(),
            source: e,
        })?;

        let path_str = path_ref.to_string_lossy();
        if path_str.ends_with(".yaml") || path_str.ends_with(".yml") {
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
                path: path_str.to_string(),
                source: e,
            })
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
                path: path_str.to_string(),
                source: e,
            })
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
            if job.command.first().map_or(true, |p| p.is_empty()) {
                return Err(ConfigError::EmptyCommand(job.name.clone()));
            }
        }
        self.quantum()?;
        self.grace()?;
        Ok(())
    }

    pub fn quantum(&self) -> Result<Duration, ConfigError> {
        let secs = self.policy.quantum_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(quantum) if !quantum.is_zero() => Ok(quantum),
            _ => Err(ConfigError::NonPositiveQuantum(secs)),
        }
    }

    pub fn grace(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.grace_secs)
            .map_err(|_| ConfigError::InvalidGrace(self.grace_secs))
    }

    pub fn policy(&self) -> Result<Box<dyn Policy>, ConfigError> {
        Ok(PolicyFactory::get_policy(
            self.policy.policy_type,
            self.quantum()?,
            self.policy.seed,
        ))
    }

    /// Fresh jobs, in configuration order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .iter()
            .map(|spec| Job::new(spec.name.clone(), spec.command.clone()))
            .collect()
    }

    pub fn timeseries_path(&self) -> PathBuf {
        self.output_dir.join(TIMESERIES_FILE)
    }
}
