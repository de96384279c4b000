//! Engine configuration, loaded from TOML.
//!
//! Every tunable has a default, so an empty file is valid apart from the
//! worker list.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use switchboard_actions::GateConfig;
use switchboard_agent::HttpBackendConfig;
use switchboard_core::{SwitchboardError, SwitchboardResult, WorkerId};
use switchboard_routing::{CapabilityProfile, ClassifierConfig, ScoringWeights, DEFAULT_EMA_WEIGHT};

/// Static description of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: WorkerId,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    pub max_concurrent: u32,
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    #[serde(default)]
    pub avg_response_time_ms: f64,
    #[serde(default)]
    pub offline: bool,
}

fn default_success_rate() -> f64 {
    100.0
}

impl WorkerConfig {
    pub fn new(id: impl Into<WorkerId>, max_concurrent: u32) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            specializations: Vec::new(),
            max_concurrent,
            success_rate: default_success_rate(),
            avg_response_time_ms: 0.0,
            offline: false,
        }
    }

    pub fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.capabilities = caps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_specializations(mut self, specs: &[&str]) -> Self {
        self.specializations = specs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_stats(mut self, success_rate: f64, avg_response_time_ms: f64) -> Self {
        self.success_rate = success_rate;
        self.avg_response_time_ms = avg_response_time_ms;
        self
    }

    pub fn to_profile(&self) -> CapabilityProfile {
        let mut profile = CapabilityProfile::new(self.id.clone(), self.max_concurrent)
            .with_capabilities(self.capabilities.iter().cloned())
            .with_specializations(self.specializations.iter().cloned())
            .with_stats(self.success_rate, self.avg_response_time_ms);
        profile.offline = self.offline;
        profile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_ema_weight")]
    pub ema_weight: f64,
}

fn default_ema_weight() -> f64 {
    DEFAULT_EMA_WEIGHT
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ema_weight: default_ema_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Pending low-priority delegations older than this are auto-accepted.
    #[serde(default = "default_auto_accept_after_secs")]
    pub auto_accept_after_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_auto_accept_after_secs() -> u64 {
    300
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            auto_accept_after_secs: default_auto_accept_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Worker id -> ordered fallback workers, used when executing tasks.
    #[serde(default)]
    pub chains: HashMap<WorkerId, Vec<WorkerId>>,
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            chains: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for `file`, database file for `sqlite`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Bound on each datastore call.
    #[serde(default = "default_persistence_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_persistence_timeout_ms() -> u64 {
    5000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            timeout_ms: default_persistence_timeout_ms(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Worker id -> HTTP completion backend.
    #[serde(default)]
    pub backends: HashMap<WorkerId, HttpBackendConfig>,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> SwitchboardResult<Self> {
        toml::from_str(raw).map_err(|e| SwitchboardError::Config(format!("Invalid TOML: {e}")))
    }

    pub fn from_file(path: &Path) -> SwitchboardResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn with_fallback_chain(mut self, worker: impl Into<WorkerId>, chain: &[&str]) -> Self {
        self.fallback
            .chains
            .insert(worker.into(), chain.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn validate(&self) -> SwitchboardResult<()> {
        let id_pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$")
            .map_err(|e| SwitchboardError::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        for w in &self.workers {
            if !id_pattern.is_match(&w.id) {
                return Err(config_err(format!("Invalid worker id '{}'", w.id)));
            }
            if !seen.insert(w.id.as_str()) {
                return Err(config_err(format!("Duplicate worker id '{}'", w.id)));
            }
            if w.max_concurrent == 0 {
                return Err(config_err(format!("Worker '{}' must have max_concurrent > 0", w.id)));
            }
            if !(0.0..=100.0).contains(&w.success_rate) {
                return Err(config_err(format!("Worker '{}' success_rate must be in [0, 100]", w.id)));
            }
            if w.avg_response_time_ms < 0.0 {
                return Err(config_err(format!("Worker '{}' avg_response_time_ms must be >= 0", w.id)));
            }
        }

        if !(self.registry.ema_weight > 0.0 && self.registry.ema_weight <= 1.0) {
            return Err(config_err("registry.ema_weight must be in (0, 1]".into()));
        }
        unit_interval("classifier.floor", self.classifier.floor)?;
        unit_interval("classifier.fallback_confidence", self.classifier.fallback_confidence)?;
        unit_interval("gate.execute_threshold", self.gate.execute_threshold)?;
        if let Some(patterns) = &self.classifier.patterns {
            for p in patterns {
                unit_interval(&format!("classifier pattern '{}' base_confidence", p.request_type), p.base_confidence)?;
            }
        }

        if self.lifecycle.sweep_interval_secs == 0 {
            return Err(config_err("lifecycle.sweep_interval_secs must be > 0".into()));
        }
        if self.gate.executor_timeout_ms == 0 {
            return Err(config_err("gate.executor_timeout_ms must be > 0".into()));
        }
        if self.fallback.attempt_timeout_ms == 0 {
            return Err(config_err("fallback.attempt_timeout_ms must be > 0".into()));
        }
        if self.persistence.retry_interval_ms == 0 {
            return Err(config_err("persistence.retry_interval_ms must be > 0".into()));
        }
        if self.persistence.timeout_ms == 0 {
            return Err(config_err("persistence.timeout_ms must be > 0".into()));
        }
        if self.persistence.backend != StoreBackend::Memory && self.persistence.path.is_none() {
            return Err(config_err("persistence.path is required for file and sqlite backends".into()));
        }

        for (worker, chain) in &self.fallback.chains {
            if !seen.contains(worker.as_str()) {
                return Err(config_err(format!("Fallback chain for unknown worker '{worker}'")));
            }
            if let Some(unknown) = chain.iter().find(|w| !seen.contains(w.as_str())) {
                return Err(config_err(format!(
                    "Fallback chain for '{worker}' references unknown worker '{unknown}'"
                )));
            }
        }
        if let Some(unknown) = self.backends.keys().find(|w| !seen.contains(w.as_str())) {
            return Err(config_err(format!("Backend configured for unknown worker '{unknown}'")));
        }
        Ok(())
    }
}

fn config_err(msg: String) -> SwitchboardError {
    SwitchboardError::Config(msg)
}

fn unit_interval(name: &str, value: f64) -> SwitchboardResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_err(format!("{name} must be in [0, 1], got {value}")))
    }
}
