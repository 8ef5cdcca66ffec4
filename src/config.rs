// pea: configuration surface

use serde::{Deserialize, Serialize};

use crate::error::{PeaError, PeaResult};

/// Where a Pea sits in a pipeline. Drives name derivation (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeaRole {
    Head,
    Tail,
    Parallel,
    Singleton,
}

/// How aggressively a Pea skips executor dispatch on an errored message.
/// Declared in ascending order so `skip_on_error < HANDLE` (§4.4) is a
/// well-typed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SkipOnErrorType {
    Never,
    Handle,
    Always,
}

/// Immutable configuration for the lifetime of one Pea (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeaConfig {
    pub name: String,
    pub role: PeaRole,
    pub pea_id: usize,
    pub identity: String,

    /// Primary executor config source.
    pub uses: String,
    /// Fallback executor config source, tried only on `ConfigSourceBad`.
    pub uses_internal: String,

    /// Expected number of partial messages per request id. Must be >= 1.
    pub num_part: usize,
    /// Seconds of inactivity before `is_idle` reports true.
    pub max_idle_time: u64,
    /// Seconds between opportunistic `executor.save()` calls. 0 disables.
    pub dump_interval: u64,
    /// Resident memory high watermark in GB. 0 disables the check.
    pub memory_hwm: f64,

    pub skip_on_error: SkipOnErrorType,
    pub separated_workspace: bool,
    pub read_only: bool,
    pub py_modules: Vec<String>,

    /// Debug flag: re-raise instead of attaching-and-forwarding on any
    /// executor runtime error. Overridable by `PEA_RAISE_ERROR_EARLY`.
    pub raise_error_early: bool,
}

impl Default for PeaConfig {
    fn default() -> Self {
        Self {
            name: "pea".to_string(),
            role: PeaRole::Singleton,
            pea_id: 0,
            identity: "pea-0".to_string(),
            uses: "_pass".to_string(),
            uses_internal: "_pass".to_string(),
            num_part: 1,
            max_idle_time: 60,
            dump_interval: 0,
            memory_hwm: 0.0,
            skip_on_error: SkipOnErrorType::Never,
            separated_workspace: false,
            read_only: false,
            py_modules: Vec::new(),
            raise_error_early: false,
        }
    }
}

impl PeaConfig {
    /// The name this Pea should log and route under, derived from role
    /// exactly as in §3.
    pub fn derived_name(&self) -> String {
        match self.role {
            PeaRole::Head => format!("{}-head", self.name),
            PeaRole::Tail => format!("{}-tail", self.name),
            PeaRole::Parallel => format!("{}-{}", self.name, self.pea_id),
            PeaRole::Singleton => self.name.clone(),
        }
    }

    /// Load from a TOML file, following the reference crate's
    /// `SidecarConfig::from_file` shape.
    pub fn from_file(path: &str) -> PeaResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PeaError::ConfigSourceBad(format!("reading {path}: {e}")))?;
        toml::from_str(&content).map_err(|e| PeaError::ConfigSourceBad(format!("parsing {path}: {e}")))
    }

    /// Apply `PEA_*` environment overrides on top of whatever was loaded
    /// from file or built with `Default`. Only the scalar fields with an
    /// obvious string/number encoding are overridable; `py_modules` is not.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PEA_NAME") {
            self.name = v;
        }
        if let Ok(v) = std::env::var("PEA_USES") {
            self.uses = v;
        }
        if let Ok(v) = std::env::var("PEA_USES_INTERNAL") {
            self.uses_internal = v;
        }
        if let Some(v) = std::env::var("PEA_NUM_PART").ok().and_then(|s| s.parse().ok()) {
            self.num_part = v;
        }
        if let Some(v) = std::env::var("PEA_MAX_IDLE_TIME")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.max_idle_time = v;
        }
        if let Some(v) = std::env::var("PEA_DUMP_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.dump_interval = v;
        }
        if let Some(v) = std::env::var("PEA_MEMORY_HWM")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.memory_hwm = v;
        }
        if std::env::var("PEA_RAISE_ERROR_EARLY").is_ok() {
            self.raise_error_early = true;
        }
        self
    }
}
