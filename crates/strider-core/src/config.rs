use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::TranscriptionScheme;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_target_dt() -> f64 {
    0.01
}
fn default_linear_solver() -> String {
    "qdldl".into()
}
const fn default_tolerance() -> f64 {
    1e-3
}
const fn default_max_iterations() -> u32 {
    3000
}
fn default_schemes() -> Vec<TranscriptionScheme> {
    vec![TranscriptionScheme::rk4(), TranscriptionScheme::collocation()]
}
const fn default_shooting_substeps() -> usize {
    5
}
const fn default_force_threshold() -> f64 {
    20.0
}
const fn default_flat_foot_fraction() -> f64 {
    0.15
}
const fn default_forefoot_fraction() -> f64 {
    0.65
}

// ---------------------------------------------------------------------------
// SolverConfiguration
// ---------------------------------------------------------------------------

/// How the solver approximates the Hessian of the Lagrangian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianMode {
    /// Full Gauss-Newton block of the least-squares objective.
    #[default]
    Exact,
    /// Diagonal of the Gauss-Newton block only.
    Approximate,
}

/// Solver settings applied uniformly to every benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfiguration {
    /// Direct linear-solver backend name (e.g. "qdldl").
    #[serde(default = "default_linear_solver")]
    pub linear_solver: String,

    /// Convergence tolerance on step size and constraint violation.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default)]
    pub hessian: HessianMode,

    /// Iteration cap; a solve that reaches it is reported, not failed.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// 0 = quiet, >= 1 logs every iteration at info level.
    #[serde(default)]
    pub verbosity: u8,
}

impl Default for SolverConfiguration {
    fn default() -> Self {
        Self {
            linear_solver: default_linear_solver(),
            tolerance: default_tolerance(),
            hessian: HessianMode::default(),
            max_iterations: default_max_iterations(),
            verbosity: 0,
        }
    }
}

impl SolverConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linear_solver.trim().is_empty() {
            return Err(ConfigError::invalid("solver.linear_solver", "must not be empty"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::invalid("solver.tolerance", "must be finite and > 0"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("solver.max_iterations", "must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ObjectiveWeights
// ---------------------------------------------------------------------------

/// Weights of the tracking objective terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub q: f64,
    pub qdot: f64,
    pub markers: f64,
    pub grf: f64,
    pub moment: f64,
    pub cop: f64,
    /// Control-effort regularization.
    pub control: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            q: 10.0,
            qdot: 0.1,
            markers: 100.0,
            grf: 1e-4,
            moment: 1e-4,
            cop: 10.0,
            control: 1e-4,
        }
    }
}

impl ObjectiveWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("weights.q", self.q),
            ("weights.qdot", self.qdot),
            ("weights.markers", self.markers),
            ("weights.grf", self.grf),
            ("weights.moment", self.moment),
            ("weights.cop", self.cop),
            ("weights.control", self.control),
        ];
        for (field, w) in named {
            if !(w.is_finite() && w >= 0.0) {
                return Err(ConfigError::invalid(field, "must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EventDetectionConfig
// ---------------------------------------------------------------------------

/// Thresholds for detecting gait events from force-plate signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventDetectionConfig {
    /// Vertical force (N) above which the foot is considered loaded.
    #[serde(default = "default_force_threshold")]
    pub force_threshold: f64,

    /// CoP progression fraction (heel -> toe) marking flat foot.
    #[serde(default = "default_flat_foot_fraction")]
    pub flat_foot_fraction: f64,

    /// CoP progression fraction marking heel-off (forefoot phase).
    #[serde(default = "default_forefoot_fraction")]
    pub forefoot_fraction: f64,
}

impl Default for EventDetectionConfig {
    fn default() -> Self {
        Self {
            force_threshold: default_force_threshold(),
            flat_foot_fraction: default_flat_foot_fraction(),
            forefoot_fraction: default_forefoot_fraction(),
        }
    }
}

impl EventDetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.force_threshold.is_finite() && self.force_threshold > 0.0) {
            return Err(ConfigError::invalid("events.force_threshold", "must be > 0"));
        }
        let ordered = 0.0 < self.flat_foot_fraction
            && self.flat_foot_fraction < self.forefoot_fraction
            && self.forefoot_fraction < 1.0;
        if !ordered {
            return Err(ConfigError::invalid(
                "events",
                "need 0 < flat_foot_fraction < forefoot_fraction < 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BenchmarkConfig
// ---------------------------------------------------------------------------

/// Top-level benchmark configuration, usually loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Target sampling interval for shooting nodes (s).
    #[serde(default = "default_target_dt")]
    pub target_dt: f64,

    #[serde(default)]
    pub solver: SolverConfiguration,

    /// Schemes to benchmark, in report order.
    #[serde(default = "default_schemes")]
    pub schemes: Vec<TranscriptionScheme>,

    #[serde(default)]
    pub weights: ObjectiveWeights,

    #[serde(default)]
    pub events: EventDetectionConfig,

    /// RK4 substeps per interval when re-simulating for the consistency check.
    #[serde(default = "default_shooting_substeps")]
    pub shooting_substeps: usize,

    /// Solve schemes concurrently; results keep scheme order.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            target_dt: default_target_dt(),
            solver: SolverConfiguration::default(),
            schemes: default_schemes(),
            weights: ObjectiveWeights::default(),
            events: EventDetectionConfig::default(),
            shooting_substeps: default_shooting_substeps(),
            parallel: false,
        }
    }
}

impl BenchmarkConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_dt.is_finite() && self.target_dt > 0.0) {
            return Err(ConfigError::invalid("target_dt", "must be finite and > 0"));
        }
        if self.schemes.is_empty() {
            return Err(ConfigError::invalid("schemes", "at least one scheme required"));
        }
        for scheme in &self.schemes {
            scheme
                .validate()
                .map_err(|e| ConfigError::invalid("schemes", e.to_string()))?;
        }
        if self.shooting_substeps == 0 {
            return Err(ConfigError::invalid("shooting_substeps", "must be >= 1"));
        }
        self.solver.validate()?;
        self.weights.validate()?;
        self.events.validate()?;
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
