//! Configuration for the planning core
//!
//! Every module is configured by a TOML table ([ModuleArgs]). The `type` key names
//! the registered implementation, nested tables configure nested modules and the
//! remaining keys are deserialized into the module's typed config struct.
//!
//! ```toml
//! max_new_segments = 300
//!
//! [trajectory_generator]
//! type = "rrt_star"
//! max_extension_range = 1.5
//!
//! [trajectory_generator.bounding_volume]
//! type = "box"
//! min = [0.0, 0.0, 0.0]
//! max = [10.0, 10.0, 3.0]
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::common::{PlanningError, PlanningResult};

/// Key naming the implementation inside a module table
pub const TYPE_KEY: &str = "type";

/// Arguments of a single module: its `type` plus free-form parameters
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ModuleArgs(toml::Table);

impl ModuleArgs {
    /// Empty arguments; the factory falls back to the kind's default type.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(type_name: &str) -> Self {
        Self::new().with(TYPE_KEY, type_name)
    }

    pub fn from_toml_str(contents: &str) -> PlanningResult<Self> {
        Ok(ModuleArgs(toml::from_str(contents)?))
    }

    /// Builder style setter
    pub fn with(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Builder style setter for a nested module
    pub fn with_module(mut self, key: &str, args: ModuleArgs) -> Self {
        self.0.insert(key.to_string(), toml::Value::Table(args.0));
        self
    }

    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE_KEY).and_then(|v| v.as_str())
    }

    /// Arguments of the nested module stored under `key`, empty if absent.
    ///
    /// # Errors
    ///
    /// If `key` holds something other than a table.
    pub fn sub_module(&self, key: &str) -> PlanningResult<ModuleArgs> {
        match self.0.get(key) {
            None => Ok(ModuleArgs::new()),
            Some(toml::Value::Table(table)) => Ok(ModuleArgs(table.clone())),
            Some(other) => Err(PlanningError::Config(format!(
                "'{}' must be a module table, found {}",
                key,
                other.type_str()
            ))),
        }
    }

    /// Deserialize the parameters into a typed config.
    ///
    /// Unknown keys (including `type` and nested modules) are ignored.
    pub fn parse<T: DeserializeOwned>(&self) -> PlanningResult<T> {
        Ok(toml::Value::Table(self.0.clone()).try_into()?)
    }
}

/// Top-level planner configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Stop expanding once the tree holds this many segments (0 = unlimited)
    pub max_new_segments: usize,
    /// Keep expanding until at least this many segments exist before a step is requested
    pub min_new_segments: usize,
    /// Expansion attempts per planning cycle
    pub expand_batch: usize,
    /// Upper bound on cycles spent growing towards `min_new_segments`
    pub max_cycle_attempts: usize,
    /// Report every planning cycle at info level
    pub verbose: bool,
    pub trajectory_generator: ModuleArgs,
    pub trajectory_evaluator: ModuleArgs,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_new_segments: 0,
            min_new_segments: 0,
            expand_batch: 1,
            max_cycle_attempts: 1000,
            verbose: false,
            trajectory_generator: ModuleArgs::of_type("rrt_star"),
            trajectory_evaluator: ModuleArgs::of_type("rrt_star_adapter"),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PlanningResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> PlanningResult<Self> {
        let config: PlannerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// If the limits are inconsistent.
    pub fn validate(&self) -> PlanningResult<()> {
        if self.expand_batch == 0 {
            return Err(PlanningError::invalid_parameter("expand_batch", "must be at least 1"));
        }
        if self.max_new_segments > 0 && self.min_new_segments > self.max_new_segments {
            return Err(PlanningError::invalid_parameter(
                "min_new_segments",
                "must not exceed max_new_segments",
            ));
        }
        Ok(())
    }
}

/// Reject negative values of a length-like parameter.
pub fn ensure_non_negative(name: &str, value: f64) -> PlanningResult<()> {
    if value < 0.0 || !value.is_finite() {
        return Err(PlanningError::invalid_parameter(name, format!("must be a finite value >= 0, got {}", value)));
    }
    Ok(())
}

/// Reject non-positive values of a length-like parameter.
pub fn ensure_positive(name: &str, value: f64) -> PlanningResult<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(PlanningError::invalid_parameter(name, format!("must be a finite value > 0, got {}", value)));
    }
    Ok(())
}
