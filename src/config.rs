//! Pipeline configuration files.
//!
//! ```toml
//! passes = ["side_effects", "load_store_elimination", "dead_code_elimination"]
//! disabled = ["dead_code_elimination"]
//! verify = true
//!
//! [dce]
//! max_iterations = 50
//! ```
//!
//! Every key is optional; missing keys take the default pipeline's values.

use std::path::Path;

use derive_more::{Display, Error, From};
use ember_opt::{DceConfig, OptimizationConfig, PassId, PassSet};
use serde::Deserialize;

#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    #[display("cannot read config file: {_0}")]
    Io(std::io::Error),
    #[display("invalid config file: {_0}")]
    Toml(toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub passes: Vec<PassId>,
    pub disabled: Vec<PassId>,
    pub verify: bool,
    pub dce: DceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            passes: PassId::ALL.to_vec(),
            disabled: Vec::new(),
            verify: true,
            dce: DceConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn to_optimization_config(&self) -> OptimizationConfig {
        OptimizationConfig {
            passes: self.passes.clone(),
            disabled: self.disabled.iter().copied().collect::<PassSet>(),
            verify: self.verify,
            dce: self.dce.clone(),
        }
    }
}

impl From<PipelineConfig> for OptimizationConfig {
    fn from(config: PipelineConfig) -> Self {
        config.to_optimization_config()
    }
}
