//! Forecasting configuration
//!
//! Plain serde structs, loadable from and savable to JSON.

use crate::dataset::validate_quantiles;
use crate::error::{ForecastError, Result};
use crate::models::nn::{RnnConfig, RnnModel};
use crate::models::{ModelFactory, MovingAverageConfig, SeasonalMovingAverageModel, SegmentModel};
use crate::transforms::ImputerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which per-segment model to fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    MovingAverage(MovingAverageConfig),
    Rnn(RnnConfig),
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::MovingAverage(MovingAverageConfig::default())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            ModelConfig::MovingAverage(config) => config.validate(),
            ModelConfig::Rnn(config) => config.validate(),
        }
    }
}

impl ModelFactory for ModelConfig {
    fn make_model(&self) -> Result<Box<dyn SegmentModel>> {
        Ok(match self {
            ModelConfig::MovingAverage(config) => {
                Box::new(SeasonalMovingAverageModel::new(config.clone())?)
            }
            ModelConfig::Rnn(config) => Box::new(RnnModel::new(config.clone())?),
        })
    }
}

/// Configuration of a [`ForecastPipeline`](crate::pipeline::ForecastPipeline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelConfig,
    /// Imputation applied before fitting, if any
    pub imputer: Option<ImputerConfig>,
    /// Number of future steps to forecast
    pub horizon: usize,
    /// Worker threads for per-segment work (None = rayon default)
    pub n_jobs: Option<usize>,
    /// Target quantiles forecast alongside the point forecast
    pub quantiles: Vec<f64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            imputer: None,
            horizon: 7,
            n_jobs: None,
            quantiles: Vec::new(),
        }
    }
}

impl ForecastConfig {
    pub fn new(model: ModelConfig, horizon: usize) -> Self {
        Self {
            model,
            horizon,
            ..Self::default()
        }
    }

    pub fn with_imputer(mut self, imputer: ImputerConfig) -> Self {
        self.imputer = Some(imputer);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    /// Also forecast these target quantiles, e.g. `[0.025, 0.975]`
    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::ConfigError(
                "horizon must be positive".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(ForecastError::ConfigError(
                "n_jobs must be positive".to_string(),
            ));
        }
        validate_quantiles(&self.quantiles)?;
        self.model.validate()?;
        if let Some(imputer) = &self.imputer {
            imputer.validate()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
