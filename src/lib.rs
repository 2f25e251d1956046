//! Kolosal Forecast - multi-segment time series forecasting core
//!
//! This crate turns a panel of parallel time series (one per segment) into
//! per-segment fitted models and forecasts:
//! - Dense panel container with a long-form polars round trip
//! - Reversible preprocessing, including five imputation strategies
//! - Sliding encoder/decoder windows for sequence models
//! - Autoregressive multi-step decoding
//! - One independently fitted model per segment
//!
//! # Modules
//!
//! - [`dataset`] - Panel dataset and per-segment views
//! - [`transforms`] - Imputation and other reversible transforms
//! - [`models`] - Per-segment orchestration, moving average and RNN models
//! - [`pipeline`] - Impute, fit and forecast in one go
//! - [`config`] - Serializable configuration
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use kolosal_forecast::prelude::*;
//!
//! # fn run(panel: Panel) -> kolosal_forecast::Result<()> {
//! let config = ForecastConfig::new(ModelConfig::MovingAverage(MovingAverageConfig::naive(7)), 14)
//!     .with_imputer(ImputerConfig::new(ImputerStrategy::Seasonal).with_seasonality(7));
//! let mut pipeline = ForecastPipeline::new(config)?;
//! let forecast = pipeline.fit_forecast(&panel)?;
//! println!("{}", forecast.to_long_frame()?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod config;

pub mod dataset;
pub mod transforms;
pub mod models;
pub mod pipeline;

pub mod utils;

pub use error::{ForecastError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ForecastError, Result};

    // Configuration
    pub use crate::config::{ForecastConfig, ModelConfig};

    // Dataset
    pub use crate::dataset::{quantile_column, Panel, PanelBuilder, SegmentFrame, TARGET};

    // Transforms
    pub use crate::transforms::{
        AddConstTransform, ImputerConfig, ImputerStrategy, TimeSeriesImputer, Transform,
    };

    // Models
    pub use crate::models::nn::{make_samples, AutoregressiveDecoder, RnnConfig, RnnModel, WindowConfig};
    pub use crate::models::{
        ModelFactory, MovingAverageConfig, PerSegmentModel, SeasonalMovingAverageModel,
        SegmentModel,
    };

    pub use crate::pipeline::ForecastPipeline;
}
