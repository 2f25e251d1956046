//! Forecasting models
//!
//! Every model forecasts a single segment through [`SegmentModel`];
//! [`PerSegmentModel`] keeps one independently fitted instance per segment of
//! a panel, created through a [`ModelFactory`].

mod moving_average;
pub mod nn;
mod per_segment;

pub use moving_average::{MovingAverageConfig, SeasonalMovingAverageModel};
pub use per_segment::{merge_forecasts, PerSegmentModel, SegmentForecast};

use crate::dataset::SegmentFrame;
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};
use std::fmt;

/// Model fitted on, and forecasting, one segment
pub trait SegmentModel: fmt::Debug + Send + Sync {
    /// Fit on a segment view without missing rows
    fn fit(&mut self, frame: &SegmentFrame) -> Result<()>;

    /// Predict the target for rows `horizon_start..frame.len()`.
    ///
    /// Rows before `horizon_start` are history; the target of later rows is
    /// unknown and never read.
    fn predict(&self, frame: &SegmentFrame, horizon_start: usize) -> Result<Array1<f64>>;

    /// Predict target quantiles for rows `horizon_start..frame.len()`, one
    /// column per entry of `quantiles`.
    ///
    /// Models without prediction intervals fail with `ConfigError`.
    fn predict_quantiles(
        &self,
        _frame: &SegmentFrame,
        _horizon_start: usize,
        _quantiles: &[f64],
    ) -> Result<Array2<f64>> {
        Err(ForecastError::ConfigError(format!(
            "{} does not produce prediction intervals",
            self.name()
        )))
    }

    fn is_fitted(&self) -> bool;

    /// Short model name used in logs
    fn name(&self) -> &'static str;
}

/// Creates fresh, unfitted models
pub trait ModelFactory: fmt::Debug + Send + Sync {
    fn make_model(&self) -> Result<Box<dyn SegmentModel>>;
}
