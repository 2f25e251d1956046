//! Seasonal moving average
//!
//! Prediction intervals come from the empirical quantiles of the in-sample
//! one-step residuals, widened by the square root of the step ahead.

use super::SegmentModel;
use crate::dataset::SegmentFrame;
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Seasonal moving average configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovingAverageConfig {
    /// Number of past seasons averaged
    pub window: usize,
    /// Season length in steps
    pub seasonality: usize,
}

impl Default for MovingAverageConfig {
    fn default() -> Self {
        Self {
            window: 5,
            seasonality: 7,
        }
    }
}

impl MovingAverageConfig {
    pub fn new(window: usize, seasonality: usize) -> Self {
        Self {
            window,
            seasonality,
        }
    }

    /// Seasonal naive forecast: repeat the value `lag` steps back
    pub fn naive(lag: usize) -> Self {
        Self::new(1, lag)
    }

    /// Plain moving average over the last `window` steps
    pub fn moving_average(window: usize) -> Self {
        Self::new(window, 1)
    }

    /// Number of past steps one prediction looks at
    pub fn context_length(&self) -> usize {
        self.window * self.seasonality
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(ForecastError::ConfigError(
                "moving average window must be positive".to_string(),
            ));
        }
        if self.seasonality == 0 {
            return Err(ForecastError::ConfigError(
                "moving average seasonality must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Predicts each step as the mean of the values `seasonality`, `2 * seasonality`,
/// ... `window * seasonality` steps back; predictions feed later steps.
#[derive(Debug, Clone)]
pub struct SeasonalMovingAverageModel {
    config: MovingAverageConfig,
    is_fitted: bool,
    /// Sorted one-step residuals on the fitted history
    residuals: Vec<f64>,
}

impl SeasonalMovingAverageModel {
    pub fn new(config: MovingAverageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            is_fitted: false,
            residuals: Vec::new(),
        })
    }

    pub fn config(&self) -> &MovingAverageConfig {
        &self.config
    }

    /// Sorted in-sample one-step residuals, empty before fit
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Mean of the observed lagged values feeding the prediction at `t`
    fn lagged_mean(&self, series: &[f64], t: usize) -> f64 {
        let (sum, count) = (1..=self.config.window)
            .map(|k| series[t - k * self.config.seasonality])
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }
}

/// Linearly interpolated `q` quantile of sorted, non-empty `values`
fn empirical_quantile(values: &[f64], q: f64) -> f64 {
    let position = q * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    values[lower] + (values[upper] - values[lower]) * (position - lower as f64)
}

impl SegmentModel for SeasonalMovingAverageModel {
    fn fit(&mut self, frame: &SegmentFrame) -> Result<()> {
        let context = self.config.context_length();
        if frame.len() < context {
            return Err(ForecastError::DataError(format!(
                "segment '{}' has {} rows, the moving average needs {}",
                frame.segment(),
                frame.len(),
                context
            )));
        }

        let series = frame.target()?.to_vec();
        let mut residuals: Vec<f64> = (context..series.len())
            .map(|t| series[t] - self.lagged_mean(&series, t))
            .filter(|r| r.is_finite())
            .collect();
        residuals.sort_by(|a, b| a.total_cmp(b));

        self.residuals = residuals;
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, frame: &SegmentFrame, horizon_start: usize) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(ForecastError::UnfittedModel(
                "moving average must be fitted before predict".to_string(),
            ));
        }
        let context = self.config.context_length();
        if horizon_start < context {
            return Err(ForecastError::DataError(format!(
                "segment '{}' needs {} rows of history, has {}",
                frame.segment(),
                context,
                horizon_start
            )));
        }

        let mut series = frame.target()?.to_vec();
        for t in horizon_start..series.len() {
            series[t] = self.lagged_mean(&series, t);
        }

        Ok(Array1::from(series.split_off(horizon_start)))
    }

    fn predict_quantiles(
        &self,
        frame: &SegmentFrame,
        horizon_start: usize,
        quantiles: &[f64],
    ) -> Result<Array2<f64>> {
        let point = self.predict(frame, horizon_start)?;
        if self.residuals.is_empty() {
            return Err(ForecastError::DataError(format!(
                "segment '{}' needs more than {} fitted rows to estimate prediction intervals",
                frame.segment(),
                self.config.context_length()
            )));
        }

        let mut bands = Array2::from_elem((point.len(), quantiles.len()), f64::NAN);
        for (j, q) in quantiles.iter().enumerate() {
            let offset = empirical_quantile(&self.residuals, *q);
            for (h, value) in point.iter().enumerate() {
                bands[[h, j]] = value + offset * ((h + 1) as f64).sqrt();
            }
        }
        Ok(bands)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn name(&self) -> &'static str {
        "seasonal_moving_average"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TARGET;
    use chrono::{NaiveDate, NaiveDateTime};
    use ndarray::Array2;

    fn day(d: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(d as i64)
    }

    fn frame(values: &[f64]) -> SegmentFrame {
        SegmentFrame::new(
            "s1",
            (0..values.len()).map(day).collect(),
            vec![TARGET.to_string()],
            Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_naive_repeats_season() {
        let mut model = SeasonalMovingAverageModel::new(MovingAverageConfig::naive(3)).unwrap();
        model.fit(&frame(&[1.0, 2.0, 3.0])).unwrap();
        let nan = f64::NAN;
        let forecast = model
            .predict(&frame(&[1.0, 2.0, 3.0, nan, nan, nan, nan]), 3)
            .unwrap();
        assert_eq!(forecast.to_vec(), vec![1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_moving_average_is_recursive() {
        let mut model =
            SeasonalMovingAverageModel::new(MovingAverageConfig::moving_average(2)).unwrap();
        model.fit(&frame(&[2.0, 4.0])).unwrap();
        let forecast = model
            .predict(&frame(&[2.0, 4.0, f64::NAN, f64::NAN]), 2)
            .unwrap();
        // 3 = mean(2, 4); 3.5 = mean(4, 3)
        assert_eq!(forecast.to_vec(), vec![3.0, 3.5]);
    }

    #[test]
    fn test_short_history_rejected() {
        let mut model = SeasonalMovingAverageModel::new(MovingAverageConfig::new(2, 2)).unwrap();
        assert!(model.fit(&frame(&[1.0, 2.0, 3.0])).is_err());
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_unfitted_predict() {
        let model = SeasonalMovingAverageModel::new(MovingAverageConfig::default()).unwrap();
        assert!(matches!(
            model.predict(&frame(&[1.0]), 1),
            Err(ForecastError::UnfittedModel(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(SeasonalMovingAverageModel::new(MovingAverageConfig::new(0, 1)).is_err());
    }

    #[test]
    fn test_quantiles_from_residuals() {
        let mut model =
            SeasonalMovingAverageModel::new(MovingAverageConfig::moving_average(1)).unwrap();
        model.fit(&frame(&[1.0, 2.0, 4.0, 7.0])).unwrap();
        assert_eq!(model.residuals(), &[1.0, 2.0, 3.0]);

        let nan = f64::NAN;
        let bands = model
            .predict_quantiles(&frame(&[1.0, 2.0, 4.0, 7.0, nan, nan]), 4, &[0.25, 0.5])
            .unwrap();
        assert_eq!(bands.dim(), (2, 2));
        // point forecast is 7 for both steps; the second step widens by sqrt(2)
        assert!((bands[[0, 0]] - 8.5).abs() < 1e-12);
        assert!((bands[[0, 1]] - 9.0).abs() < 1e-12);
        assert!((bands[[1, 0]] - (7.0 + 1.5 * 2f64.sqrt())).abs() < 1e-12);
        assert!((bands[[1, 1]] - (7.0 + 2.0 * 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles_need_residuals() {
        let mut model = SeasonalMovingAverageModel::new(MovingAverageConfig::naive(2)).unwrap();
        model.fit(&frame(&[1.0, 2.0])).unwrap();
        assert!(matches!(
            model.predict_quantiles(&frame(&[1.0, 2.0, f64::NAN]), 2, &[0.5]),
            Err(ForecastError::DataError(_))
        ));
    }
}
