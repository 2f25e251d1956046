//! Missing value imputation for time series
//!
//! Each segment gets its own [`OneSegmentImputer`]. Fitting records the exact
//! timestamps that were missing in the fitted series; transform and inverse
//! transform only ever touch those timestamps, so values missing for the first
//! time at inference are never fabricated and the fill is exactly reversible.

use super::{OneSegmentTransform, PerSegmentWrapper, Transform};
use crate::dataset::{Panel, SegmentFrame, TARGET};
use crate::error::{ForecastError, Result};
use chrono::NaiveDateTime;
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Strategy for filling missing timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputerStrategy {
    /// Replace with a configured constant
    Constant,
    /// Replace with the mean of the fitted series
    Mean,
    /// Replace with the last preceding observed value
    ForwardFill,
    /// Replace with the mean of the preceding `window` values
    RunningMean,
    /// Replace with the mean of the same phase in the preceding `window` cycles
    Seasonal,
}

impl ImputerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImputerStrategy::Constant => "constant",
            ImputerStrategy::Mean => "mean",
            ImputerStrategy::ForwardFill => "forward_fill",
            ImputerStrategy::RunningMean => "running_mean",
            ImputerStrategy::Seasonal => "seasonal",
        }
    }
}

impl fmt::Display for ImputerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImputerStrategy {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(ImputerStrategy::Constant),
            "mean" => Ok(ImputerStrategy::Mean),
            "forward_fill" => Ok(ImputerStrategy::ForwardFill),
            "running_mean" => Ok(ImputerStrategy::RunningMean),
            "seasonal" => Ok(ImputerStrategy::Seasonal),
            other => Err(ForecastError::ConfigError(format!(
                "unknown imputer strategy '{other}', expected one of \
                 constant, mean, forward_fill, running_mean, seasonal"
            ))),
        }
    }
}

/// Configured fill values per strategy.
///
/// Only strategies filling with a preset value have an entry; the others
/// compute their fill from the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillValueTable {
    /// Fill value of [`ImputerStrategy::Constant`]
    pub constant: f64,
}

impl Default for FillValueTable {
    fn default() -> Self {
        Self { constant: 0.0 }
    }
}

impl FillValueTable {
    /// Preset fill value for `strategy`
    pub fn get(&self, strategy: ImputerStrategy) -> Option<f64> {
        match strategy {
            ImputerStrategy::Constant => Some(self.constant),
            _ => None,
        }
    }
}

/// Imputer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputerConfig {
    /// Column to fill
    pub in_column: String,
    /// Filling strategy
    pub strategy: ImputerStrategy,
    /// Number of lookback occurrences for running mean / seasonal, -1 = all history
    pub window: i64,
    /// Distance between lookback occurrences
    pub seasonality: usize,
    /// Value for cells the strategy could not fill
    pub default_value: Option<f64>,
    /// Preset fill values
    pub fill_values: FillValueTable,
}

impl Default for ImputerConfig {
    fn default() -> Self {
        Self {
            in_column: TARGET.to_string(),
            strategy: ImputerStrategy::Constant,
            window: -1,
            seasonality: 1,
            default_value: None,
            fill_values: FillValueTable::default(),
        }
    }
}

impl ImputerConfig {
    /// Create a configuration for `strategy` with default values elsewhere
    pub fn new(strategy: ImputerStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Builder method to set the column to fill
    pub fn with_in_column(mut self, column: &str) -> Self {
        self.in_column = column.to_string();
        self
    }

    /// Builder method to set the lookback window
    pub fn with_window(mut self, window: i64) -> Self {
        self.window = window;
        self
    }

    /// Builder method to set the seasonality
    pub fn with_seasonality(mut self, seasonality: usize) -> Self {
        self.seasonality = seasonality;
        self
    }

    /// Builder method to set the value used for cells left missing
    pub fn with_default_value(mut self, value: f64) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Builder method to set the constant strategy's fill value
    pub fn with_constant(mut self, value: f64) -> Self {
        self.fill_values.constant = value;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window != -1 && self.window <= 0 {
            return Err(ForecastError::ConfigError(format!(
                "imputer window must be -1 or positive, got {}",
                self.window
            )));
        }
        if self.seasonality == 0 {
            return Err(ForecastError::ConfigError(
                "imputer seasonality must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ImputerState {
    Unfitted,
    Fitted {
        fill_value: Option<f64>,
        nan_timestamps: BTreeSet<NaiveDateTime>,
    },
}

/// Imputer for one segment's series.
///
/// Assumes the series starts at its first observed value: leading missing
/// values are not imputed.
#[derive(Debug, Clone)]
pub struct OneSegmentImputer {
    config: ImputerConfig,
    state: ImputerState,
}

impl OneSegmentImputer {
    pub fn new(config: ImputerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: ImputerState::Unfitted,
        })
    }

    pub fn config(&self) -> &ImputerConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, ImputerState::Fitted { .. })
    }

    /// Timestamps missing at fit time
    pub fn nan_timestamps(&self) -> Option<&BTreeSet<NaiveDateTime>> {
        match &self.state {
            ImputerState::Fitted { nan_timestamps, .. } => Some(nan_timestamps),
            ImputerState::Unfitted => None,
        }
    }

    /// Fill value learned at fit time (constant and mean strategies)
    pub fn fill_value(&self) -> Option<f64> {
        match &self.state {
            ImputerState::Fitted { fill_value, .. } => *fill_value,
            ImputerState::Unfitted => None,
        }
    }

    fn fitted_state(&self, frame: &SegmentFrame) -> Result<(Option<f64>, &BTreeSet<NaiveDateTime>)> {
        match &self.state {
            ImputerState::Fitted {
                fill_value,
                nan_timestamps,
            } => Ok((*fill_value, nan_timestamps)),
            ImputerState::Unfitted => Err(ForecastError::UnfittedTransform(format!(
                "imputer for segment '{}', column '{}' must be fitted first",
                frame.segment(),
                self.config.in_column
            ))),
        }
    }

    fn fill(
        &self,
        timestamps: &[NaiveDateTime],
        mut series: Array1<f64>,
        fill_value: Option<f64>,
        nan_timestamps: &BTreeSet<NaiveDateTime>,
    ) -> Array1<f64> {
        match self.config.strategy {
            ImputerStrategy::Constant | ImputerStrategy::Mean => {
                if let Some(value) = fill_value {
                    series.mapv_inplace(|v| if v.is_nan() { value } else { v });
                }
            }
            ImputerStrategy::ForwardFill => {
                let mut last = f64::NAN;
                for v in series.iter_mut() {
                    if v.is_nan() {
                        *v = last;
                    } else {
                        last = *v;
                    }
                }
            }
            ImputerStrategy::RunningMean | ImputerStrategy::Seasonal => {
                let seasonality = self.config.seasonality;
                let history = if self.config.window == -1 {
                    series.len()
                } else {
                    seasonality * self.config.window as usize
                };
                // In time order, so earlier fills feed later lookbacks.
                // Cells observed again since fit are kept.
                for timestamp in nan_timestamps {
                    if let Ok(i) = timestamps.binary_search(timestamp) {
                        if series[i].is_nan() {
                            series[i] = lookback_mean(&series, i, seasonality, history);
                        }
                    }
                }
            }
        }

        if let Some(default) = self.config.default_value {
            series.mapv_inplace(|v| if v.is_nan() { default } else { v });
        }
        series
    }
}

/// Mean of the observed values at `i - s`, `i - 2s`, ... within `history`.
///
/// Positions before the start of the series are skipped, never wrapped.
/// Returns `NaN` when no observed value is found.
fn lookback_mean(series: &Array1<f64>, i: usize, seasonality: usize, history: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut offset = seasonality;
    while offset < seasonality + history && offset <= i {
        let v = series[i - offset];
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
        offset += seasonality;
    }

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

impl OneSegmentTransform for OneSegmentImputer {
    fn fit(&mut self, frame: &SegmentFrame) -> Result<()> {
        let column = frame.column(&self.config.in_column)?;
        let first_valid = column
            .iter()
            .position(|v| !v.is_nan())
            .ok_or_else(|| ForecastError::EmptySeries {
                segment: frame.segment().to_string(),
                column: self.config.in_column.clone(),
            })?;

        let series = column.slice(s![first_valid..]);
        let nan_timestamps: BTreeSet<NaiveDateTime> = frame.timestamps()[first_valid..]
            .iter()
            .zip(series.iter())
            .filter(|(_, v)| v.is_nan())
            .map(|(t, _)| *t)
            .collect();

        let fill_value = match self.config.strategy {
            ImputerStrategy::Mean => {
                let (sum, count) = series
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
                Some(sum / count as f64)
            }
            strategy => self.config.fill_values.get(strategy),
        };

        debug!(
            segment = %frame.segment(),
            column = %self.config.in_column,
            strategy = %self.config.strategy,
            n_missing = nan_timestamps.len(),
            "Fitted imputer"
        );

        self.state = ImputerState::Fitted {
            fill_value,
            nan_timestamps,
        };
        Ok(())
    }

    fn transform(&self, frame: &SegmentFrame) -> Result<SegmentFrame> {
        let (fill_value, nan_timestamps) = self.fitted_state(frame)?;
        let column = frame.column(&self.config.in_column)?.to_owned();
        let was_missing: Vec<bool> = column.iter().map(|v| v.is_nan()).collect();

        let mut filled = self.fill(frame.timestamps(), column, fill_value, nan_timestamps);

        // Cells missing only now were never seen by fit
        for (i, (timestamp, missing)) in frame.timestamps().iter().zip(was_missing).enumerate() {
            if missing && !nan_timestamps.contains(timestamp) {
                filled[i] = f64::NAN;
            }
        }

        frame.with_column(&self.config.in_column, filled)
    }

    fn inverse_transform(&self, frame: &SegmentFrame) -> Result<SegmentFrame> {
        let (_, nan_timestamps) = self.fitted_state(frame)?;
        let mut column = frame.column(&self.config.in_column)?.to_owned();
        for (i, timestamp) in frame.timestamps().iter().enumerate() {
            if nan_timestamps.contains(timestamp) {
                column[i] = f64::NAN;
            }
        }
        frame.with_column(&self.config.in_column, column)
    }
}

/// Panel transform filling missing values of one column in every segment.
///
/// This transform can look ahead in `mean` mode: the fill value of a
/// timestamp uses the whole fitted series.
#[derive(Debug, Clone)]
pub struct TimeSeriesImputer {
    inner: PerSegmentWrapper<OneSegmentImputer>,
}

impl TimeSeriesImputer {
    pub fn new(config: ImputerConfig) -> Result<Self> {
        Ok(Self {
            inner: PerSegmentWrapper::new(OneSegmentImputer::new(config)?),
        })
    }

    /// Fitted imputer of one segment
    pub fn segment_imputer(&self, segment: &str) -> Option<&OneSegmentImputer> {
        self.inner.segment_transform(segment)
    }
}

impl Transform for TimeSeriesImputer {
    fn fit(&mut self, panel: &Panel) -> Result<()> {
        self.inner.fit(panel)
    }

    fn transform(&self, panel: &mut Panel) -> Result<()> {
        self.inner.transform(panel)
    }

    fn inverse_transform(&self, panel: &mut Panel) -> Result<()> {
        self.inner.inverse_transform(panel)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
