//! Recurrent sequence model for one segment
//!
//! A stack of LSTM layers with fixed, seeded weights encodes the window; only
//! the linear readout is trained, by ridge regression over the hidden states
//! seen with teacher forcing. Forecasting runs the [`AutoregressiveDecoder`]
//! block by block, `decoder_length` steps at a time.

use super::decoder::{AutoregressiveDecoder, RecurrentCell};
use super::lstm::LstmStack;
use super::sampler::{feature_order, make_samples, shifted_features, WindowConfig};
use crate::dataset::{SegmentFrame, TARGET};
use crate::error::{ForecastError, Result};
use crate::models::SegmentModel;
use crate::utils::linalg::ridge_fit;
use ndarray::{concatenate, s, Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// RNN model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RnnConfig {
    pub encoder_length: usize,
    pub decoder_length: usize,
    pub num_layers: usize,
    pub hidden_size: usize,
    /// L2 penalty of the readout
    pub ridge_alpha: f64,
    /// Seed of the recurrent weights, `None` for entropy
    pub random_state: Option<u64>,
}

impl Default for RnnConfig {
    fn default() -> Self {
        Self {
            encoder_length: 14,
            decoder_length: 7,
            num_layers: 2,
            hidden_size: 16,
            ridge_alpha: 1.0,
            random_state: Some(42),
        }
    }
}

impl RnnConfig {
    pub fn new(encoder_length: usize, decoder_length: usize) -> Self {
        Self {
            encoder_length,
            decoder_length,
            ..Self::default()
        }
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_ridge_alpha(mut self, alpha: f64) -> Self {
        self.ridge_alpha = alpha;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn window(&self) -> WindowConfig {
        WindowConfig {
            encoder_length: self.encoder_length,
            decoder_length: self.decoder_length,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.window().validate()?;
        if self.num_layers == 0 {
            return Err(ForecastError::ConfigError(
                "num_layers must be positive".to_string(),
            ));
        }
        if self.hidden_size == 0 {
            return Err(ForecastError::ConfigError(
                "hidden_size must be positive".to_string(),
            ));
        }
        if self.ridge_alpha.is_nan() || self.ridge_alpha < 0.0 {
            return Err(ForecastError::ConfigError(format!(
                "ridge_alpha must be non-negative, got {}",
                self.ridge_alpha
            )));
        }
        Ok(())
    }
}

/// Per-column location and scale; column 0 uses the target's statistics
#[derive(Debug, Clone)]
struct Scaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Scaler {
    fn fit(frame: &SegmentFrame, order: &[String]) -> Result<Self> {
        let mut mean = Array1::zeros(order.len());
        let mut scale = Array1::ones(order.len());
        for (j, feature) in order.iter().enumerate() {
            let column = frame.column(feature)?;
            let m = column.mean().unwrap_or(0.0);
            let sd = column.std(0.0);
            mean[j] = m;
            scale[j] = if sd.is_finite() && sd > 1e-12 { sd } else { 1.0 };
        }
        Ok(Self { mean, scale })
    }

    fn transform(&self, real: &Array2<f64>) -> Array2<f64> {
        (real - &self.mean) / &self.scale
    }

    fn target_from_scaled(&self, v: f64) -> f64 {
        v * self.scale[0] + self.mean[0]
    }
}

#[derive(Debug, Clone)]
struct FittedRnn {
    network: LstmStack,
    features: Vec<String>,
    scaler: Scaler,
}

/// LSTM-based forecaster for one segment
#[derive(Debug, Clone)]
pub struct RnnModel {
    config: RnnConfig,
    fitted: Option<FittedRnn>,
}

impl RnnModel {
    pub fn new(config: RnnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            fitted: None,
        })
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    fn fitted(&self) -> Result<&FittedRnn> {
        self.fitted.as_ref().ok_or_else(|| {
            ForecastError::UnfittedModel("RNN model must be fitted before predict".to_string())
        })
    }
}

/// Error for a missing cell the model cannot work around
fn missing_value(frame: &SegmentFrame, feature: &str, row: usize) -> ForecastError {
    ForecastError::DataError(format!(
        "segment '{}', column '{}' is missing at {}",
        frame.segment(),
        feature,
        frame.timestamps()[row]
    ))
}

impl SegmentModel for RnnModel {
    fn fit(&mut self, frame: &SegmentFrame) -> Result<()> {
        let window = self.config.window();
        let features = feature_order(frame)?;
        let scaler = Scaler::fit(frame, &features)?;

        let mut scaled = frame.clone();
        for (j, feature) in features.iter().enumerate() {
            let column = frame
                .column(feature)?
                .mapv(|v| (v - scaler.mean[j]) / scaler.scale[j]);
            scaled.set_column(feature, column.view())?;
        }

        let samples = make_samples(&scaled, &window)?;
        if samples.is_empty() {
            return Err(ForecastError::DataError(format!(
                "segment '{}' has {} rows, at least {} are needed",
                frame.segment(),
                frame.len(),
                window.total_length()
            )));
        }

        let mut rng = self.rng();
        let mut network = LstmStack::new(
            features.len(),
            self.config.hidden_size,
            self.config.num_layers,
            &mut rng,
        );

        // Teacher forcing: hidden states over encoder and decoder rows with
        // true previous targets, each paired with the value it should predict
        let steps_per_sample = window.total_length() - 1;
        let mut states: Vec<f64> =
            Vec::with_capacity(samples.len() * steps_per_sample * self.config.hidden_size);
        let mut targets: Vec<f64> = Vec::with_capacity(samples.len() * steps_per_sample);
        for sample in &samples {
            let rows = concatenate(
                Axis(0),
                &[sample.encoder_real.view(), sample.decoder_real.view()],
            )?;
            let mut hidden = network.initial_hidden();
            for row in rows.rows() {
                hidden = network.step(&hidden, row);
                if let Some(h) = network.output(&hidden) {
                    states.extend(h.iter());
                }
            }
            targets.extend(sample.encoder_target.iter());
            targets.extend(sample.decoder_target.iter());
        }

        let x = Array2::from_shape_vec((targets.len(), self.config.hidden_size), states)?;
        let y = Array1::from(targets);
        let (readout, intercept) = ridge_fit(&x, &y, self.config.ridge_alpha)?;
        network.set_readout(readout, intercept);

        debug!(
            segment = %frame.segment(),
            n_samples = samples.len(),
            n_features = features.len(),
            "Fitted RNN readout"
        );

        self.fitted = Some(FittedRnn {
            network,
            features,
            scaler,
        });
        Ok(())
    }

    fn predict(&self, frame: &SegmentFrame, horizon_start: usize) -> Result<Array1<f64>> {
        let fitted = self.fitted()?;
        let e = self.config.encoder_length;
        let d = self.config.decoder_length;

        if horizon_start >= frame.len() {
            return Ok(Array1::zeros(0));
        }
        if horizon_start < e {
            return Err(ForecastError::DataError(format!(
                "segment '{}' needs {} observed rows before the horizon, has {}",
                frame.segment(),
                e,
                horizon_start
            )));
        }

        let context_start = horizon_start - e;
        let target = frame.target()?;
        if let Some(row) = (context_start..horizon_start).find(|&t| target[t].is_nan()) {
            return Err(missing_value(frame, TARGET, row));
        }
        for feature in fitted.features.iter().skip(1) {
            let column = frame.column(feature)?;
            if let Some(row) = (context_start + 1..frame.len()).find(|&t| column[t].is_nan()) {
                return Err(missing_value(frame, feature, row));
            }
        }

        let mut real = fitted.scaler.transform(&shifted_features(frame, &fitted.features)?);
        let mut predictions = Vec::with_capacity(frame.len() - horizon_start);

        let mut block_start = horizon_start;
        while block_start < frame.len() {
            let n = d.min(frame.len() - block_start);
            let encoder = real.slice(s![block_start + 1 - e..block_start, ..]);
            let decoder_rows = real.slice(s![block_start..block_start + n, ..]).to_owned();

            let decoded = AutoregressiveDecoder::new(&fitted.network, decoder_rows)?.run(encoder)?;

            for (k, value) in decoded.iter().enumerate() {
                predictions.push(fitted.scaler.target_from_scaled(*value));
                // Next block's context sees this prediction as previous target
                if block_start + k + 1 < frame.len() {
                    real[[block_start + k + 1, 0]] = *value;
                }
            }
            block_start += n;
        }

        debug!(
            segment = %frame.segment(),
            horizon = predictions.len(),
            "RNN forecast"
        );
        Ok(Array1::from(predictions))
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn name(&self) -> &'static str {
        "rnn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(d: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(d as i64)
    }

    fn seasonal_frame(len: usize, observed: usize) -> SegmentFrame {
        let mut values = Array2::zeros((len, 1));
        for t in 0..len {
            values[[t, 0]] = if t < observed {
                10.0 + (t % 4) as f64
            } else {
                f64::NAN
            };
        }
        SegmentFrame::new("s1", (0..len).map(day).collect(), vec![TARGET.to_string()], values)
            .unwrap()
    }

    #[test]
    fn test_invalid_config() {
        assert!(RnnModel::new(RnnConfig::new(0, 2)).is_err());
        assert!(RnnModel::new(RnnConfig::new(3, 2).with_hidden_size(0)).is_err());
        assert!(RnnModel::new(RnnConfig::new(3, 2).with_ridge_alpha(-1.0)).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = RnnModel::new(RnnConfig::new(4, 2)).unwrap();
        let err = model.predict(&seasonal_frame(10, 8), 8).unwrap_err();
        assert!(matches!(err, ForecastError::UnfittedModel(_)));
    }

    #[test]
    fn test_too_short_series() {
        let mut model = RnnModel::new(RnnConfig::new(4, 2)).unwrap();
        let err = model.fit(&seasonal_frame(5, 5)).unwrap_err();
        assert!(matches!(err, ForecastError::DataError(_)));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_forecast_spans_several_blocks() {
        let mut model = RnnModel::new(RnnConfig::new(8, 3).with_hidden_size(8)).unwrap();
        model.fit(&seasonal_frame(60, 60)).unwrap();

        let frame = seasonal_frame(67, 60);
        let forecast = model.predict(&frame, 60).unwrap();
        assert_eq!(forecast.len(), 7);
        assert!(forecast.iter().all(|v| v.is_finite()));
        // the readout keeps forecasts near the series' level
        assert!(forecast.iter().all(|v| *v > 0.0 && *v < 25.0));
    }

    #[test]
    fn test_seeded_models_agree() {
        let train = seasonal_frame(40, 40);
        let future = seasonal_frame(43, 40);
        let mut a = RnnModel::new(RnnConfig::new(6, 3)).unwrap();
        let mut b = RnnModel::new(RnnConfig::new(6, 3)).unwrap();
        a.fit(&train).unwrap();
        b.fit(&train).unwrap();
        assert_eq!(a.predict(&future, 40).unwrap(), b.predict(&future, 40).unwrap());
    }
}
