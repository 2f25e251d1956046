//! One model per segment
//!
//! [`PerSegmentModel`] fits an independent model instance on every segment of
//! a panel and merges their forecasts back into a copy of the panel.

use super::{ModelFactory, SegmentModel};
use crate::dataset::{quantile_column, validate_quantiles, Panel, SegmentFrame, TARGET};
use crate::error::{ForecastError, Result};
use crate::utils::parallel;
use chrono::NaiveDateTime;
use ndarray::Array1;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Predictions of one segment, labelled by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentForecast {
    pub segment: String,
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Array1<f64>,
    /// Quantile forecasts aligned with `timestamps`, empty without intervals
    pub quantiles: Vec<(f64, Array1<f64>)>,
}

/// Orchestrates independent per-segment models
#[derive(Debug)]
pub struct PerSegmentModel {
    factory: Box<dyn ModelFactory>,
    models: Option<BTreeMap<String, Box<dyn SegmentModel>>>,
    n_jobs: Option<usize>,
}

impl PerSegmentModel {
    pub fn new<F: ModelFactory + 'static>(factory: F) -> Self {
        Self {
            factory: Box::new(factory),
            models: None,
            n_jobs: None,
        }
    }

    /// Bound the number of worker threads used for fit and forecast
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.models.is_some()
    }

    /// Fitted segments, in lexical order
    pub fn segments(&self) -> Vec<&str> {
        self.models
            .as_ref()
            .map(|models| models.keys().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Fitted model of one segment
    pub fn model(&self, segment: &str) -> Option<&dyn SegmentModel> {
        self.models
            .as_ref()
            .and_then(|models| models.get(segment))
            .map(|m| m.as_ref())
    }

    /// Fit a fresh model on every segment.
    ///
    /// Each model sees its segment with every row holding a missing value
    /// dropped. On failure the previous fit, if any, is kept.
    pub fn fit(&mut self, panel: &Panel) -> Result<()> {
        if panel.n_segments() == 0 {
            return Err(ForecastError::ConfigError(
                "cannot fit per-segment models on a panel without segments".to_string(),
            ));
        }

        info!(
            n_segments = panel.n_segments(),
            n_timestamps = panel.n_timestamps(),
            "Fitting per-segment models"
        );

        let views = panel
            .segments()
            .iter()
            .map(|segment| panel.segment_view(segment))
            .collect::<Result<Vec<_>>>()?;

        let factory = &self.factory;
        let models = parallel::install(self.n_jobs, || {
            views
                .into_par_iter()
                .map(|view| {
                    let mut model = factory.make_model()?;
                    let cleaned = view.drop_missing();
                    debug!(
                        segment = %view.segment(),
                        model = model.name(),
                        n_rows = cleaned.len(),
                        "Fitting segment model"
                    );
                    model.fit(&cleaned)?;
                    Ok((view.segment().to_string(), model))
                })
                .collect::<Result<BTreeMap<_, _>>>()
        })??;

        self.models = Some(models);
        Ok(())
    }

    /// Forecast every fitted segment over the rows after its last observed
    /// target.
    ///
    /// Returns a copy of `panel` with the predictions merged into the target
    /// column and every registered transform inverted, newest first.
    pub fn forecast(&self, panel: &Panel) -> Result<Panel> {
        self.forecast_with_intervals(panel, &[])
    }

    /// Like [`forecast`](Self::forecast), also writing a `target_<q>` column
    /// for every requested quantile.
    ///
    /// Every fitted model must support prediction intervals when `quantiles`
    /// is not empty. Quantile columns are inverse transformed together with
    /// the target.
    pub fn forecast_with_intervals(&self, panel: &Panel, quantiles: &[f64]) -> Result<Panel> {
        let models = self.models.as_ref().ok_or_else(|| {
            ForecastError::UnfittedModel(
                "per-segment model must be fitted before forecast".to_string(),
            )
        })?;
        validate_quantiles(quantiles)?;

        for segment in panel.segments() {
            if !models.contains_key(segment) {
                warn!(segment = %segment, "Segment has no fitted model, left unchanged");
            }
        }

        let forecasts = parallel::install(self.n_jobs, || {
            models
                .par_iter()
                .map(|(segment, model)| {
                    let view = panel.segment_view(segment)?;
                    forecast_segment(model.as_ref(), &view, quantiles)
                })
                .collect::<Result<Vec<_>>>()
        })??;

        let mut result = panel.clone();
        merge_forecasts(&mut result, &forecasts)?;
        result.inverse_transform()?;

        info!(
            n_segments = forecasts.len(),
            horizon = forecasts.iter().map(|f| f.values.len()).max().unwrap_or(0),
            n_quantiles = quantiles.len(),
            "Forecast complete"
        );
        Ok(result)
    }
}

fn forecast_segment(
    model: &dyn SegmentModel,
    view: &SegmentFrame,
    quantiles: &[f64],
) -> Result<SegmentForecast> {
    let horizon_start = view
        .last_observed_index(TARGET)?
        .map(|i| i + 1)
        .unwrap_or(0);
    let horizon = view.len() - horizon_start;
    let values = model.predict(view, horizon_start)?;
    if values.len() != horizon {
        return Err(ForecastError::ShapeError {
            expected: format!("{} predictions", horizon),
            actual: format!("{} predictions for segment '{}'", values.len(), view.segment()),
        });
    }

    let quantiles = if quantiles.is_empty() {
        Vec::new()
    } else {
        let bands = model.predict_quantiles(view, horizon_start, quantiles)?;
        if bands.dim() != (horizon, quantiles.len()) {
            return Err(ForecastError::ShapeError {
                expected: format!("({}, {}) quantile predictions", horizon, quantiles.len()),
                actual: format!("{:?} for segment '{}'", bands.dim(), view.segment()),
            });
        }
        quantiles
            .iter()
            .zip(bands.columns())
            .map(|(q, band)| (*q, band.to_owned()))
            .collect()
    };

    debug!(
        segment = %view.segment(),
        horizon = values.len(),
        "Forecast segment"
    );

    Ok(SegmentForecast {
        segment: view.segment().to_string(),
        timestamps: view.timestamps()[horizon_start..].to_vec(),
        values,
        quantiles,
    })
}

/// Merge predictions into the panel's target column.
///
/// A non-missing prediction replaces the panel's value for its (timestamp,
/// segment); every other cell is kept. Timestamps only present in the
/// predictions extend the time axis. Quantile forecasts go to `target_<q>`
/// columns, added on first use.
pub fn merge_forecasts(panel: &mut Panel, forecasts: &[SegmentForecast]) -> Result<()> {
    panel.extend_timestamps(
        forecasts
            .iter()
            .flat_map(|f| f.timestamps.iter().copied()),
    );

    for forecast in forecasts {
        if forecast.timestamps.len() != forecast.values.len() {
            return Err(ForecastError::ShapeError {
                expected: format!("{} values", forecast.timestamps.len()),
                actual: format!(
                    "{} values for segment '{}'",
                    forecast.values.len(),
                    forecast.segment
                ),
            });
        }
        panel.segment_index(&forecast.segment)?;
        merge_column(panel, forecast, TARGET, &forecast.values)?;

        for (q, band) in &forecast.quantiles {
            if band.len() != forecast.timestamps.len() {
                return Err(ForecastError::ShapeError {
                    expected: format!("{} values", forecast.timestamps.len()),
                    actual: format!(
                        "{} values for quantile {} of segment '{}'",
                        band.len(),
                        q,
                        forecast.segment
                    ),
                });
            }
            let column = quantile_column(*q);
            panel.add_feature(&column);
            merge_column(panel, forecast, &column, band)?;
        }
    }
    Ok(())
}

fn merge_column(
    panel: &mut Panel,
    forecast: &SegmentForecast,
    feature: &str,
    values: &Array1<f64>,
) -> Result<()> {
    for (timestamp, value) in forecast.timestamps.iter().zip(values.iter()) {
        if !value.is_nan() {
            panel.set(timestamp, &forecast.segment, feature, *value)?;
        }
    }
    Ok(())
}
