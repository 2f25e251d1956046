//! End-to-end forecasting pipeline
//!
//! Imputes the panel (optional), fits one model per segment, extends the
//! panel by the horizon and forecasts it.

use crate::config::ForecastConfig;
use crate::dataset::Panel;
use crate::error::{ForecastError, Result};
use crate::models::PerSegmentModel;
use crate::transforms::TimeSeriesImputer;
use std::time::Instant;
use tracing::info;

/// Fit/forecast driver built from a [`ForecastConfig`]
#[derive(Debug)]
pub struct ForecastPipeline {
    config: ForecastConfig,
    model: PerSegmentModel,
    /// Panel the models were fitted on, transforms included
    history: Option<Panel>,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        let mut model = PerSegmentModel::new(config.model.clone());
        if let Some(n_jobs) = config.n_jobs {
            model = model.with_n_jobs(n_jobs);
        }
        Ok(Self {
            config,
            model,
            history: None,
        })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.history.is_some()
    }

    /// Per-segment models, fitted or not
    pub fn model(&self) -> &PerSegmentModel {
        &self.model
    }

    /// Fit the pipeline on a copy of `panel`
    pub fn fit(&mut self, panel: &Panel) -> Result<()> {
        let start = Instant::now();
        let mut history = panel.clone();

        if let Some(imputer) = &self.config.imputer {
            info!(strategy = %imputer.strategy, column = %imputer.in_column, "Imputing panel");
            history.fit_transform(Box::new(TimeSeriesImputer::new(imputer.clone())?))?;
        }

        self.model.fit(&history)?;
        self.history = Some(history);

        info!(
            n_segments = panel.n_segments(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline fitted"
        );
        Ok(())
    }

    /// Forecast `horizon` steps past the fitted history.
    ///
    /// The result holds history and forecasts, with imputed history cells
    /// restored to missing, plus a `target_<q>` column per configured
    /// quantile.
    pub fn forecast(&self) -> Result<Panel> {
        let history = self.history.as_ref().ok_or_else(|| {
            ForecastError::UnfittedModel("pipeline must be fitted before forecast".to_string())
        })?;

        let future = history.make_future(self.config.horizon)?;
        let result = self
            .model
            .forecast_with_intervals(&future, &self.config.quantiles)?;

        info!(
            horizon = self.config.horizon,
            n_quantiles = self.config.quantiles.len(),
            "Pipeline forecast complete"
        );
        Ok(result)
    }

    /// Fit on `panel` and forecast it
    pub fn fit_forecast(&mut self, panel: &Panel) -> Result<Panel> {
        self.fit(panel)?;
        self.forecast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::dataset::TARGET;
    use crate::models::MovingAverageConfig;
    use crate::transforms::{ImputerConfig, ImputerStrategy};
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_forecast_before_fit() {
        let pipeline = ForecastPipeline::new(ForecastConfig::default()).unwrap();
        assert!(matches!(
            pipeline.forecast(),
            Err(ForecastError::UnfittedModel(_))
        ));
    }

    #[test]
    fn test_imputed_gap_is_restored() {
        let panel = Panel::builder((1..=4).map(day).collect())
            .target("a", vec![1.0, f64::NAN, 3.0, 4.0])
            .build()
            .unwrap();
        let config = ForecastConfig::new(ModelConfig::MovingAverage(MovingAverageConfig::naive(1)), 2)
            .with_imputer(ImputerConfig::new(ImputerStrategy::ForwardFill));

        let mut pipeline = ForecastPipeline::new(config).unwrap();
        let result = pipeline.fit_forecast(&panel).unwrap();

        assert_eq!(result.n_timestamps(), 6);
        assert!(result.get(&day(2), "a", TARGET).unwrap().is_nan());
        assert_eq!(result.get(&day(5), "a", TARGET), Some(4.0));
        assert_eq!(result.get(&day(6), "a", TARGET), Some(4.0));
    }

    #[test]
    fn test_configured_quantiles_are_forecast() {
        let panel = Panel::builder((1..=4).map(day).collect())
            .target("a", vec![1.0, f64::NAN, 3.0, 4.0])
            .build()
            .unwrap();
        let config = ForecastConfig::new(ModelConfig::MovingAverage(MovingAverageConfig::naive(1)), 2)
            .with_imputer(ImputerConfig::new(ImputerStrategy::ForwardFill))
            .with_quantiles(vec![0.5]);

        let result = ForecastPipeline::new(config)
            .unwrap()
            .fit_forecast(&panel)
            .unwrap();

        // residuals of [1, 1, 3, 4] are 0, 2, 1; their median is 1
        let column = crate::dataset::quantile_column(0.5);
        assert!(result.get(&day(4), "a", &column).unwrap().is_nan());
        assert_eq!(result.get(&day(5), "a", &column), Some(5.0));
        let second = result.get(&day(6), "a", &column).unwrap();
        assert!((second - (4.0 + 2f64.sqrt())).abs() < 1e-12);
    }
}
