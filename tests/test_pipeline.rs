//! Integration test: long-form data through the full forecasting pipeline

use kolosal_forecast::dataset::{SEGMENT_COLUMN, TIMESTAMP_COLUMN};
use kolosal_forecast::logging::{init_logging, DEFAULT_FILTER};
use kolosal_forecast::prelude::*;
use polars::prelude::*;

const DAY_MS: i64 = 86_400_000;

fn long_df() -> DataFrame {
    let mut timestamps = Vec::new();
    let mut segments = Vec::new();
    let mut targets = Vec::new();
    for t in 0..21i64 {
        for (segment, level) in [("east", 10.0), ("west", 50.0)] {
            timestamps.push(t * DAY_MS);
            segments.push(segment);
            // one gap per segment
            let missing = (segment == "east" && t == 9) || (segment == "west" && t == 16);
            targets.push(if missing { None } else { Some(level + (t % 7) as f64) });
        }
    }
    df!(
        TIMESTAMP_COLUMN => timestamps,
        SEGMENT_COLUMN => segments,
        TARGET => targets,
    )
    .unwrap()
}

#[test]
fn test_pipeline_long_form_round_trip() {
    init_logging(DEFAULT_FILTER);

    let panel = Panel::from_long_frame(&long_df()).unwrap();
    assert_eq!(panel.n_segments(), 2);
    assert_eq!(panel.n_timestamps(), 21);

    let config = ForecastConfig::new(ModelConfig::MovingAverage(MovingAverageConfig::naive(7)), 7)
        .with_imputer(ImputerConfig::new(ImputerStrategy::Seasonal).with_seasonality(7))
        .with_n_jobs(2);
    let mut pipeline = ForecastPipeline::new(config).unwrap();
    let forecast = pipeline.fit_forecast(&panel).unwrap();

    let out = forecast.to_long_frame().unwrap();
    assert_eq!(out.height(), 28 * 2);

    let target = out.column(TARGET).unwrap().f64().unwrap();
    // imputed gaps are missing again, forecasts are present
    assert_eq!(target.null_count(), 2);
    let last = forecast.timestamps()[27];
    assert_eq!(forecast.get(&last, "east", TARGET), Some(16.0));
    assert_eq!(forecast.get(&last, "west", TARGET), Some(56.0));
}

#[test]
fn test_seasonal_imputation_feeds_the_model() {
    let panel = Panel::from_long_frame(&long_df()).unwrap();
    let config = ForecastConfig::new(ModelConfig::MovingAverage(MovingAverageConfig::naive(7)), 7)
        .with_imputer(ImputerConfig::new(ImputerStrategy::Seasonal).with_seasonality(7));
    let forecast = ForecastPipeline::new(config)
        .unwrap()
        .fit_forecast(&panel)
        .unwrap();

    // west is missing at t = 16, its forecast at t = 23 repeats the imputed value
    let t23 = forecast.timestamps()[23];
    assert_eq!(forecast.get(&t23, "west", TARGET), Some(52.0));
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forecast.json");

    let config = ForecastConfig::new(ModelConfig::Rnn(RnnConfig::new(14, 7).with_random_state(7)), 7)
        .with_imputer(ImputerConfig::new(ImputerStrategy::ForwardFill));
    config.save(&path).unwrap();

    let loaded = ForecastConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"horizon": 0}"#).unwrap();
    assert!(matches!(
        ForecastConfig::load(&path),
        Err(ForecastError::ConfigError(_))
    ));

    assert!(matches!(
        ForecastConfig::load(dir.path().join("absent.json")),
        Err(ForecastError::IoError(_))
    ));
}
