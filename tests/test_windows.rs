//! Integration test: sequence windows, autoregressive decoding and the RNN model

use chrono::{Duration, NaiveDate, NaiveDateTime};
use kolosal_forecast::models::nn::RecurrentCell;
use kolosal_forecast::prelude::*;
use ndarray::{array, Array2, ArrayView1};

fn hour(h: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(h as i64)
}

fn panel_with_exog(len: usize) -> Panel {
    let target: Vec<f64> = (0..len).map(|t| (t as f64 * 0.5).sin() * 3.0 + 10.0).collect();
    let promo: Vec<f64> = (0..len).map(|t| (t % 3 == 0) as u8 as f64).collect();
    let price: Vec<f64> = (0..len).map(|t| 5.0 + t as f64 * 0.01).collect();
    Panel::builder((0..len).map(hour).collect())
        .target("a", target)
        .series("a", "promo", promo)
        .series("a", "price", price)
        .build()
        .unwrap()
}

#[test]
fn test_window_count_matches_length() {
    let panel = panel_with_exog(30);
    let frame = panel.segment_view("a").unwrap();
    for (e, d) in [(1, 1), (5, 3), (10, 10), (20, 11), (30, 1)] {
        let config = WindowConfig::new(e, d).unwrap();
        let expected = (30usize + 1).saturating_sub(e + d);
        assert_eq!(make_samples(&frame, &config).unwrap().iter().count(), expected);
    }
}

#[test]
fn test_target_column_is_previous_target() {
    let panel = panel_with_exog(12);
    let frame = panel.segment_view("a").unwrap();
    let target = frame.target().unwrap().to_owned();
    let set = make_samples(&frame, &WindowConfig::new(4, 3).unwrap()).unwrap();

    assert_eq!(set.features(), &["target", "price", "promo"]);
    for (start, sample) in set.iter().enumerate() {
        assert_eq!(sample.segment, "a");
        for (i, v) in sample.encoder_real.column(0).iter().enumerate() {
            assert_eq!(*v, target[start + i]);
        }
        for (i, v) in sample.decoder_real.column(0).iter().enumerate() {
            assert_eq!(*v, target[start + 3 + i]);
        }
        assert_eq!(sample.decoder_target[0], target[start + 4]);
        assert_eq!(sample.encoder_target.len(), 3);
    }
}

#[test]
fn test_short_series_has_no_windows() {
    let panel = panel_with_exog(6);
    let frame = panel.segment_view("a").unwrap();
    let set = make_samples(&frame, &WindowConfig::new(4, 3).unwrap()).unwrap();
    assert!(set.is_empty());
    assert!(set.iter().next().is_none());
}

/// Hidden state is the running sum of previous-target inputs
struct RunningSum;

impl RecurrentCell for RunningSum {
    type Hidden = f64;

    fn initial_hidden(&self) -> f64 {
        0.0
    }

    fn step(&self, hidden: &f64, input: ArrayView1<'_, f64>) -> f64 {
        hidden + input[0]
    }

    fn project(&self, hidden: &f64) -> f64 {
        hidden * 0.5
    }
}

#[test]
fn test_decoder_never_reads_future_targets() {
    // column 0 of rows 1.. holds "true" future targets that must be ignored
    let decoder_rows = array![[4.0, 1.0], [1000.0, 1.0], [2000.0, 1.0], [3000.0, 1.0]];
    let mut decoder = AutoregressiveDecoder::new(&RunningSum, decoder_rows).unwrap();
    decoder.consume_context(array![[2.0, 0.0], [2.0, 0.0]].view()).unwrap();

    let mut predictions = Vec::new();
    while !decoder.is_done() {
        predictions.push(decoder.step().unwrap());
    }

    assert_eq!(predictions.len(), 4);
    let fed = decoder.decoder_inputs();
    assert_eq!(fed[[0, 0]], 4.0);
    for i in 1..4 {
        assert_eq!(fed[[i, 0]], predictions[i - 1]);
    }
    // hidden: 4+4=8 -> 4; 8+4=12 -> 6; 12+6=18 -> 9; 18+9=27 -> 13.5
    assert_eq!(predictions, vec![4.0, 6.0, 9.0, 13.5]);
}

#[test]
fn test_decoder_run_matches_stepping() {
    let rows = Array2::from_elem((3, 1), 1.0);
    let context = array![[1.0]];
    let ran = AutoregressiveDecoder::new(&RunningSum, rows.clone())
        .unwrap()
        .run(context.view())
        .unwrap();

    let mut stepped = AutoregressiveDecoder::new(&RunningSum, rows).unwrap();
    stepped.consume_context(context.view()).unwrap();
    let manual: Vec<f64> = (0..3).map(|_| stepped.step().unwrap()).collect();
    assert_eq!(ran.to_vec(), manual);
}

#[test]
fn test_rnn_forecast_through_orchestrator() {
    let panel = panel_with_exog(80);
    let history = Panel::builder(panel.timestamps()[..72].to_vec())
        .target("a", panel.segment_view("a").unwrap().target().unwrap().slice(ndarray::s![..72]).to_vec())
        .build()
        .unwrap();

    let config = RnnConfig::new(12, 4).with_hidden_size(8).with_num_layers(1);
    let mut model = PerSegmentModel::new(ModelConfig::Rnn(config));
    model.fit(&history).unwrap();

    let result = model.forecast(&history.make_future(8).unwrap()).unwrap();
    assert_eq!(result.n_timestamps(), 80);
    for t in 72..80 {
        let v = result.get(&hour(t), "a", TARGET).unwrap();
        assert!(v.is_finite(), "forecast at {t} should be finite");
    }
    assert_eq!(
        result.get(&hour(10), "a", TARGET),
        history.get(&hour(10), "a", TARGET)
    );
}

#[test]
fn test_rnn_requires_future_exog() {
    let panel = panel_with_exog(40);
    let mut model = PerSegmentModel::new(ModelConfig::Rnn(RnnConfig::new(6, 2).with_hidden_size(4)));
    model.fit(&panel).unwrap();

    // extended rows have no promo/price values
    let err = model.forecast(&panel.make_future(2).unwrap()).unwrap_err();
    assert!(matches!(err, ForecastError::DataError(_)));
    assert!(err.to_string().contains("price"));
}

#[test]
fn test_rnn_has_no_prediction_intervals() {
    let panel = Panel::builder((0..40).map(hour).collect())
        .target("a", (0..40).map(|t| (t % 5) as f64).collect())
        .build()
        .unwrap();
    let mut model = PerSegmentModel::new(ModelConfig::Rnn(RnnConfig::new(6, 2).with_hidden_size(4)));
    model.fit(&panel).unwrap();

    let err = model
        .forecast_with_intervals(&panel.make_future(2).unwrap(), &[0.5])
        .unwrap_err();
    assert!(matches!(err, ForecastError::ConfigError(_)));
}
