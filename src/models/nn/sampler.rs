//! Sliding encoder/decoder windows over one segment
//!
//! The feature matrix of a window puts `target` first and the other features
//! after it in lexical order. Column 0 is the "previous target" slot: at
//! position `t` it holds the target at `t - 1`, so a row never carries the
//! value it is supposed to predict.

use crate::dataset::{SegmentFrame, TARGET};
use crate::error::{ForecastError, Result};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Lengths of the encoder (lookback) and decoder (predicted) spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub encoder_length: usize,
    pub decoder_length: usize,
}

impl WindowConfig {
    pub fn new(encoder_length: usize, decoder_length: usize) -> Result<Self> {
        let config = Self {
            encoder_length,
            decoder_length,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.encoder_length == 0 {
            return Err(ForecastError::ConfigError(
                "encoder_length must be positive".to_string(),
            ));
        }
        if self.decoder_length == 0 {
            return Err(ForecastError::ConfigError(
                "decoder_length must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Width of one full window
    pub fn total_length(&self) -> usize {
        self.encoder_length + self.decoder_length
    }
}

/// One training window
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Encoder features without the first position, shape `(E - 1, F)`
    pub encoder_real: Array2<f64>,
    /// Decoder features, shape `(D, F)`
    pub decoder_real: Array2<f64>,
    /// Targets aligned with `encoder_real`, length `E - 1`
    pub encoder_target: Array1<f64>,
    /// Targets aligned with `decoder_real`, length `D`
    pub decoder_target: Array1<f64>,
    pub segment: String,
}

/// Column order used by window matrices: target first, then the rest sorted
pub fn feature_order(frame: &SegmentFrame) -> Result<Vec<String>> {
    frame.feature_index(TARGET)?;
    let mut others: Vec<String> = frame
        .features()
        .iter()
        .filter(|f| f.as_str() != TARGET)
        .cloned()
        .collect();
    others.sort();

    let mut order = Vec::with_capacity(others.len() + 1);
    order.push(TARGET.to_string());
    order.extend(others);
    Ok(order)
}

/// Feature matrix of `frame` in [`feature_order`] with the target column
/// replaced by the previous target.
pub fn shifted_features(frame: &SegmentFrame, order: &[String]) -> Result<Array2<f64>> {
    let mut real = Array2::from_elem((frame.len(), order.len()), f64::NAN);
    for (j, feature) in order.iter().enumerate() {
        let column = frame.column(feature)?;
        if j == 0 {
            if frame.len() > 1 {
                real.slice_mut(s![1.., 0])
                    .assign(&column.slice(s![..frame.len() - 1]));
            }
        } else {
            real.column_mut(j).assign(&column);
        }
    }
    Ok(real)
}

/// All windows of one segment.
///
/// Holds the prepared feature matrix; windows are cut lazily by [`SampleSet::iter`],
/// which can be called any number of times.
#[derive(Debug, Clone)]
pub struct SampleSet {
    segment: String,
    features: Vec<String>,
    real: Array2<f64>,
    target: Array1<f64>,
    config: WindowConfig,
}

impl SampleSet {
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Column names of the window matrices
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Number of windows, `max(0, L - E - D + 1)`
    pub fn len(&self) -> usize {
        (self.target.len() + 1).saturating_sub(self.config.total_length())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Samples<'_> {
        Samples {
            set: self,
            start: 0,
            end: self.len(),
        }
    }

    fn sample_at(&self, start: usize) -> Sample {
        let e = self.config.encoder_length;
        let d = self.config.decoder_length;
        let boundary = start + e;

        Sample {
            encoder_real: self.real.slice(s![start + 1..boundary, ..]).to_owned(),
            decoder_real: self.real.slice(s![boundary..boundary + d, ..]).to_owned(),
            encoder_target: self.target.slice(s![start + 1..boundary]).to_owned(),
            decoder_target: self.target.slice(s![boundary..boundary + d]).to_owned(),
            segment: self.segment.clone(),
        }
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = Sample;
    type IntoIter = Samples<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the windows of a [`SampleSet`], stride 1 from offset 0
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    set: &'a SampleSet,
    start: usize,
    end: usize,
}

impl Iterator for Samples<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.start >= self.end {
            return None;
        }
        let sample = self.set.sample_at(self.start);
        self.start += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.start;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples<'_> {}

/// Cut one segment's series into encoder/decoder windows.
///
/// A series shorter than `E + D` yields no windows.
pub fn make_samples(frame: &SegmentFrame, config: &WindowConfig) -> Result<SampleSet> {
    config.validate()?;
    let features = feature_order(frame)?;
    let real = shifted_features(frame, &features)?;
    let target = frame.target()?.to_owned();

    Ok(SampleSet {
        segment: frame.segment().to_string(),
        features,
        real,
        target,
        config: *config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn frame(len: usize) -> SegmentFrame {
        let mut values = Array2::zeros((len, 2));
        for t in 0..len {
            values[[t, 0]] = 100.0 + t as f64;
            values[[t, 1]] = t as f64;
        }
        SegmentFrame::new(
            "s1",
            (0..len as u32).map(hour).collect(),
            vec!["exog".to_string(), TARGET.to_string()],
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_window_count() {
        let config = WindowConfig::new(3, 2).unwrap();
        assert_eq!(make_samples(&frame(10), &config).unwrap().len(), 6);
        assert_eq!(make_samples(&frame(5), &config).unwrap().len(), 1);
        assert!(make_samples(&frame(4), &config).unwrap().is_empty());
        assert_eq!(make_samples(&frame(4), &config).unwrap().iter().count(), 0);
    }

    #[test]
    fn test_zero_lengths_rejected() {
        assert!(matches!(
            WindowConfig::new(0, 2),
            Err(ForecastError::ConfigError(_))
        ));
        assert!(WindowConfig::new(2, 0).is_err());
    }

    #[test]
    fn test_sample_layout() {
        let config = WindowConfig::new(3, 2).unwrap();
        let set = make_samples(&frame(10), &config).unwrap();
        assert_eq!(set.features(), &[TARGET.to_string(), "exog".to_string()]);

        let sample = set.iter().nth(2).unwrap();
        assert_eq!(sample.encoder_real.dim(), (2, 2));
        assert_eq!(sample.decoder_real.dim(), (2, 2));
        // encoder covers positions 3, 4; decoder covers 5, 6
        assert_eq!(sample.encoder_target.to_vec(), vec![3.0, 4.0]);
        assert_eq!(sample.decoder_target.to_vec(), vec![5.0, 6.0]);
        assert_eq!(sample.encoder_real.column(0).to_vec(), vec![2.0, 3.0]);
        assert_eq!(sample.decoder_real.column(0).to_vec(), vec![4.0, 5.0]);
        assert_eq!(sample.decoder_real.column(1).to_vec(), vec![105.0, 106.0]);
        assert_eq!(sample.segment, "s1");
    }

    #[test]
    fn test_iteration_is_restartable() {
        let config = WindowConfig::new(2, 1).unwrap();
        let set = make_samples(&frame(6), &config).unwrap();
        let first: Vec<Sample> = set.iter().collect();
        let second: Vec<Sample> = set.iter().collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
        assert_eq!(set.iter().len(), 4);
    }
}
