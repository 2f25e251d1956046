//! Panel dataset module
//!
//! A panel holds one time axis shared by many segments, each segment carrying
//! the same set of numeric features. Storage is a dense `(time, segment,
//! feature)` cube where `NaN` marks a missing cell, so every (segment, feature)
//! pair has a value for every timestamp.
//!
//! Segments and features are kept in lexical order; iteration order is time
//! ascending, then segment, then feature.

mod segment;
mod tabular;

pub use segment::SegmentFrame;
pub use tabular::{SEGMENT_COLUMN, TIMESTAMP_COLUMN};

use crate::error::{ForecastError, Result};
use crate::transforms::Transform;
use chrono::NaiveDateTime;
use ndarray::{s, Array2, Array3};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the feature every panel forecasts
pub const TARGET: &str = "target";

/// Column holding the `q` quantile of the target forecast, e.g. `target_0.975`
pub fn quantile_column(q: f64) -> String {
    format!("{TARGET}_{q}")
}

/// Whether `feature` is a target quantile column written by an interval forecast
pub fn is_quantile_column(feature: &str) -> bool {
    feature
        .strip_prefix(TARGET)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|q| q.parse::<f64>().ok())
        .is_some_and(|q| q > 0.0 && q < 1.0)
}

/// Check that every quantile lies strictly between 0 and 1
pub fn validate_quantiles(quantiles: &[f64]) -> Result<()> {
    match quantiles.iter().find(|q| !(**q > 0.0 && **q < 1.0)) {
        Some(q) => Err(ForecastError::invalid_parameter(
            "quantiles",
            q,
            "every quantile must lie in (0, 1)",
        )),
        None => Ok(()),
    }
}

/// Dense multi-segment time series container
#[derive(Debug)]
pub struct Panel {
    timestamps: Vec<NaiveDateTime>,
    segments: Vec<String>,
    features: Vec<String>,
    values: Array3<f64>,
    /// Fitted transforms in the order they were applied
    transforms: Vec<Box<dyn Transform>>,
}

impl Clone for Panel {
    fn clone(&self) -> Self {
        Self {
            timestamps: self.timestamps.clone(),
            segments: self.segments.clone(),
            features: self.features.clone(),
            values: self.values.clone(),
            transforms: self.transforms.iter().map(|t| t.clone_box()).collect(),
        }
    }
}

impl Panel {
    /// Create a panel from its axes and a `(time, segment, feature)` cube.
    ///
    /// Timestamps must be strictly increasing, segments and features strictly
    /// increasing in lexical order.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        segments: Vec<String>,
        features: Vec<String>,
        values: Array3<f64>,
    ) -> Result<Self> {
        if !timestamps.windows(2).all(|w| w[0] < w[1]) {
            return Err(ForecastError::DataError(
                "timestamps must be unique and sorted".to_string(),
            ));
        }
        if !segments.windows(2).all(|w| w[0] < w[1]) {
            return Err(ForecastError::DataError(
                "segments must be unique and sorted".to_string(),
            ));
        }
        if !features.windows(2).all(|w| w[0] < w[1]) {
            return Err(ForecastError::DataError(
                "features must be unique and sorted".to_string(),
            ));
        }

        let expected = (timestamps.len(), segments.len(), features.len());
        if values.dim() != expected {
            return Err(ForecastError::ShapeError {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", values.dim()),
            });
        }

        Ok(Self {
            timestamps,
            segments,
            features,
            values,
            transforms: Vec::new(),
        })
    }

    /// Start building a panel over the given time axis
    pub fn builder(timestamps: Vec<NaiveDateTime>) -> PanelBuilder {
        PanelBuilder::new(timestamps)
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn n_timestamps(&self) -> usize {
        self.timestamps.len()
    }

    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    /// Transforms applied to this panel, oldest first
    pub fn transforms(&self) -> &[Box<dyn Transform>] {
        &self.transforms
    }

    pub fn segment_index(&self, segment: &str) -> Result<usize> {
        self.segments
            .binary_search_by(|s| s.as_str().cmp(segment))
            .map_err(|_| ForecastError::SegmentNotFound(segment.to_string()))
    }

    fn feature_index(&self, segment: &str, feature: &str) -> Result<usize> {
        self.features
            .binary_search_by(|f| f.as_str().cmp(feature))
            .map_err(|_| ForecastError::FeatureNotFound {
                segment: segment.to_string(),
                feature: feature.to_string(),
            })
    }

    pub fn timestamp_index(&self, timestamp: &NaiveDateTime) -> Option<usize> {
        self.timestamps.binary_search(timestamp).ok()
    }

    /// Value of one cell, `None` when any key is absent from the panel
    pub fn get(&self, timestamp: &NaiveDateTime, segment: &str, feature: &str) -> Option<f64> {
        let t = self.timestamp_index(timestamp)?;
        let s = self.segment_index(segment).ok()?;
        let f = self.feature_index(segment, feature).ok()?;
        Some(self.values[[t, s, f]])
    }

    /// Overwrite one cell
    pub fn set(
        &mut self,
        timestamp: &NaiveDateTime,
        segment: &str,
        feature: &str,
        value: f64,
    ) -> Result<()> {
        let t = self.timestamp_index(timestamp).ok_or_else(|| {
            ForecastError::DataError(format!("timestamp {timestamp} is not on the panel's axis"))
        })?;
        let s = self.segment_index(segment)?;
        let f = self.feature_index(segment, feature)?;
        self.values[[t, s, f]] = value;
        Ok(())
    }

    /// Copy out one segment with all of its features
    pub fn segment_view(&self, segment: &str) -> Result<SegmentFrame> {
        let s = self.segment_index(segment)?;
        let values: Array2<f64> = self.values.slice(s![.., s, ..]).to_owned();
        SegmentFrame::new(
            segment,
            self.timestamps.clone(),
            self.features.clone(),
            values,
        )
    }

    /// Write a segment frame back into the panel.
    ///
    /// The frame must span the panel's full time axis. Features the panel does
    /// not have yet are added, filled with missing values for other segments.
    pub fn update_segment(&mut self, frame: &SegmentFrame) -> Result<()> {
        if frame.timestamps() != self.timestamps.as_slice() {
            return Err(ForecastError::ShapeError {
                expected: format!("{} timestamps matching the panel axis", self.timestamps.len()),
                actual: format!("{} timestamps for segment '{}'", frame.len(), frame.segment()),
            });
        }

        let s = self.segment_index(frame.segment())?;
        for feature in frame.features() {
            self.add_feature(feature);
        }
        for (i, feature) in frame.features().iter().enumerate() {
            let f = self.feature_index(frame.segment(), feature)?;
            self.values
                .slice_mut(s![.., s, f])
                .assign(&frame.values().column(i));
        }
        Ok(())
    }

    /// Add a feature column filled with missing values; no-op if it exists
    pub fn add_feature(&mut self, feature: &str) {
        if self.features.iter().any(|f| f == feature) {
            return;
        }
        let mut features = self.features.clone();
        features.push(feature.to_string());
        features.sort();
        self.values = self.reindexed(&self.timestamps, &features);
        self.features = features;
    }

    /// Union the time axis with `timestamps`; new rows are missing everywhere
    pub fn extend_timestamps<I>(&mut self, timestamps: I)
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let mut axis: BTreeSet<NaiveDateTime> = self.timestamps.iter().copied().collect();
        let before = axis.len();
        axis.extend(timestamps);
        if axis.len() == before {
            return;
        }
        let axis: Vec<NaiveDateTime> = axis.into_iter().collect();
        self.values = self.reindexed(&axis, &self.features);
        self.timestamps = axis;
    }

    /// Copy of the panel extended by `horizon` future steps.
    ///
    /// The step is the gap between the last two timestamps. Future cells are
    /// missing; registered transforms are carried over so forecasts can be
    /// inverse transformed.
    pub fn make_future(&self, horizon: usize) -> Result<Panel> {
        if horizon == 0 {
            return Err(ForecastError::invalid_parameter(
                "horizon",
                horizon,
                "must be positive",
            ));
        }
        let (prev, last) = match self.timestamps.as_slice() {
            [.., prev, last] => (*prev, *last),
            _ => {
                return Err(ForecastError::DataError(
                    "at least two timestamps are needed to infer the frequency".to_string(),
                ))
            }
        };

        let steps = i32::try_from(horizon).map_err(|_| {
            ForecastError::invalid_parameter(
                "horizon",
                horizon,
                "exceeds the supported number of steps",
            )
        })?;
        let step = last - prev;
        let timestamps = (1..=steps)
            .map(|k| {
                step.checked_mul(k)
                    .and_then(|offset| last.checked_add_signed(offset))
                    .ok_or_else(|| {
                        ForecastError::invalid_parameter(
                            "horizon",
                            horizon,
                            "runs past the last representable timestamp",
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut future = self.clone();
        future.extend_timestamps(timestamps);
        Ok(future)
    }

    /// Fit `transform` on the panel, apply it and register it for inversion
    pub fn fit_transform(&mut self, mut transform: Box<dyn Transform>) -> Result<()> {
        transform.fit(self)?;
        transform.transform(self)?;
        self.transforms.push(transform);
        Ok(())
    }

    /// Undo every registered transform, newest first.
    ///
    /// Transforms stay registered, so the panel can be transformed again.
    pub fn inverse_transform(&mut self) -> Result<()> {
        let transforms = std::mem::take(&mut self.transforms);
        let result = transforms
            .iter()
            .rev()
            .try_for_each(|t| t.inverse_transform(self));
        self.transforms = transforms;
        result
    }

    fn reindexed(&self, timestamps: &[NaiveDateTime], features: &[String]) -> Array3<f64> {
        let mut values = Array3::from_elem(
            (timestamps.len(), self.segments.len(), features.len()),
            f64::NAN,
        );
        let feature_map: Vec<Option<usize>> = self
            .features
            .iter()
            .map(|f| features.iter().position(|g| g == f))
            .collect();

        for (t_old, ts) in self.timestamps.iter().enumerate() {
            let Ok(t_new) = timestamps.binary_search(ts) else {
                continue;
            };
            for s in 0..self.segments.len() {
                for (f_old, f_new) in feature_map.iter().enumerate() {
                    if let Some(f_new) = f_new {
                        values[[t_new, s, *f_new]] = self.values[[t_old, s, f_old]];
                    }
                }
            }
        }
        values
    }
}

/// Builder assembling a dense panel from individual (segment, feature) series
#[derive(Debug, Clone)]
pub struct PanelBuilder {
    timestamps: Vec<NaiveDateTime>,
    columns: BTreeMap<(String, String), Vec<f64>>,
}

impl PanelBuilder {
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    /// Add one series; values are aligned with the builder's time axis
    pub fn series(mut self, segment: &str, feature: &str, values: Vec<f64>) -> Self {
        self.columns
            .insert((segment.to_string(), feature.to_string()), values);
        self
    }

    /// Add the `target` series of a segment
    pub fn target(self, segment: &str, values: Vec<f64>) -> Self {
        self.series(segment, TARGET, values)
    }

    /// Build the panel; (segment, feature) pairs never added are all missing
    pub fn build(self) -> Result<Panel> {
        let segments: Vec<String> = self
            .columns
            .keys()
            .map(|(s, _)| s.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let features: Vec<String> = self
            .columns
            .keys()
            .map(|(_, f)| f.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !segments.is_empty() && !features.iter().any(|f| f == TARGET) {
            return Err(ForecastError::ConfigError(format!(
                "panel has no '{TARGET}' feature"
            )));
        }

        let n = self.timestamps.len();
        let mut values = Array3::from_elem((n, segments.len(), features.len()), f64::NAN);
        for ((segment, feature), column) in &self.columns {
            if column.len() != n {
                return Err(ForecastError::ShapeError {
                    expected: format!("{n} values"),
                    actual: format!(
                        "{} values for segment '{segment}', feature '{feature}'",
                        column.len()
                    ),
                });
            }
            let s = segments.iter().position(|x| x == segment).unwrap_or_default();
            let f = features.iter().position(|x| x == feature).unwrap_or_default();
            for (t, v) in column.iter().enumerate() {
                values[[t, s, f]] = *v;
            }
        }

        Panel::new(self.timestamps, segments, features, values)
    }
}
