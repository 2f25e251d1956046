//! Per-segment view of a panel

use crate::error::{ForecastError, Result};
use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// One segment of a panel: every feature of that segment indexed by timestamp.
///
/// A frame is an owned copy. Editing it never touches the panel it came from;
/// changes are written back explicitly with [`Panel::update_segment`](super::Panel::update_segment).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFrame {
    segment: String,
    timestamps: Vec<NaiveDateTime>,
    features: Vec<String>,
    /// Values laid out as (time, feature), `NaN` marks a missing cell
    values: Array2<f64>,
}

impl SegmentFrame {
    /// Create a new frame, checking that `values` is `(timestamps, features)` shaped
    pub fn new(
        segment: impl Into<String>,
        timestamps: Vec<NaiveDateTime>,
        features: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        let expected = (timestamps.len(), features.len());
        if values.dim() != expected {
            return Err(ForecastError::ShapeError {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", values.dim()),
            });
        }

        Ok(Self {
            segment: segment.into(),
            timestamps,
            features,
            values,
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Number of rows (timestamps)
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Position of `feature` among the frame's columns
    pub fn feature_index(&self, feature: &str) -> Result<usize> {
        self.features
            .iter()
            .position(|f| f == feature)
            .ok_or_else(|| ForecastError::FeatureNotFound {
                segment: self.segment.clone(),
                feature: feature.to_string(),
            })
    }

    /// View of a single column
    pub fn column(&self, feature: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.feature_index(feature)?;
        Ok(self.values.column(idx))
    }

    /// View of the `target` column
    pub fn target(&self) -> Result<ArrayView1<'_, f64>> {
        self.column(super::TARGET)
    }

    /// Replace a column, or append it when the frame has no such feature
    pub fn set_column(&mut self, feature: &str, column: ArrayView1<'_, f64>) -> Result<()> {
        if column.len() != self.len() {
            return Err(ForecastError::ShapeError {
                expected: format!("column of length {}", self.len()),
                actual: format!("column of length {}", column.len()),
            });
        }

        match self.features.iter().position(|f| f == feature) {
            Some(idx) => self.values.column_mut(idx).assign(&column),
            None => {
                self.values.push_column(column)?;
                self.features.push(feature.to_string());
            }
        }
        Ok(())
    }

    /// Copy of the frame with `feature` replaced (or appended)
    pub fn with_column(&self, feature: &str, column: Array1<f64>) -> Result<Self> {
        let mut frame = self.clone();
        frame.set_column(feature, column.view())?;
        Ok(frame)
    }

    /// Copy of the frame without the rows holding any missing value
    pub fn drop_missing(&self) -> Self {
        let keep: Vec<usize> = self
            .values
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(i, _)| i)
            .collect();

        Self {
            segment: self.segment.clone(),
            timestamps: keep.iter().map(|&i| self.timestamps[i]).collect(),
            features: self.features.clone(),
            values: self.values.select(Axis(0), &keep),
        }
    }

    /// Index of the last non-missing value of `feature`, if any
    pub fn last_observed_index(&self, feature: &str) -> Result<Option<usize>> {
        let column = self.column(feature)?;
        Ok(column.iter().rposition(|v| !v.is_nan()))
    }
}
