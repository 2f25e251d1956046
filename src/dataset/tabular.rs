//! Round trip between a panel and its flat long-form table
//!
//! The long form has one row per (timestamp, segment) with a `timestamp`
//! column, a `segment` column and one `Float64` column per feature. Nulls are
//! missing values.

use super::{Panel, PanelBuilder};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const SEGMENT_COLUMN: &str = "segment";

impl Panel {
    /// Build a panel from a long-form `DataFrame`.
    ///
    /// The time axis is the sorted union of all timestamps; (timestamp,
    /// segment) pairs absent from the table become missing cells.
    pub fn from_long_frame(df: &DataFrame) -> Result<Panel> {
        let timestamps = timestamp_column(df)?;
        let segments = segment_column(df)?;

        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != TIMESTAMP_COLUMN && name.as_str() != SEGMENT_COLUMN)
            .map(|s| s.to_string())
            .collect();

        let feature_data: Vec<Vec<f64>> = feature_names
            .iter()
            .map(|name| {
                let column = df.column(name)?.cast(&DataType::Float64)?;
                let values: Vec<f64> = column
                    .f64()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect();
                Ok(values)
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let axis: Vec<NaiveDateTime> = timestamps
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut seen: BTreeSet<(usize, &str)> = BTreeSet::new();
        let mut columns: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for (row, (timestamp, segment)) in timestamps.iter().zip(&segments).enumerate() {
            let t = axis.binary_search(timestamp).map_err(|_| {
                ForecastError::DataError(format!("timestamp {timestamp} missing from axis"))
            })?;
            if !seen.insert((t, segment.as_str())) {
                return Err(ForecastError::DataError(format!(
                    "duplicate row for segment '{segment}' at {timestamp}"
                )));
            }
            for (name, data) in feature_names.iter().zip(&feature_data) {
                let column = columns
                    .entry((segment.clone(), name.clone()))
                    .or_insert_with(|| vec![f64::NAN; axis.len()]);
                column[t] = data[row];
            }
        }

        columns
            .into_iter()
            .fold(PanelBuilder::new(axis), |builder, ((segment, feature), values)| {
                builder.series(&segment, &feature, values)
            })
            .build()
    }

    /// Flatten the panel into long form, rows ordered by timestamp then segment
    pub fn to_long_frame(&self) -> Result<DataFrame> {
        let n_rows = self.n_timestamps() * self.n_segments();
        let mut timestamps: Vec<i64> = Vec::with_capacity(n_rows);
        let mut segments: Vec<&str> = Vec::with_capacity(n_rows);
        let mut features: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(n_rows); self.features().len()];

        for (t, timestamp) in self.timestamps().iter().enumerate() {
            for (s, segment) in self.segments().iter().enumerate() {
                timestamps.push(timestamp.and_utc().timestamp_millis());
                segments.push(segment.as_str());
                for (f, column) in features.iter_mut().enumerate() {
                    let v = self.values()[[t, s, f]];
                    column.push(if v.is_nan() { None } else { Some(v) });
                }
            }
        }

        let mut columns = Vec::with_capacity(self.features().len() + 2);
        columns.push(
            Column::new(TIMESTAMP_COLUMN.into(), timestamps)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        );
        columns.push(Column::new(SEGMENT_COLUMN.into(), segments));
        for (name, values) in self.features().iter().zip(features) {
            columns.push(Column::new(name.as_str().into(), values));
        }

        Ok(DataFrame::new(columns)?)
    }
}

fn timestamp_column(df: &DataFrame) -> Result<Vec<NaiveDateTime>> {
    let column = df.column(TIMESTAMP_COLUMN).map_err(|_| {
        ForecastError::DataError(format!("long frame has no '{TIMESTAMP_COLUMN}' column"))
    })?;

    let (raw, unit) = match column.dtype() {
        DataType::Datetime(unit, _) => (column.cast(&DataType::Int64)?, *unit),
        DataType::Int64 => (column.clone(), TimeUnit::Milliseconds),
        other => {
            return Err(ForecastError::DataError(format!(
                "column '{TIMESTAMP_COLUMN}' has unsupported dtype {other}"
            )))
        }
    };

    raw.i64()?
        .into_iter()
        .map(|v| {
            let v = v.ok_or_else(|| {
                ForecastError::DataError(format!("null in '{TIMESTAMP_COLUMN}' column"))
            })?;
            let datetime = match unit {
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(v)),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(v),
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(v),
            };
            datetime
                .map(|d| d.naive_utc())
                .ok_or_else(|| ForecastError::DataError(format!("timestamp {v} out of range")))
        })
        .collect()
}

fn segment_column(df: &DataFrame) -> Result<Vec<String>> {
    let column = df
        .column(SEGMENT_COLUMN)
        .map_err(|_| {
            ForecastError::DataError(format!("long frame has no '{SEGMENT_COLUMN}' column"))
        })?
        .cast(&DataType::String)?;

    column
        .str()?
        .into_iter()
        .map(|v| {
            v.map(|s| s.to_string()).ok_or_else(|| {
                ForecastError::DataError(format!("null in '{SEGMENT_COLUMN}' column"))
            })
        })
        .collect()
}
