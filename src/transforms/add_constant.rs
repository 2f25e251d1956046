//! Additive shift of one column

use super::Transform;
use crate::dataset::{is_quantile_column, Panel, TARGET};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Adds a constant to a column in every segment.
///
/// In place mode overwrites the column and is reversible; otherwise the
/// result goes to a new column and inversion leaves the panel untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddConstTransform {
    in_column: String,
    value: f64,
    inplace: bool,
    out_column: Option<String>,
}

impl AddConstTransform {
    /// Shift `in_column` by `value` in place
    pub fn new(in_column: &str, value: f64) -> Self {
        Self {
            in_column: in_column.to_string(),
            value,
            inplace: true,
            out_column: None,
        }
    }

    /// Write the result to `out_column` instead of overwriting the input
    pub fn with_out_column(mut self, out_column: &str) -> Self {
        self.inplace = false;
        self.out_column = Some(out_column.to_string());
        self
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    /// Name of the column written by [`Transform::transform`]
    pub fn output_column(&self) -> String {
        match (&self.out_column, self.inplace) {
            (_, true) => self.in_column.clone(),
            (Some(name), false) => name.clone(),
            (None, false) => format!("{}_add_{}", self.in_column, self.value),
        }
    }

    fn shift(&self, panel: &mut Panel, columns: &[String], delta: f64) -> Result<()> {
        for segment in panel.segments().to_vec() {
            let mut frame = panel.segment_view(&segment)?;
            for (source, destination) in columns.iter().zip(self.destinations(columns)) {
                let shifted = frame.column(source)?.mapv(|v| v + delta);
                frame.set_column(&destination, shifted.view())?;
            }
            panel.update_segment(&frame)?;
        }
        Ok(())
    }

    fn destinations(&self, columns: &[String]) -> Vec<String> {
        if self.inplace {
            columns.to_vec()
        } else {
            vec![self.output_column()]
        }
    }
}

impl Transform for AddConstTransform {
    fn fit(&mut self, _panel: &Panel) -> Result<()> {
        Ok(())
    }

    fn transform(&self, panel: &mut Panel) -> Result<()> {
        debug!(
            column = %self.in_column,
            value = self.value,
            output = %self.output_column(),
            "Adding constant"
        );
        self.shift(panel, &[self.in_column.clone()], self.value)
    }

    fn inverse_transform(&self, panel: &mut Panel) -> Result<()> {
        if !self.inplace {
            return Ok(());
        }

        let mut columns = vec![self.in_column.clone()];
        if self.in_column == TARGET {
            columns.extend(
                panel
                    .features()
                    .iter()
                    .filter(|f| is_quantile_column(f))
                    .cloned(),
            );
        }
        self.shift(panel, &columns, -self.value)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
