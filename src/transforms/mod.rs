//! Panel transforms
//!
//! Provides reversible preprocessing applied to a [`Panel`]:
//! - Missing value imputation per segment ([`TimeSeriesImputer`])
//! - Additive shift of a column ([`AddConstTransform`])
//!
//! Stateful per-segment transforms implement [`OneSegmentTransform`] and are
//! lifted to whole panels by [`PerSegmentWrapper`], which keeps one fitted
//! instance per segment.

mod add_constant;
mod imputation;

pub use add_constant::AddConstTransform;
pub use imputation::{
    FillValueTable, ImputerConfig, ImputerStrategy, OneSegmentImputer, TimeSeriesImputer,
};

use crate::dataset::{Panel, SegmentFrame};
use crate::error::{ForecastError, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

/// Reversible transform over a whole panel
pub trait Transform: fmt::Debug + Send + Sync {
    /// Learn the transform's parameters from the panel
    fn fit(&mut self, panel: &Panel) -> Result<()>;

    /// Apply the transform in place
    fn transform(&self, panel: &mut Panel) -> Result<()>;

    /// Undo the transform in place
    fn inverse_transform(&self, panel: &mut Panel) -> Result<()>;

    /// Fit and transform in one step
    fn fit_transform(&mut self, panel: &mut Panel) -> Result<()> {
        self.fit(panel)?;
        self.transform(panel)
    }

    /// Clone into a new box, so panels holding transforms stay cloneable
    fn clone_box(&self) -> Box<dyn Transform>;
}

/// Transform operating on a single segment
pub trait OneSegmentTransform: fmt::Debug + Clone + Send + Sync {
    fn fit(&mut self, frame: &SegmentFrame) -> Result<()>;

    fn transform(&self, frame: &SegmentFrame) -> Result<SegmentFrame>;

    fn inverse_transform(&self, frame: &SegmentFrame) -> Result<SegmentFrame>;
}

/// Applies a copy of a [`OneSegmentTransform`] to every segment of a panel
#[derive(Debug, Clone)]
pub struct PerSegmentWrapper<T: OneSegmentTransform> {
    base: T,
    fitted: BTreeMap<String, T>,
}

impl<T: OneSegmentTransform> PerSegmentWrapper<T> {
    pub fn new(base: T) -> Self {
        Self {
            base,
            fitted: BTreeMap::new(),
        }
    }

    /// Fitted instance for `segment`, if any
    pub fn segment_transform(&self, segment: &str) -> Option<&T> {
        self.fitted.get(segment)
    }

    /// Run `op` on every segment's view, then write all results back.
    ///
    /// Nothing is written unless every segment succeeds.
    fn apply<F>(&self, panel: &mut Panel, op: F) -> Result<()>
    where
        F: Fn(&T, &SegmentFrame) -> Result<SegmentFrame> + Send + Sync,
    {
        let views = panel
            .segments()
            .iter()
            .map(|segment| panel.segment_view(segment))
            .collect::<Result<Vec<_>>>()?;

        let frames = views
            .par_iter()
            .map(|view| {
                let transform = self.fitted.get(view.segment()).ok_or_else(|| {
                    ForecastError::UnfittedTransform(format!(
                        "no fitted transform for segment '{}'",
                        view.segment()
                    ))
                })?;
                op(transform, view)
            })
            .collect::<Result<Vec<_>>>()?;

        for frame in &frames {
            panel.update_segment(frame)?;
        }
        Ok(())
    }
}

impl<T: OneSegmentTransform + 'static> Transform for PerSegmentWrapper<T> {
    fn fit(&mut self, panel: &Panel) -> Result<()> {
        let views = panel
            .segments()
            .iter()
            .map(|segment| panel.segment_view(segment))
            .collect::<Result<Vec<_>>>()?;

        let fitted = views
            .into_par_iter()
            .map(|view| {
                let mut transform = self.base.clone();
                transform.fit(&view)?;
                Ok((view.segment().to_string(), transform))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        self.fitted = fitted;
        Ok(())
    }

    fn transform(&self, panel: &mut Panel) -> Result<()> {
        self.apply(panel, |t, view| t.transform(view))
    }

    fn inverse_transform(&self, panel: &mut Panel) -> Result<()> {
        self.apply(panel, |t, view| t.inverse_transform(view))
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
