//! Fake fitting backends for reaching states the built-in fitter never
//! produces (negative or NaN variances, failing refits, other engines).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::DataFrame;
use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::fit::{Engine, FittedModel, MixedModelFitter, ModelHandle};
use crate::glmm::Family;
use crate::lmm::{NamedEffect, VarianceEstimate};
use crate::model::Formula;

#[derive(Debug)]
pub(crate) struct FakeHandle {
    components: Vec<VarianceEstimate>,
    fixed_fitted: Vec<f64>,
}

impl ModelHandle for FakeHandle {
    fn fixed_effects(&self) -> &[NamedEffect] {
        &[]
    }
    fn random_effects(&self) -> &[NamedEffect] {
        &[]
    }
    fn variance_components(&self) -> &[VarianceEstimate] {
        &self.components
    }
    fn fitted_fixed(&self) -> &[f64] {
        &self.fixed_fitted
    }
    fn log_likelihood(&self) -> f64 {
        -10.0
    }
    fn aic(&self) -> f64 {
        24.0
    }
    fn bic(&self) -> f64 {
        25.0
    }
    fn n_obs(&self) -> usize {
        self.fixed_fitted.len()
    }
    fn converged(&self) -> bool {
        true
    }
    fn warnings(&self) -> &[MaihdaWarning] {
        &[]
    }
    fn predict(&self, new_data: &DataFrame, _include_random: bool) -> Result<Vec<Option<f64>>> {
        Ok(vec![Some(0.0); new_data.nrows()])
    }
}

/// Fitter returning fixed variance components, optionally failing every
/// call after the first `succeed` ones.
#[derive(Debug)]
pub(crate) struct FakeFitter {
    engine: Engine,
    group_variance: f64,
    residual_variance: f64,
    with_components: bool,
    succeed: usize,
    calls: AtomicUsize,
}

impl FakeFitter {
    pub(crate) fn new(group_variance: f64) -> Self {
        Self {
            engine: Engine::Reml,
            group_variance,
            residual_variance: 1.0,
            with_components: true,
            succeed: usize::MAX,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub(crate) fn failing_after(mut self, succeed: usize) -> Self {
        self.succeed = succeed;
        self
    }

    pub(crate) fn without_components(mut self) -> Self {
        self.with_components = false;
        self
    }
}

impl MixedModelFitter for FakeFitter {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn fit(&self, formula: &Formula, data: &DataFrame, _: Family) -> Result<Box<dyn ModelHandle>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.succeed {
            return Err(MaihdaError::NotPositiveDefinite);
        }
        let components = if self.with_components {
            vec![
                VarianceEstimate {
                    name: formula.group().to_string(),
                    variance: self.group_variance,
                },
                VarianceEstimate {
                    name: "residual".into(),
                    variance: self.residual_variance,
                },
            ]
        } else {
            Vec::new()
        };
        Ok(Box::new(FakeHandle {
            components,
            fixed_fitted: vec![0.0; data.nrows()],
        }))
    }
}

pub(crate) fn sample_data() -> DataFrame {
    let mut df = DataFrame::new();
    df.add_float_column("y", vec![1.0, 2.0, 4.0, 5.0, 7.0, 9.0])
        .unwrap();
    df.add_integer_column(
        "stratum",
        vec![Some(1), Some(1), Some(2), Some(2), Some(3), Some(3)],
    )
    .unwrap();
    df
}

pub(crate) fn fake_model(fitter: FakeFitter) -> FittedModel {
    FittedModel::builder()
        .formula("y ~ 1 + (1 | stratum)")
        .data(sample_data())
        .fitter(Arc::new(fitter))
        .fit()
        .unwrap()
}
