use std::collections::HashMap;
use std::fmt;

use crate::data::DataFrame;
use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::glmm::{Family, Pql};
use crate::lmm::{EmReml, FitResult, NamedEffect, VarianceEstimate};
use crate::model::{FixedTerm, Formula, MixedModelBuilder};

use super::engine::Engine;

/// Iteration controls for the built-in fitter.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    max_iter: usize,
    tolerance: f64,
    max_outer_iter: usize,
    outer_tolerance: f64,
}

impl FitOptions {
    pub fn new() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            max_outer_iter: 50,
            outer_tolerance: 1e-6,
        }
    }

    /// Maximum EM-REML iterations (default 1000).
    pub fn max_iter(mut self, n: usize) -> Self {
        self.max_iter = n;
        self
    }

    /// Relative change in the variance parameters that ends EM-REML (default 1e-8).
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Maximum PQL linearisations for non-gaussian families (default 50).
    pub fn max_outer_iter(mut self, n: usize) -> Self {
        self.max_outer_iter = n;
        self
    }

    /// Relative change in the linear predictor that ends PQL (default 1e-6).
    pub fn outer_tolerance(mut self, tol: f64) -> Self {
        self.outer_tolerance = tol;
        self
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted random-intercept model as exposed by a fitting backend.
pub trait ModelHandle: Send + Sync + fmt::Debug {
    /// Fixed-effect estimates with standard errors.
    fn fixed_effects(&self) -> &[NamedEffect];

    /// Per-group random intercepts with conditional standard errors.
    fn random_effects(&self) -> &[NamedEffect];

    /// Variance components, named by grouping field, plus `residual`.
    fn variance_components(&self) -> &[VarianceEstimate];

    /// Fixed part of the linear predictor for each observation that entered
    /// the fit.
    fn fitted_fixed(&self) -> &[f64];

    fn log_likelihood(&self) -> f64;

    fn aic(&self) -> f64;

    fn bic(&self) -> f64;

    /// Number of observations that entered the fit.
    fn n_obs(&self) -> usize;

    fn converged(&self) -> bool;

    /// Non-fatal conditions raised by the fit.
    fn warnings(&self) -> &[MaihdaWarning];

    /// Linear predictor for each row of `new_data`; `None` where a required
    /// field is missing or a factor level was not seen in the fit.
    fn predict(&self, new_data: &DataFrame, include_random: bool) -> Result<Vec<Option<f64>>>;
}

/// A mixed-model fitting backend.
pub trait MixedModelFitter: Send + Sync + fmt::Debug {
    fn engine(&self) -> Engine;

    fn fit(
        &self,
        formula: &Formula,
        data: &DataFrame,
        family: Family,
    ) -> Result<Box<dyn ModelHandle>>;
}

/// The built-in fitter: EM-REML for gaussian models, PQL otherwise.
#[derive(Debug, Clone, Default)]
pub struct RemlFitter {
    options: FitOptions,
}

impl RemlFitter {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }
}

impl MixedModelFitter for RemlFitter {
    fn engine(&self) -> Engine {
        Engine::Reml
    }

    fn fit(
        &self,
        formula: &Formula,
        data: &DataFrame,
        family: Family,
    ) -> Result<Box<dyn ModelHandle>> {
        let model = MixedModelBuilder::new().data(data).formula(formula).build()?;
        let reml = EmReml::new(self.options.max_iter, self.options.tolerance);

        let result = if family.is_generalized() {
            Pql::new(
                reml,
                self.options.max_outer_iter,
                self.options.outer_tolerance,
            )
            .fit(&model, family)?
        } else {
            reml.fit(&model)?
        };
        log::debug!("{}", result.summary());

        let group_index = model
            .group_levels
            .iter()
            .enumerate()
            .map(|(k, l)| (l.clone(), k))
            .collect();

        Ok(Box::new(RemlModel {
            result,
            fixed_terms: model.fixed_terms,
            group: model.group_name,
            group_index,
        }))
    }
}

/// Handle returned by [`RemlFitter`].
#[derive(Debug)]
pub struct RemlModel {
    result: FitResult,
    fixed_terms: Vec<FixedTerm>,
    group: String,
    group_index: HashMap<String, usize>,
}

impl RemlModel {
    /// The underlying REML fit.
    pub fn result(&self) -> &FitResult {
        &self.result
    }
}

impl ModelHandle for RemlModel {
    fn fixed_effects(&self) -> &[NamedEffect] {
        &self.result.fixed_effects
    }

    fn random_effects(&self) -> &[NamedEffect] {
        &self.result.random_effects
    }

    fn variance_components(&self) -> &[VarianceEstimate] {
        &self.result.variance_components
    }

    fn fitted_fixed(&self) -> &[f64] {
        &self.result.fixed_fitted
    }

    fn log_likelihood(&self) -> f64 {
        self.result.log_likelihood
    }

    fn aic(&self) -> f64 {
        self.result.aic()
    }

    fn bic(&self) -> f64 {
        self.result.bic()
    }

    fn n_obs(&self) -> usize {
        self.result.n_obs
    }

    fn converged(&self) -> bool {
        self.result.converged
    }

    fn warnings(&self) -> &[MaihdaWarning] {
        &self.result.warnings
    }

    fn predict(&self, new_data: &DataFrame, include_random: bool) -> Result<Vec<Option<f64>>> {
        let group_col = if include_random {
            Some(new_data.get_column(&self.group)?)
        } else {
            None
        };
        for term in &self.fixed_terms {
            match term {
                FixedTerm::Intercept => {}
                FixedTerm::Covariate(name) | FixedTerm::Factor { name, .. } => {
                    if !new_data.has_column(name) {
                        return Err(MaihdaError::ColumnNotFound(name.clone()));
                    }
                }
            }
        }

        let beta: Vec<f64> = self.result.fixed_effects.iter().map(|e| e.estimate).collect();
        let mut buf = Vec::with_capacity(beta.len());

        let predictions = (0..new_data.nrows())
            .map(|row| {
                buf.clear();
                for term in &self.fixed_terms {
                    term.encode(new_data, row, &mut buf)?;
                }
                let mut eta: f64 = buf.iter().zip(&beta).map(|(x, b)| x * b).sum();
                if let Some(col) = group_col {
                    let level = col.display_value(row)?;
                    // Unseen groups contribute a zero random effect.
                    if let Some(&k) = self.group_index.get(&level) {
                        eta += self.result.random_effects[k].estimate;
                    }
                }
                Some(eta)
            })
            .collect();
        Ok(predictions)
    }
}
