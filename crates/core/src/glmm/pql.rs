use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::lmm::{Dispersion, EmReml, FitResult};
use crate::model::MixedModel;

use super::family::Family;

/// Penalized quasi-likelihood fitter for non-gaussian random-intercept
/// models (Breslow & Clayton 1993).
///
/// Each outer iteration linearises the model at the current linear predictor
/// and fits the working model
///
///   z = X*b + Z*u + e,   Var(e) = diag(1 / w)
///
/// by weighted EM-REML with the dispersion held at 1. Iteration stops when the
/// relative change of the linear predictor falls below the outer tolerance.
pub struct Pql {
    inner: EmReml,
    max_outer_iter: usize,
    outer_tol: f64,
}

impl Pql {
    pub fn new(inner: EmReml, max_outer_iter: usize, outer_tol: f64) -> Self {
        Self {
            inner,
            max_outer_iter,
            outer_tol,
        }
    }

    pub fn fit(&self, model: &MixedModel, family: Family) -> Result<FitResult> {
        if !family.is_generalized() {
            return self.inner.fit(model);
        }
        family.validate_response(&model.y)?;

        let link = family.link();
        let y = &model.y;
        let mut mu = family.initialize_mu(y);
        let mut eta: Vec<f64> = mu.iter().map(|&m| link.link(m)).collect();
        let mut start = None;
        let mut change = f64::INFINITY;
        let mut outer_converged = false;
        let mut last: Option<FitResult> = None;

        for outer in 0..self.max_outer_iter {
            let (z, w) = family.working_response(y, &eta, &mu);
            let result = self
                .inner
                .fit_weighted(model, &z, &w, Dispersion::Fixed(1.0), start)?;

            let new_eta = &result.fitted;
            let diff: f64 = new_eta
                .iter()
                .zip(&eta)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            let norm: f64 = eta.iter().map(|e| e * e).sum::<f64>().sqrt().max(1e-10);
            change = diff / norm;
            log::trace!(
                "PQL iteration {}: sigma2_u={:.6e} change={:.3e}",
                outer + 1,
                result.group_variance(),
                change
            );

            eta = new_eta.clone();
            mu = family.update_mu(&eta);
            start = Some(result.group_variance()).filter(|v| *v > 0.0);
            last = Some(result);

            if outer > 0 && change < self.outer_tol {
                outer_converged = true;
                break;
            }
        }

        let mut result = last.ok_or_else(|| {
            MaihdaError::InvalidArgument("PQL needs at least one outer iteration".into())
        })?;
        if !outer_converged {
            result.converged = false;
            result.warnings.push(MaihdaWarning::NotConverged {
                iterations: self.max_outer_iter,
                change,
            });
        }
        Ok(result)
    }
}
