use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::matrix::sparse::{spmv, weighted_cross_product, xt_wy};
use crate::model::MixedModel;

use super::mme::{MixedModelEquations, MmeSolution};
use super::result::{FitResult, NamedEffect, RemlIteration, VarianceEstimate};

/// Smallest variance the iterations are allowed to reach.
const VARIANCE_FLOOR: f64 = 1e-10;

/// How the residual variance is treated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispersion {
    /// Estimated by REML (gaussian response).
    Estimated,
    /// Held at a known value (working models of a GLMM use 1).
    Fixed(f64),
}

/// REML engine using the EM algorithm for the variance of a single random
/// intercept.
///
/// EM-REML update formulas (Henderson Method III / Mrode 2005):
///
///   sigma^2_u = (u'u + tr(C^{-1}_{uu})) / q
///   sigma^2_e = y'R*e_hat / (n - p)
///
/// where e_hat = y - X*b_hat - Z*u_hat and C^{-1} is the inverse of the
/// MME coefficient matrix. Observations may carry weights, in which case R
/// is diag(sigma^2_e / w).
///
/// Before iterating, the REML score at sigma^2_u = 0 is evaluated. When it
/// is not positive the likelihood peaks on the boundary and the fit is the
/// weighted least-squares fit with a zero group variance (a singular fit).
pub struct EmReml {
    max_iter: usize,
    tol: f64,
}

impl EmReml {
    pub fn new(max_iter: usize, tol: f64) -> Self {
        Self { max_iter, tol }
    }

    /// Fit a gaussian random-intercept model.
    pub fn fit(&self, model: &MixedModel) -> Result<FitResult> {
        let weights = vec![1.0; model.n_obs];
        self.fit_weighted(model, &model.y, &weights, Dispersion::Estimated, None)
    }

    /// Fit the model to a (working) response `y` with observation weights.
    ///
    /// `start` seeds the group variance; without it both components start
    /// at half the weighted variance of `y`.
    pub fn fit_weighted(
        &self,
        model: &MixedModel,
        y: &[f64],
        weights: &[f64],
        dispersion: Dispersion,
        start: Option<f64>,
    ) -> Result<FitResult> {
        let n = model.n_obs;
        if y.len() != n {
            return Err(MaihdaError::DimensionMismatch {
                expected: n,
                got: y.len(),
                context: "response vector".into(),
            });
        }
        if weights.len() != n {
            return Err(MaihdaError::DimensionMismatch {
                expected: n,
                got: weights.len(),
                context: "observation weights".into(),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(MaihdaError::InvalidArgument(
                "observation weights must be positive and finite".into(),
            ));
        }

        let p = model.n_fixed();
        let q = model.n_groups();
        let n_eff = (n - p) as f64;

        // Initialize variance parameters from the weighted data variance.
        let w_sum: f64 = weights.iter().sum();
        let y_mean = y.iter().zip(weights).map(|(yi, wi)| yi * wi).sum::<f64>() / w_sum;
        let y_var = y
            .iter()
            .zip(weights)
            .map(|(yi, wi)| wi * (yi - y_mean).powi(2))
            .sum::<f64>()
            / w_sum;
        let init_var = (y_var / 2.0).max(0.01);

        let mut sigma2_e = match dispersion {
            Dispersion::Estimated => init_var,
            Dispersion::Fixed(v) => v,
        };

        if q == 0 || boundary_optimum(model, y, weights, dispersion)? {
            return self.boundary_fit(model, y, weights, dispersion);
        }

        let mut sigma2_u = start.unwrap_or(init_var).max(VARIANCE_FLOOR);
        let mut history = Vec::new();
        let mut converged = false;
        let mut change = f64::INFINITY;

        for iter in 0..self.max_iter {
            let (mme, sol) = solve_at(model, y, weights, sigma2_u, sigma2_e)?;

            let old = [sigma2_u, sigma2_e];
            let sol_rhs = dot(&sol.solution, &mme.rhs);

            // --- EM update for the residual variance ---
            // y'R^{-1}y - sol'rhs = y'Py, and y'W e_hat = sigma^2_e * y'Py.
            if dispersion == Dispersion::Estimated {
                let y_w_y: f64 = y.iter().zip(weights).map(|(yi, wi)| wi * yi * yi).sum();
                let y_e_hat = y_w_y - sigma2_e * sol_rhs;
                sigma2_e = (y_e_hat / n_eff).max(VARIANCE_FLOOR);
            }

            // --- EM update for the group variance ---
            let u = &sol.random_effects[0];
            let u_quadratic: f64 = u.iter().map(|v| v * v).sum();
            let trace_term: f64 = (0..q).map(|j| sol.c_inv[(p + j, p + j)]).sum();
            sigma2_u = ((u_quadratic + trace_term) / q as f64).max(VARIANCE_FLOOR);

            let logl = reml_log_likelihood(&mme, &sol, y, weights, old[0], old[1], n_eff);

            // Convergence criterion: relative change in parameters
            let diff = ((sigma2_u - old[0]).powi(2) + (sigma2_e - old[1]).powi(2)).sqrt();
            let norm = (old[0].powi(2) + old[1].powi(2)).sqrt().max(1e-10);
            change = diff / norm;

            history.push(RemlIteration {
                iteration: iter + 1,
                log_likelihood: logl,
                variance_params: vec![sigma2_u, sigma2_e],
                change,
            });
            log::trace!(
                "EM-REML iteration {}: sigma2_u={:.6e} sigma2_e={:.6e} logL={:.6}",
                iter + 1,
                sigma2_u,
                sigma2_e,
                logl
            );

            if iter > 0 && change < self.tol {
                converged = true;
                break;
            }
        }

        let mut warnings = Vec::new();
        if !converged {
            warnings.push(MaihdaWarning::NotConverged {
                iterations: history.len(),
                change,
            });
        }

        // Final solve with converged parameters
        let (mme, sol) = solve_at(model, y, weights, sigma2_u, sigma2_e)?;
        let logl = reml_log_likelihood(&mme, &sol, y, weights, sigma2_u, sigma2_e, n_eff);

        Ok(build_result(
            model,
            &sol,
            [sigma2_u, sigma2_e],
            dispersion,
            logl,
            history,
            converged,
            warnings,
        ))
    }

    /// The fit with the group variance on its lower bound: weighted least
    /// squares for the fixed effects, zero random intercepts.
    fn boundary_fit(
        &self,
        model: &MixedModel,
        y: &[f64],
        weights: &[f64],
        dispersion: Dispersion,
    ) -> Result<FitResult> {
        let n_eff = (model.n_obs - model.n_fixed()) as f64;
        let sigma2_e = match dispersion {
            Dispersion::Estimated => wls_residual_variance(model, y, weights)?,
            Dispersion::Fixed(v) => v,
        };

        let r_inv: Vec<f64> = weights.iter().map(|w| w / sigma2_e).collect();
        let mme = MixedModelEquations::assemble(&model.x, &[], y, &r_inv, &[]);
        let sol = mme.solve()?;
        let logl = reml_log_likelihood(&mme, &sol, y, weights, 0.0, sigma2_e, n_eff);

        let sol = MmeSolution {
            random_effects: vec![vec![0.0; model.n_groups()]],
            ..sol
        };

        let warnings = vec![MaihdaWarning::SingularFit {
            group: model.group_name.clone(),
        }];
        Ok(build_result(
            model,
            &sol,
            [0.0, sigma2_e],
            dispersion,
            logl,
            Vec::new(),
            true,
            warnings,
        ))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Assemble and solve the MME at the given variance parameters.
fn solve_at(
    model: &MixedModel,
    y: &[f64],
    weights: &[f64],
    sigma2_u: f64,
    sigma2_e: f64,
) -> Result<(MixedModelEquations, MmeSolution)> {
    let r_inv: Vec<f64> = weights.iter().map(|w| w / sigma2_e).collect();
    let g_inv = vec![1.0 / sigma2_u; model.n_groups()];
    let mme = MixedModelEquations::assemble(&model.x, &[&model.z], y, &r_inv, &[g_inv]);
    let sol = mme.solve()?;
    Ok((mme, sol))
}

/// REML log-likelihood from a solved MME:
///
///   logL = -0.5 * (n_eff*ln(2pi) + log|R| + log|G| + log|C| + y'Py)
///
/// With `sigma2_u == 0` the system carries no random block and log|G| is 0.
fn reml_log_likelihood(
    mme: &MixedModelEquations,
    sol: &MmeSolution,
    y: &[f64],
    weights: &[f64],
    sigma2_u: f64,
    sigma2_e: f64,
    n_eff: f64,
) -> f64 {
    let y_r_inv_y: f64 = y
        .iter()
        .zip(weights)
        .map(|(yi, wi)| wi * yi * yi / sigma2_e)
        .sum();
    let y_p_y = y_r_inv_y - dot(&sol.solution, &mme.rhs);

    let log_det_r: f64 = weights.iter().map(|w| (sigma2_e / w).ln()).sum();
    let q: usize = mme.n_random.iter().sum();
    let log_det_g = if q > 0 { q as f64 * sigma2_u.ln() } else { 0.0 };
    let log_2_pi = (2.0 * std::f64::consts::PI).ln();
    -0.5 * (n_eff * log_2_pi + log_det_r + log_det_g + sol.log_det_c + y_p_y)
}

/// Residuals of the weighted least-squares fit of y on X.
fn wls_residuals(model: &MixedModel, y: &[f64], weights: &[f64]) -> Result<Vec<f64>> {
    let mme = MixedModelEquations::assemble(&model.x, &[], y, weights, &[]);
    let sol = mme.solve()?;
    let xb = spmv(&model.x, &sol.fixed_effects);
    Ok(y.iter().zip(&xb).map(|(yi, fi)| yi - fi).collect())
}

fn wls_residual_variance(model: &MixedModel, y: &[f64], weights: &[f64]) -> Result<f64> {
    let resid = wls_residuals(model, y, weights)?;
    let rss: f64 = resid.iter().zip(weights).map(|(r, w)| w * r * r).sum();
    Ok((rss / (model.n_obs - model.n_fixed()) as f64).max(VARIANCE_FLOOR))
}

/// Whether the REML likelihood is maximised at sigma^2_u = 0.
///
/// At the boundary V = R and the score for sigma^2_u is proportional to
///
///   ||Z'R^{-1}r||^2 - tr(Z'PZ),   tr(Z'PZ) = tr(Z'R^{-1}Z) - tr(C_xx^{-1} X'R^{-1}Z Z'R^{-1}X)
///
/// with r the weighted least-squares residuals.
fn boundary_optimum(
    model: &MixedModel,
    y: &[f64],
    weights: &[f64],
    dispersion: Dispersion,
) -> Result<bool> {
    let sigma2_e = match dispersion {
        Dispersion::Estimated => wls_residual_variance(model, y, weights)?,
        Dispersion::Fixed(v) => v,
    };
    let r_inv: Vec<f64> = weights.iter().map(|w| w / sigma2_e).collect();

    let resid = wls_residuals(model, y, weights)?;
    let zt_r = xt_wy(&model.z, &r_inv, &resid);
    let quadratic: f64 = zt_r.iter().map(|v| v * v).sum();

    let ztz = weighted_cross_product(&model.z, &model.z, &r_inv);
    let xtx = weighted_cross_product(&model.x, &model.x, &r_inv);
    let xtz = weighted_cross_product(&model.x, &model.z, &r_inv);
    let xtx_inv = xtx
        .cholesky()
        .ok_or(MaihdaError::NotPositiveDefinite)?
        .inverse();
    let projected = (&xtx_inv * &xtz * xtz.transpose()).trace();
    let trace = ztz.trace() - projected;

    Ok(quadratic <= trace)
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    model: &MixedModel,
    sol: &MmeSolution,
    variances: [f64; 2],
    dispersion: Dispersion,
    log_likelihood: f64,
    history: Vec<RemlIteration>,
    converged: bool,
    warnings: Vec<MaihdaWarning>,
) -> FitResult {
    let n = model.n_obs;
    let p = model.n_fixed();
    let boundary = variances[0] == 0.0;

    let variance_components = vec![
        VarianceEstimate {
            name: model.group_name.clone(),
            variance: variances[0],
        },
        VarianceEstimate {
            name: "residual".to_string(),
            variance: variances[1],
        },
    ];

    // Fixed effects with SEs from C^{-1}
    let fixed_effects: Vec<NamedEffect> = model
        .fixed_labels
        .iter()
        .enumerate()
        .map(|(i, label)| NamedEffect {
            term: label.term.clone(),
            level: label.level.clone(),
            estimate: sol.fixed_effects[i],
            se: sol.c_inv[(i, i)].max(0.0).sqrt(),
        })
        .collect();

    // Random intercepts with conditional SEs (zero on the boundary)
    let random_effects: Vec<NamedEffect> = model
        .group_levels
        .iter()
        .enumerate()
        .map(|(j, level)| NamedEffect {
            term: model.group_name.clone(),
            level: level.clone(),
            estimate: sol.random_effects[0][j],
            se: if boundary {
                0.0
            } else {
                sol.c_inv[(p + j, p + j)].max(0.0).sqrt()
            },
        })
        .collect();

    let fixed_fitted = spmv(&model.x, &sol.fixed_effects);
    let zu = spmv(&model.z, &sol.random_effects[0]);
    let fitted: Vec<f64> = fixed_fitted.iter().zip(&zu).map(|(a, b)| a + b).collect();

    let n_variance_params = match dispersion {
        Dispersion::Estimated => 2,
        Dispersion::Fixed(_) => 1,
    };

    FitResult {
        variance_components,
        fixed_effects,
        random_effects,
        log_likelihood,
        n_iterations: history.len(),
        converged,
        history,
        fitted,
        fixed_fitted,
        warnings,
        n_obs: n,
        n_fixed_params: p,
        n_variance_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFrame;
    use crate::model::{Formula, MixedModelBuilder};
    use approx::assert_relative_eq;

    fn build(df: &DataFrame, formula: &str) -> MixedModel {
        let f = Formula::parse(formula).unwrap();
        MixedModelBuilder::new().data(df).formula(&f).build().unwrap()
    }

    /// Balanced one-way layout: 3 groups x 4 observations.
    ///
    /// MSW = 15 / 9, MSB = 128 / 2, so the REML estimates are
    /// sigma2_e = 5/3 and sigma2_u = (64 - 5/3) / 4.
    fn balanced_df() -> DataFrame {
        let mut df = DataFrame::new();
        df.add_float_column(
            "y",
            vec![
                10.0, 12.0, 11.0, 13.0, // G1, mean 11.5
                6.0, 8.0, 7.0, 9.0, // G2, mean 7.5
                14.0, 16.0, 15.0, 17.0, // G3, mean 15.5
            ],
        )
        .unwrap();
        df.add_factor_column(
            "g",
            &["G1", "G1", "G1", "G1", "G2", "G2", "G2", "G2", "G3", "G3", "G3", "G3"],
        )
        .unwrap();
        df
    }

    #[test]
    fn test_em_reml_matches_anova_estimates() {
        let df = balanced_df();
        let model = build(&df, "y ~ (1 | g)");
        let result = EmReml::new(10_000, 1e-12).fit(&model).unwrap();

        assert!(result.converged);
        assert!(result.warnings.is_empty());
        assert_relative_eq!(result.residual_variance(), 5.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(
            result.group_variance(),
            (64.0 - 5.0 / 3.0) / 4.0,
            epsilon = 1e-5
        );
        // Balanced data: the intercept is the grand mean.
        assert_relative_eq!(result.fixed_effects[0].estimate, 11.5, epsilon = 1e-6);
    }

    #[test]
    fn test_blups_follow_group_means() {
        let df = balanced_df();
        let model = build(&df, "y ~ (1 | g)");
        let result = EmReml::new(1000, 1e-8).fit(&model).unwrap();

        let blup = |level: &str| {
            result
                .random_effects
                .iter()
                .find(|e| e.level == level)
                .unwrap()
                .estimate
        };
        assert!(blup("G3") > blup("G1"));
        assert!(blup("G1") > blup("G2"));
        // Shrunk toward zero, never past the raw deviation.
        assert!(blup("G3") < 4.0 && blup("G3") > 3.5);
        for e in &result.random_effects {
            assert!(e.se > 0.0);
        }
        assert_eq!(result.fitted.len(), 12);
    }

    #[test]
    fn test_identical_group_means_give_singular_fit() {
        let mut df = DataFrame::new();
        df.add_float_column("y", vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0])
            .unwrap();
        df.add_factor_column("g", &["a", "a", "a", "b", "b", "b", "c", "c", "c"])
            .unwrap();
        let model = build(&df, "y ~ (1 | g)");
        let result = EmReml::new(1000, 1e-8).fit(&model).unwrap();

        assert_eq!(result.group_variance(), 0.0);
        assert_relative_eq!(result.residual_variance(), 0.75, epsilon = 1e-10);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, MaihdaWarning::SingularFit { .. })));
        assert!(result.random_effects.iter().all(|e| e.estimate == 0.0));
    }

    #[test]
    fn test_iteration_limit_reports_not_converged() {
        let df = balanced_df();
        let model = build(&df, "y ~ (1 | g)");
        let result = EmReml::new(2, 1e-15).fit(&model).unwrap();

        assert!(!result.converged);
        assert_eq!(result.n_iterations, 2);
        assert!(matches!(
            result.warnings[0],
            MaihdaWarning::NotConverged { iterations: 2, .. }
        ));
    }

    #[test]
    fn test_fixed_dispersion_is_kept() {
        let df = balanced_df();
        let model = build(&df, "y ~ (1 | g)");
        let weights = vec![1.0; 12];
        let result = EmReml::new(1000, 1e-8)
            .fit_weighted(&model, &model.y, &weights, Dispersion::Fixed(1.0), None)
            .unwrap();
        assert_eq!(result.residual_variance(), 1.0);
        assert_eq!(result.n_variance_params, 1);
        assert!(result.group_variance() > 0.0);
    }

    #[test]
    fn test_weight_length_mismatch() {
        let df = balanced_df();
        let model = build(&df, "y ~ (1 | g)");
        let err = EmReml::new(10, 1e-8)
            .fit_weighted(&model, &model.y, &[1.0; 3], Dispersion::Estimated, None)
            .unwrap_err();
        assert!(matches!(err, MaihdaError::DimensionMismatch { .. }));
    }
}
