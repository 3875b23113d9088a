use serde::Serialize;

use crate::error::MaihdaWarning;

/// The result of fitting a random-intercept model via REML.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Estimated variance components: the grouping term, then the residual.
    pub variance_components: Vec<VarianceEstimate>,
    /// Fixed effects (BLUE).
    pub fixed_effects: Vec<NamedEffect>,
    /// Random intercepts (BLUP), one per group level.
    pub random_effects: Vec<NamedEffect>,
    /// Restricted log-likelihood at convergence.
    pub log_likelihood: f64,
    /// Number of REML iterations performed.
    pub n_iterations: usize,
    /// Whether the algorithm converged.
    pub converged: bool,
    /// Iteration history.
    pub history: Vec<RemlIteration>,
    /// Linear predictor X*b + Z*u for every observation of the model frame.
    pub fitted: Vec<f64>,
    /// Fixed part of the linear predictor, X*b.
    pub fixed_fitted: Vec<f64>,
    /// Non-fatal conditions raised while fitting.
    pub warnings: Vec<MaihdaWarning>,
    /// Model dimensions.
    pub n_obs: usize,
    pub n_fixed_params: usize,
    pub n_variance_params: usize,
}

/// A single variance component estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceEstimate {
    pub name: String,
    pub variance: f64,
}

/// A named fixed or random effect estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedEffect {
    pub term: String,
    pub level: String,
    pub estimate: f64,
    pub se: f64,
}

impl NamedEffect {
    /// Display name, e.g. `(Intercept)`, `age`, `gender:F`.
    pub fn name(&self) -> String {
        if self.level.is_empty() {
            self.term.clone()
        } else {
            format!("{}:{}", self.term, self.level)
        }
    }
}

/// Information about a single REML iteration.
#[derive(Debug, Clone)]
pub struct RemlIteration {
    pub iteration: usize,
    pub log_likelihood: f64,
    pub variance_params: Vec<f64>,
    pub change: f64,
}

impl FitResult {
    /// Variance of the random intercept.
    pub fn group_variance(&self) -> f64 {
        self.variance_components
            .first()
            .map(|v| v.variance)
            .unwrap_or(f64::NAN)
    }

    /// Residual variance (1.0 for families with a fixed dispersion).
    pub fn residual_variance(&self) -> f64 {
        self.variance_components
            .last()
            .map(|v| v.variance)
            .unwrap_or(f64::NAN)
    }

    /// AIC = -2 * logL + 2 * p (where p = number of variance parameters).
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.n_variance_params as f64
    }

    /// BIC = -2 * logL + p * ln(n - rank(X)).
    pub fn bic(&self) -> f64 {
        let n_eff = self.n_obs.saturating_sub(self.n_fixed_params).max(1) as f64;
        -2.0 * self.log_likelihood + self.n_variance_params as f64 * n_eff.ln()
    }

    /// Print a formatted summary of the model fit.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("=== Random-Intercept Model Fit (EM-REML) ===\n\n");
        s.push_str(&format!(
            "Observations: {}   Fixed params: {}   Variance params: {}\n",
            self.n_obs, self.n_fixed_params, self.n_variance_params
        ));
        s.push_str(&format!(
            "Converged: {}   Iterations: {}\n\n",
            self.converged, self.n_iterations
        ));

        s.push_str(&format!("Log-likelihood: {:.4}\n", self.log_likelihood));
        s.push_str(&format!("AIC: {:.4}\n", self.aic()));
        s.push_str(&format!("BIC: {:.4}\n\n", self.bic()));

        s.push_str("--- Variance Components ---\n");
        for vc in &self.variance_components {
            s.push_str(&format!("  {}: sigma2={:.6}\n", vc.name, vc.variance));
        }

        s.push_str("\n--- Fixed Effects (BLUE) ---\n");
        for ef in &self.fixed_effects {
            s.push_str(&format!(
                "  {}: {:.6} (SE: {:.6})\n",
                ef.name(),
                ef.estimate,
                ef.se
            ));
        }

        if let Some(first) = self.random_effects.first() {
            s.push_str(&format!("\n--- Random Effects: {} (BLUP) ---\n", first.term));
            let mut sorted = self.random_effects.clone();
            sorted.sort_by(|a, b| b.estimate.total_cmp(&a.estimate));
            for ef in sorted.iter().take(10) {
                s.push_str(&format!("  {}: {:.6}\n", ef.level, ef.estimate));
            }
            if sorted.len() > 10 {
                s.push_str(&format!("  ... and {} more\n", sorted.len() - 10));
            }
        }

        s
    }
}
