//! Distributional families.
//!
//! A family pairs a distribution with its canonical link and provides the
//! working response and working weights for IRLS / PQL.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MaihdaError, Result};

use super::link::{IdentityLink, LinkFunction, LogLink, LogitLink};

/// Bounds keeping fitted means inside the support of the variance function.
const MU_EPS: f64 = 1e-10;

/// Supported response distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Normal response, identity link; fit as an ordinary linear mixed model.
    #[default]
    Gaussian,
    /// Binary (0/1) or proportion response, logit link.
    Binomial,
    /// Count response, log link.
    Poisson,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::Gaussian => "gaussian",
            Family::Binomial => "binomial",
            Family::Poisson => "poisson",
        }
    }

    /// Whether the family needs the generalized (PQL) fitter.
    pub fn is_generalized(&self) -> bool {
        !matches!(self, Family::Gaussian)
    }

    pub fn link(&self) -> &'static (dyn LinkFunction + Send + Sync) {
        match self {
            Family::Gaussian => &IdentityLink,
            Family::Binomial => &LogitLink,
            Family::Poisson => &LogLink,
        }
    }

    /// Name of the link function, as printed in summaries.
    pub fn link_name(&self) -> &'static str {
        match self {
            Family::Gaussian => "identity",
            Family::Binomial => "logit",
            Family::Poisson => "log",
        }
    }

    /// Check that every response value lies in the support of the family.
    pub fn validate_response(&self, y: &[f64]) -> Result<()> {
        let bad = match self {
            Family::Gaussian => y.iter().find(|v| !v.is_finite()),
            Family::Binomial => y.iter().find(|v| !(0.0..=1.0).contains(*v)),
            Family::Poisson => y.iter().find(|v| !v.is_finite() || **v < 0.0),
        };
        match bad {
            Some(v) => Err(MaihdaError::InvalidArgument(format!(
                "response value {} is outside the support of the {} family",
                v,
                self.name()
            ))),
            None => Ok(()),
        }
    }

    /// Initialize mu from y.
    pub fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        match self {
            Family::Gaussian => y.to_vec(),
            // mu_init = (y + 0.5) / 2
            Family::Binomial => y.iter().map(|&yi| (yi + 0.5) / 2.0).collect(),
            Family::Poisson => y.iter().map(|&yi| yi + 0.1).collect(),
        }
    }

    /// Compute mu = g^{-1}(eta), clamping to the valid range.
    pub fn update_mu(&self, eta: &[f64]) -> Vec<f64> {
        let link = self.link();
        eta.iter()
            .map(|&e| {
                let m = link.inv_link(e);
                match self {
                    Family::Gaussian => m,
                    Family::Binomial => m.clamp(MU_EPS, 1.0 - MU_EPS),
                    Family::Poisson => m.max(MU_EPS),
                }
            })
            .collect()
    }

    /// Working response z and working weights w at the current linear
    /// predictor:
    ///
    ///   z = eta + (y - mu) / mu'(eta)
    ///   w = mu'(eta)^2 / V(mu)
    pub fn working_response(&self, y: &[f64], eta: &[f64], mu: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let link = self.link();
        y.iter()
            .zip(eta)
            .zip(mu)
            .map(|((&yi, &ei), &mi)| {
                let d = link.inv_link_deriv(ei).max(MU_EPS);
                let v = link.variance(mi).max(MU_EPS);
                (ei + (yi - mi) / d, d * d / v)
            })
            .unzip()
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = MaihdaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Family::Gaussian),
            "binomial" | "logistic" => Ok(Family::Binomial),
            "poisson" => Ok(Family::Poisson),
            _ => Err(MaihdaError::UnsupportedFamily(s.to_string())),
        }
    }
}
