use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MaihdaError, Result};

/// Fitting backend a model was estimated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Frequentist (restricted) maximum likelihood.
    #[default]
    Reml,
    /// Bayesian estimation, provided by an injected fitter.
    Bayesian,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Reml => "reml",
            Engine::Bayesian => "bayesian",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = MaihdaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reml" | "lme4" | "lmm" | "frequentist" => Ok(Engine::Reml),
            "bayes" | "bayesian" | "brms" => Ok(Engine::Bayesian),
            _ => Err(MaihdaError::UnsupportedEngine(format!(
                "'{}' (expected one of: reml, bayesian)",
                s
            ))),
        }
    }
}
