use std::fmt;

use serde::Serialize;

use crate::bootstrap::{bootstrap_vpc, BootstrapConfig, BootstrapInterval};
use crate::error::{MaihdaWarning, Result};
use crate::fit::{Engine, FittedModel};
use crate::glmm::Family;
use crate::lmm::NamedEffect;
use crate::strata::{StrataTable, StratumInfo};
use crate::variance::{variance_components, VarianceComponents};

/// Normal quantile for the 95% stratum intervals.
const Z_95: f64 = 1.96;

/// Random-intercept estimate of one stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumEstimate {
    /// Grouping level as it appears in the data.
    pub stratum: String,
    /// Human-readable label from the stratum metadata.
    pub label: Option<String>,
    /// Rows assigned to the stratum by the strata builder.
    pub n: Option<usize>,
    pub estimate: f64,
    pub se: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Summary of a fitted MAIHDA model.
#[derive(Debug, Clone, Serialize)]
pub struct MaihdaSummary {
    pub formula: String,
    pub family: Family,
    pub engine: Engine,
    pub n_obs: usize,
    pub components: VarianceComponents,
    /// Bootstrap interval of the VPC, when requested.
    pub vpc_ci: Option<BootstrapInterval>,
    pub fixed_effects: Vec<NamedEffect>,
    pub strata: Vec<StratumEstimate>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub warnings: Vec<MaihdaWarning>,
}

fn find_stratum<'a>(table: &'a StrataTable, level: &str) -> Option<&'a StratumInfo> {
    level
        .parse::<usize>()
        .ok()
        .and_then(|id| table.get(id))
        .or_else(|| table.strata.iter().find(|s| s.label == level))
}

/// Summarize a fitted model: variance components and VPC (with an optional
/// bootstrap interval), fixed effects, and per-stratum random intercepts
/// joined to the stratum metadata.
pub fn summarize(model: &FittedModel, bootstrap: Option<&BootstrapConfig>) -> Result<MaihdaSummary> {
    let components = variance_components(model)?;
    let vpc_ci = bootstrap.map(|config| bootstrap_vpc(model, config)).transpose()?;
    let handle = model.handle();

    let strata = handle
        .random_effects()
        .iter()
        .map(|effect| {
            let info = model
                .strata()
                .and_then(|table| find_stratum(table, &effect.level));
            StratumEstimate {
                stratum: effect.level.clone(),
                label: info.map(|s| s.label.clone()),
                n: info.map(|s| s.n),
                estimate: effect.estimate,
                se: effect.se,
                lower: effect.estimate - Z_95 * effect.se,
                upper: effect.estimate + Z_95 * effect.se,
            }
        })
        .collect();

    let mut warnings = handle.warnings().to_vec();
    if let Some(ci) = &vpc_ci {
        warnings.extend(ci.warnings.iter().cloned());
    }

    Ok(MaihdaSummary {
        formula: model.formula().to_string(),
        family: model.family(),
        engine: model.engine(),
        n_obs: handle.n_obs(),
        components,
        vpc_ci,
        fixed_effects: handle.fixed_effects().to_vec(),
        strata,
        log_likelihood: handle.log_likelihood(),
        aic: handle.aic(),
        bic: handle.bic(),
        warnings,
    })
}

impl fmt::Display for MaihdaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MAIHDA Model Summary")?;
        writeln!(f, "====================")?;
        writeln!(f, "Formula: {}", self.formula)?;
        writeln!(
            f,
            "Family: {}   Engine: {}   Observations: {}",
            self.family, self.engine, self.n_obs
        )?;
        writeln!(
            f,
            "logLik: {:.4}   AIC: {:.4}   BIC: {:.4}",
            self.log_likelihood, self.aic, self.bic
        )?;

        writeln!(f, "\nVariance Components:")?;
        writeln!(f, "{}", self.components)?;
        if let Some(ci) = &self.vpc_ci {
            writeln!(
                f,
                "VPC {:.0}% bootstrap CI: [{:.4}, {:.4}] ({}/{} replicates)",
                100.0 * ci.conf_level,
                ci.lower,
                ci.upper,
                ci.n_success,
                ci.n_requested
            )?;
        }

        writeln!(f, "\nFixed Effects:")?;
        for e in &self.fixed_effects {
            writeln!(f, "  {:<24} {:>12.6} (SE {:.6})", e.name(), e.estimate, e.se)?;
        }

        writeln!(f, "\nStratum Estimates:")?;
        writeln!(
            f,
            "  {:<8} {:<28} {:>6} {:>11} {:>10} {:>11} {:>11}",
            "stratum", "label", "n", "estimate", "se", "lower", "upper"
        )?;
        for s in &self.strata {
            let n = s.n.map(|n| n.to_string()).unwrap_or_default();
            writeln!(
                f,
                "  {:<8} {:<28} {:>6} {:>11.4} {:>10.4} {:>11.4} {:>11.4}",
                s.stratum,
                s.label.as_deref().unwrap_or(""),
                n,
                s.estimate,
                s.se,
                s.lower,
                s.upper
            )?;
        }

        for w in &self.warnings {
            writeln!(f, "Warning: {}", w)?;
        }
        Ok(())
    }
}
