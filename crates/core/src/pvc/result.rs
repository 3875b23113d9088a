use std::fmt;

use serde::Serialize;

use crate::error::MaihdaWarning;

/// Proportional change in between-stratum variance from model 1 to model 2.
///
/// Positive values mean model 2 has less between-stratum variance, i.e. its
/// additional terms explain part of the intersectional variance of model 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvcResult {
    /// (var_model1 - var_model2) / var_model1.
    pub pvc: f64,
    /// Between-stratum variance of the reference model.
    pub var_model1: f64,
    /// Between-stratum variance of the comparison model.
    pub var_model2: f64,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub conf_level: Option<f64>,
    /// Bootstrap replicates that produced a PVC, when bootstrapped.
    pub n_boot_success: Option<usize>,
    pub warnings: Vec<MaihdaWarning>,
}

impl PvcResult {
    /// var_model1 - var_model2.
    pub fn absolute_change(&self) -> f64 {
        self.var_model1 - self.var_model2
    }

    /// PVC as a percentage.
    pub fn percent_change(&self) -> f64 {
        100.0 * self.pvc
    }

    /// One-line reading of the sign of the PVC.
    pub fn interpretation(&self) -> String {
        if self.pvc > 0.0 {
            format!(
                "Model 2 explains {:.1}% of the between-stratum variance of model 1.",
                self.percent_change()
            )
        } else if self.pvc < 0.0 {
            format!(
                "Between-stratum variance increased by {:.1}% in model 2.",
                -self.percent_change()
            )
        } else {
            "Between-stratum variance is unchanged between the models.".to_string()
        }
    }
}

impl fmt::Display for PvcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proportional Change in Variance (PVC)")?;
        writeln!(f, "PVC: {:.4}", self.pvc)?;
        if let (Some(lo), Some(hi)) = (self.ci_lower, self.ci_upper) {
            let level = self.conf_level.unwrap_or(0.95);
            writeln!(f, "{:.0}% CI: [{:.4}, {:.4}]", 100.0 * level, lo, hi)?;
        }
        writeln!(f, "Between-stratum variance, model 1: {:.6}", self.var_model1)?;
        writeln!(f, "Between-stratum variance, model 2: {:.6}", self.var_model2)?;
        writeln!(f, "Absolute change: {:.6}", self.absolute_change())?;
        writeln!(f, "Percentage change: {:.2}%", self.percent_change())?;
        write!(f, "Interpretation: {}", self.interpretation())?;
        for w in &self.warnings {
            write!(f, "\nWarning: {}", w)?;
        }
        Ok(())
    }
}
