use std::fmt;

use serde::Serialize;

use crate::error::{MaihdaError, Result};
use crate::fit::FittedModel;
use crate::pvc::{calculate_pvc, PvcOptions};
use crate::variance::variance_components;

/// One model in a [`Comparison`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub model: String,
    pub vpc: f64,
    pub between: f64,
    pub within: f64,
    pub aic: f64,
    pub bic: f64,
    /// PVC relative to the first model; `None` for the first model itself
    /// and when the first model has no between-stratum variance.
    pub pvc: Option<f64>,
}

/// Side-by-side comparison of several fitted models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
}

/// Compare models by VPC, variance components, information criteria and
/// PVC relative to the first model.
///
/// # Errors
/// `InvalidArgument` for an empty list; extraction and engine errors of any
/// model propagate.
pub fn compare(models: &[(&str, &FittedModel)]) -> Result<Comparison> {
    let (_, reference) = models
        .first()
        .ok_or_else(|| MaihdaError::InvalidArgument("no models to compare".into()))?;

    let rows = models
        .iter()
        .enumerate()
        .map(|(i, (name, model))| {
            let vc = variance_components(model)?;
            let pvc = if i == 0 {
                None
            } else {
                match calculate_pvc(reference, model, &PvcOptions::new()) {
                    Ok(r) => Some(r.pvc),
                    Err(MaihdaError::NonPositiveVariance(_)) => None,
                    Err(e) => return Err(e),
                }
            };
            Ok(ComparisonRow {
                model: name.to_string(),
                vpc: vc.vpc,
                between: vc.between.variance,
                within: vc.within.variance,
                aic: model.handle().aic(),
                bic: model.handle().bic(),
                pvc,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Comparison { rows })
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>8} {:>12} {:>12} {:>12} {:>12} {:>8}",
            "Model", "VPC", "Between", "Within", "AIC", "BIC", "PVC"
        )?;
        for row in &self.rows {
            let pvc = row.pvc.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "-".into());
            writeln!(
                f,
                "{:<16} {:>8.4} {:>12.6} {:>12.6} {:>12.2} {:>12.2} {:>8}",
                row.model, row.vpc, row.between, row.within, row.aic, row.bic, pvc
            )?;
        }
        Ok(())
    }
}
