use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::fit::FittedModel;

use super::extract::{between_stratum_variance, ratio, residual_variance};

/// One row of the variance components table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentRow {
    pub component: String,
    pub variance: f64,
    pub sd: f64,
    /// Share of the total variance.
    pub proportion: f64,
}

impl ComponentRow {
    fn new(component: &str, variance: f64, total: f64) -> Self {
        Self {
            component: component.to_string(),
            variance,
            sd: variance.max(0.0).sqrt(),
            proportion: variance / total,
        }
    }
}

/// Between-stratum, within-stratum and total variance of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceComponents {
    pub between: ComponentRow,
    pub within: ComponentRow,
    pub total: ComponentRow,
    /// Variance partition coefficient, the between-stratum proportion.
    pub vpc: f64,
}

impl VarianceComponents {
    pub fn rows(&self) -> [&ComponentRow; 3] {
        [&self.between, &self.within, &self.total]
    }
}

/// Build the three-row variance components table.
pub fn variance_components(model: &FittedModel) -> Result<VarianceComponents> {
    let between = between_stratum_variance(model)?;
    let within = residual_variance(model)?;
    let vpc = ratio(between, within)?;
    let total = between + within;

    Ok(VarianceComponents {
        between: ComponentRow::new("Between-stratum", between, total),
        within: ComponentRow::new("Within-stratum", within, total),
        total: ComponentRow::new("Total", total, total),
        vpc,
    })
}

impl fmt::Display for VarianceComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>12} {:>12} {:>11}",
            "Component", "Variance", "SD", "Proportion"
        )?;
        for row in self.rows() {
            writeln!(
                f,
                "{:<16} {:>12.6} {:>12.6} {:>11.4}",
                row.component, row.variance, row.sd, row.proportion
            )?;
        }
        write!(f, "VPC/ICC: {:.4}", self.vpc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_model, FakeFitter};
    use approx::assert_relative_eq;

    #[test]
    fn test_proportions_sum_to_one() {
        let model = fake_model(FakeFitter::new(0.6));
        let vc = variance_components(&model).unwrap();

        assert_relative_eq!(vc.between.proportion + vc.within.proportion, 1.0, epsilon = 1e-9);
        assert_relative_eq!(vc.total.variance, 1.6, epsilon = 1e-12);
        assert_eq!(vc.total.proportion, 1.0);
        assert_relative_eq!(vc.vpc, 0.375, epsilon = 1e-12);
        assert_eq!(vc.rows()[1].component, "Within-stratum");
    }

    #[test]
    fn test_display_lists_every_row() {
        let model = fake_model(FakeFitter::new(1.0));
        let text = variance_components(&model).unwrap().to_string();
        assert!(text.contains("Between-stratum"));
        assert!(text.contains("Within-stratum"));
        assert!(text.contains("VPC/ICC: 0.5000"));
    }
}
