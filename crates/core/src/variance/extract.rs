use std::f64::consts::PI;

use crate::error::{MaihdaError, Result};
use crate::fit::FittedModel;
use crate::glmm::Family;

/// Variance of the random intercept of the model's grouping field.
///
/// The value is returned as estimated: a boundary fit gives exactly zero and
/// an external backend may report a slightly negative number.
///
/// # Errors
/// `Extraction` if the model exposes no variance component for its grouping
/// field.
pub fn between_stratum_variance(model: &FittedModel) -> Result<f64> {
    let group = model.formula().group();
    model
        .handle()
        .variance_components()
        .iter()
        .find(|v| v.name == group)
        .map(|v| v.variance)
        .ok_or_else(|| {
            MaihdaError::Extraction(format!(
                "model has no variance component for grouping field '{}'",
                group
            ))
        })
}

/// Within-stratum variance on the scale the VPC is computed on.
///
/// - gaussian: the estimated residual variance;
/// - binomial: the latent logistic variance pi^2 / 3;
/// - poisson: ln(1 + 1/lambda), lambda = exp(mean fixed linear predictor + sigma^2_u / 2).
pub fn residual_variance(model: &FittedModel) -> Result<f64> {
    match model.family() {
        Family::Gaussian => model
            .handle()
            .variance_components()
            .iter()
            .find(|v| v.name == "residual")
            .map(|v| v.variance)
            .ok_or_else(|| {
                MaihdaError::Extraction("model has no residual variance component".into())
            }),
        Family::Binomial => Ok(PI * PI / 3.0),
        Family::Poisson => {
            let fixed = model.handle().fitted_fixed();
            if fixed.is_empty() {
                return Err(MaihdaError::Extraction(
                    "model exposes no fitted values to derive the poisson residual variance".into(),
                ));
            }
            let mean_eta = fixed.iter().sum::<f64>() / fixed.len() as f64;
            let lambda = (mean_eta + between_stratum_variance(model)? / 2.0).exp();
            Ok((1.0 + 1.0 / lambda).ln())
        }
    }
}

/// Variance partition coefficient: between / (between + residual).
pub fn vpc(model: &FittedModel) -> Result<f64> {
    let between = between_stratum_variance(model)?;
    let within = residual_variance(model)?;
    ratio(between, within)
}

pub(crate) fn ratio(between: f64, within: f64) -> Result<f64> {
    let total = between + within;
    if !total.is_finite() || total <= 0.0 {
        return Err(MaihdaError::Extraction(format!(
            "total variance {} is not positive",
            total
        )));
    }
    Ok(between / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_model, sample_data, FakeFitter};
    use approx::assert_relative_eq;

    #[test]
    fn test_between_variance_is_raw() {
        let model = fake_model(FakeFitter::new(-0.25));
        assert_eq!(between_stratum_variance(&model).unwrap(), -0.25);
    }

    #[test]
    fn test_missing_components_is_extraction_error() {
        let model = fake_model(FakeFitter::new(1.0).without_components());
        let err = between_stratum_variance(&model).unwrap_err();
        assert!(matches!(err, MaihdaError::Extraction(_)));
        assert!(err.to_string().contains("stratum"));
        assert!(vpc(&model).is_err());
    }

    #[test]
    fn test_vpc_from_components() {
        let model = fake_model(FakeFitter::new(3.0));
        // residual is 1.0 in the fake
        assert_relative_eq!(vpc(&model).unwrap(), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_binomial_uses_latent_scale() {
        let model = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_data())
            .family(Family::Binomial)
            .fitter(std::sync::Arc::new(FakeFitter::new(1.0)))
            .fit()
            .unwrap();
        assert_relative_eq!(residual_variance(&model).unwrap(), PI * PI / 3.0);
    }

    #[test]
    fn test_poisson_residual_variance() {
        let model = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_data())
            .family(Family::Poisson)
            .fitter(std::sync::Arc::new(FakeFitter::new(0.5)))
            .fit()
            .unwrap();
        // fixed linear predictor is 0 in the fake: lambda = exp(0.25)
        let expected = (1.0 + (-0.25f64).exp()).ln();
        assert_relative_eq!(residual_variance(&model).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_total_variance() {
        assert!(ratio(0.0, 0.0).is_err());
        assert!(ratio(f64::NAN, 1.0).is_err());
    }
}
