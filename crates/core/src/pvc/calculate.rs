use crate::bootstrap::{bootstrap_ci, BootstrapConfig};
use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::fit::FittedModel;
use crate::variance::between_stratum_variance;

use super::result::PvcResult;

/// Options for [`calculate_pvc`].
#[derive(Debug, Clone, Default)]
pub struct PvcOptions {
    bootstrap: bool,
    config: BootstrapConfig,
}

impl PvcOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a bootstrap confidence interval (default off).
    pub fn bootstrap(mut self, enabled: bool) -> Self {
        self.bootstrap = enabled;
        self
    }

    /// Replicates, confidence level and seed of the bootstrap.
    pub fn config(mut self, config: BootstrapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn get_config(&self) -> &BootstrapConfig {
        &self.config
    }
}

fn finite_variance(model: &FittedModel, name: &str) -> Result<f64> {
    let value = between_stratum_variance(model)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MaihdaError::InvalidVariance {
            model: name.to_string(),
            value,
        })
    }
}

/// Proportional change in between-stratum variance, `(var1 - var2) / var1`.
///
/// # Errors
/// - `EngineMismatch` if the models were fit with different engines.
/// - `InvalidVariance` if either between-stratum variance is not finite.
/// - `NonPositiveVariance` if the reference model's variance is `<= 0`,
///   whether or not a bootstrap is requested.
///
/// Models fit on data sets of different sizes raise a `SizeMismatch`
/// warning. In the bootstrap, indices are then drawn from model 1's rows and
/// reused for model 2, where indices past its last row select nothing.
/// A bootstrap in which no replicate succeeds leaves the interval empty and
/// records a `BootstrapUnreliable` warning.
pub fn calculate_pvc(
    model1: &FittedModel,
    model2: &FittedModel,
    options: &PvcOptions,
) -> Result<PvcResult> {
    if model1.engine() != model2.engine() {
        return Err(MaihdaError::EngineMismatch {
            first: model1.engine().to_string(),
            second: model2.engine().to_string(),
        });
    }

    let var1 = finite_variance(model1, "model1")?;
    let var2 = finite_variance(model2, "model2")?;
    if var1 <= 0.0 {
        return Err(MaihdaError::NonPositiveVariance(var1));
    }
    let pvc = (var1 - var2) / var1;

    let n1 = model1.data().nrows();
    let n2 = model2.data().nrows();
    let mut warnings = Vec::new();
    if n1 != n2 {
        warnings.push(
            MaihdaWarning::SizeMismatch {
                first: n1,
                second: n2,
            }
            .emit(),
        );
    }

    let mut result = PvcResult {
        pvc,
        var_model1: var1,
        var_model2: var2,
        ci_lower: None,
        ci_upper: None,
        conf_level: None,
        n_boot_success: None,
        warnings,
    };

    if !options.bootstrap {
        return Ok(result);
    }

    let score = |indices: &[usize]| -> Result<f64> {
        let data1 = model1.data().take_rows(indices)?;
        let data2 = if n1 == n2 {
            model2.data().take_rows(indices)?
        } else {
            let kept: Vec<usize> = indices.iter().copied().filter(|&i| i < n2).collect();
            model2.data().take_rows(&kept)?
        };
        let v1 = between_stratum_variance(&model1.refit(data1)?)?;
        let v2 = between_stratum_variance(&model2.refit(data2)?)?;
        if v1 <= 0.0 {
            return Err(MaihdaError::NonPositiveVariance(v1));
        }
        Ok((v1 - v2) / v1)
    };

    match bootstrap_ci(score, n1, &options.config) {
        Ok(ci) => {
            result.ci_lower = Some(ci.lower);
            result.ci_upper = Some(ci.upper);
            result.conf_level = Some(ci.conf_level);
            result.n_boot_success = Some(ci.n_success);
            result.warnings.extend(ci.warnings);
        }
        Err(MaihdaError::BootstrapFailed { n_boot }) => {
            result.n_boot_success = Some(0);
            result.warnings.push(
                MaihdaWarning::BootstrapUnreliable {
                    succeeded: 0,
                    requested: n_boot,
                }
                .emit(),
            );
        }
        Err(e) => return Err(e),
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFrame;
    use crate::fit::Engine;
    use crate::test_support::{fake_model, FakeFitter};
    use std::sync::Arc;

    fn boot(n: usize) -> PvcOptions {
        PvcOptions::new()
            .bootstrap(true)
            .config(BootstrapConfig::new().n_boot(n).seed(11))
    }

    #[test]
    fn test_pvc_formula() {
        let m1 = fake_model(FakeFitter::new(0.8));
        let m2 = fake_model(FakeFitter::new(0.3));
        let r = calculate_pvc(&m1, &m2, &PvcOptions::new()).unwrap();
        assert_eq!(r.pvc, (0.8 - 0.3) / 0.8);
        assert_eq!(r.var_model1, 0.8);
        assert_eq!(r.var_model2, 0.3);
        assert!(r.ci_lower.is_none() && r.ci_upper.is_none());
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_non_positive_reference_variance() {
        for var1 in [0.0, -0.1] {
            let m1 = fake_model(FakeFitter::new(var1));
            let m2 = fake_model(FakeFitter::new(0.3));
            for options in [PvcOptions::new(), boot(10)] {
                let err = calculate_pvc(&m1, &m2, &options).unwrap_err();
                assert!(matches!(err, MaihdaError::NonPositiveVariance(v) if v == var1));
            }
        }
    }

    #[test]
    fn test_nan_variance_is_invalid() {
        let m1 = fake_model(FakeFitter::new(1.0));
        let m2 = fake_model(FakeFitter::new(f64::NAN));
        match calculate_pvc(&m1, &m2, &PvcOptions::new()).unwrap_err() {
            MaihdaError::InvalidVariance { model, value } => {
                assert_eq!(model, "model2");
                assert!(value.is_nan());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_engine_mismatch() {
        let m1 = fake_model(FakeFitter::new(1.0));
        let m2 = fake_model(FakeFitter::new(0.5).engine(Engine::Bayesian));
        let err = calculate_pvc(&m1, &m2, &PvcOptions::new()).unwrap_err();
        assert!(matches!(err, MaihdaError::EngineMismatch { .. }));
    }

    #[test]
    fn test_same_model_bootstrap_is_zero() {
        let m1 = fake_model(FakeFitter::new(0.7));
        let r = calculate_pvc(&m1, &m1, &boot(30)).unwrap();
        assert_eq!(r.pvc, 0.0);
        assert_eq!((r.ci_lower, r.ci_upper), (Some(0.0), Some(0.0)));
        assert_eq!(r.n_boot_success, Some(30));
    }

    #[test]
    fn test_bootstrap_total_failure_is_a_warning() {
        let m1 = fake_model(FakeFitter::new(1.0).failing_after(1));
        let m2 = fake_model(FakeFitter::new(0.5));
        let r = calculate_pvc(&m1, &m2, &boot(8)).unwrap();
        assert_eq!(r.pvc, 0.5);
        assert!(r.ci_lower.is_none());
        assert_eq!(r.n_boot_success, Some(0));
        assert_eq!(
            r.warnings,
            vec![MaihdaWarning::BootstrapUnreliable {
                succeeded: 0,
                requested: 8
            }]
        );
    }

    #[test]
    fn test_size_mismatch_warns_and_still_bootstraps() {
        let m1 = fake_model(FakeFitter::new(1.0));
        let mut small = DataFrame::new();
        small.add_float_column("y", vec![1.0, 2.0, 3.0]).unwrap();
        small
            .add_integer_column("stratum", vec![Some(1), Some(2), Some(2)])
            .unwrap();
        let m2 = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(small)
            .fitter(Arc::new(FakeFitter::new(0.25)))
            .fit()
            .unwrap();

        let r = calculate_pvc(&m1, &m2, &boot(20)).unwrap();
        assert_eq!(
            r.warnings[0],
            MaihdaWarning::SizeMismatch {
                first: 6,
                second: 3
            }
        );
        assert_eq!(r.ci_lower, Some(0.75));
        assert_eq!(r.ci_upper, Some(0.75));
    }
}
