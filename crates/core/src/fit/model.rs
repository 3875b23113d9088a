use std::str::FromStr;
use std::sync::Arc;

use crate::data::DataFrame;
use crate::error::{MaihdaError, MaihdaWarning, Result};
use crate::glmm::Family;
use crate::model::Formula;
use crate::strata::StrataTable;

use super::engine::Engine;
use super::fitter::{FitOptions, MixedModelFitter, ModelHandle, RemlFitter};

/// An immutable fitted MAIHDA model.
///
/// Bundles the backend's model handle with the formula, the data it was fit
/// on, the family and the stratum metadata. Cloning is cheap: the handle,
/// data and metadata are shared.
#[derive(Debug, Clone)]
pub struct FittedModel {
    handle: Arc<dyn ModelHandle>,
    fitter: Arc<dyn MixedModelFitter>,
    formula: Formula,
    data: Arc<DataFrame>,
    family: Family,
    strata: Option<Arc<StrataTable>>,
}

impl FittedModel {
    pub fn builder() -> FitBuilder {
        FitBuilder::new()
    }

    pub fn handle(&self) -> &dyn ModelHandle {
        self.handle.as_ref()
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// The data set the model was fit on, including rows that listwise
    /// deletion kept out of the fit.
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn engine(&self) -> Engine {
        self.fitter.engine()
    }

    pub fn strata(&self) -> Option<&StrataTable> {
        self.strata.as_deref()
    }

    /// Number of observations that entered the fit.
    pub fn n_obs(&self) -> usize {
        self.handle.n_obs()
    }

    pub fn warnings(&self) -> &[MaihdaWarning] {
        self.handle.warnings()
    }

    /// Fit the same formula, family and backend to another data set.
    ///
    /// Used by the bootstrap; warnings raised by the refit are logged at
    /// debug level only and stay on the returned model.
    pub fn refit(&self, data: DataFrame) -> Result<FittedModel> {
        let handle = self.fitter.fit(&self.formula, &data, self.family)?;
        for w in handle.warnings() {
            log::debug!("refit: {}", w);
        }
        Ok(FittedModel {
            handle: Arc::from(handle),
            fitter: Arc::clone(&self.fitter),
            formula: self.formula.clone(),
            data: Arc::new(data),
            family: self.family,
            strata: self.strata.clone(),
        })
    }
}

/// A value given directly or by name, resolved when the model is fit.
#[derive(Debug, Clone)]
enum Choice<T> {
    Value(T),
    Name(String),
}

impl<T: FromStr<Err = MaihdaError> + Copy> Choice<T> {
    fn resolve(&self) -> Result<T> {
        match self {
            Choice::Value(v) => Ok(*v),
            Choice::Name(name) => name.parse(),
        }
    }
}

/// Builder for [`FittedModel`].
///
/// ```no_run
/// use maihda_core::data::DataFrame;
/// use maihda_core::fit::FittedModel;
///
/// let df = DataFrame::from_csv("strata.csv").unwrap();
/// let model = FittedModel::builder()
///     .formula("bmi ~ 1 + (1 | stratum)")
///     .data(df)
///     .family_name("gaussian")
///     .fit()
///     .unwrap();
/// println!("{}", model.formula());
/// ```
#[derive(Debug, Default)]
pub struct FitBuilder {
    formula: Option<String>,
    data: Option<Arc<DataFrame>>,
    strata: Option<Arc<StrataTable>>,
    family: Option<Choice<Family>>,
    engine: Option<Choice<Engine>>,
    options: FitOptions,
    fitter: Option<Arc<dyn MixedModelFitter>>,
}

impl FitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model formula, e.g. `y ~ age + (1 | stratum)`.
    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn data(mut self, data: impl Into<Arc<DataFrame>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Stratum metadata from [`crate::strata::build_strata`].
    pub fn strata(mut self, strata: impl Into<Arc<StrataTable>>) -> Self {
        self.strata = Some(strata.into());
        self
    }

    /// Distributional family (default gaussian).
    pub fn family(mut self, family: Family) -> Self {
        self.family = Some(Choice::Value(family));
        self
    }

    /// Family by name; an unknown name fails the fit with `UnsupportedFamily`.
    pub fn family_name(mut self, name: &str) -> Self {
        self.family = Some(Choice::Name(name.to_string()));
        self
    }

    /// Fitting engine (default reml, or the injected fitter's engine).
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(Choice::Value(engine));
        self
    }

    /// Engine by name; an unknown name fails the fit with `UnsupportedEngine`.
    pub fn engine_name(mut self, name: &str) -> Self {
        self.engine = Some(Choice::Name(name.to_string()));
        self
    }

    /// Iteration controls for the built-in fitter.
    pub fn options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an external fitting backend instead of the built-in one.
    pub fn fitter(mut self, fitter: Arc<dyn MixedModelFitter>) -> Self {
        self.fitter = Some(fitter);
        self
    }

    /// Validate the inputs and fit the model.
    ///
    /// Every argument is checked before any fitting work starts.
    pub fn fit(self) -> Result<FittedModel> {
        let text = self
            .formula
            .ok_or_else(|| MaihdaError::InvalidArgument("No formula provided".into()))?;
        let data = self
            .data
            .ok_or_else(|| MaihdaError::InvalidArgument("No data provided".into()))?;
        if data.nrows() == 0 {
            return Err(MaihdaError::InvalidArgument("DataFrame is empty".into()));
        }

        let family = match &self.family {
            Some(choice) => choice.resolve()?,
            None => Family::default(),
        };
        let requested = self.engine.as_ref().map(Choice::resolve).transpose()?;

        let formula = Formula::parse(&text)?;
        formula.validate(&data)?;

        let fitter: Arc<dyn MixedModelFitter> = match (self.fitter, requested) {
            (Some(fitter), Some(engine)) if fitter.engine() != engine => {
                return Err(MaihdaError::InvalidArgument(format!(
                    "engine '{}' requested but the supplied fitter is '{}'",
                    engine,
                    fitter.engine()
                )))
            }
            (Some(fitter), _) => fitter,
            (None, None | Some(Engine::Reml)) => Arc::new(RemlFitter::new(self.options)),
            (None, Some(Engine::Bayesian)) => {
                return Err(MaihdaError::UnsupportedEngine(
                    "bayesian estimation needs an external fitter (FitBuilder::fitter)".into(),
                ))
            }
        };

        let handle = fitter.fit(&formula, &data, family)?;
        for w in handle.warnings() {
            w.clone().emit();
        }
        log::info!(
            "fitted '{}' ({} family, {} engine) on {} of {} rows",
            formula,
            family,
            fitter.engine(),
            handle.n_obs(),
            data.nrows()
        );

        Ok(FittedModel {
            handle: Arc::from(handle),
            fitter,
            formula,
            data,
            family,
            strata: self.strata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmm::{NamedEffect, VarianceEstimate};

    fn sample_df() -> DataFrame {
        let mut df = DataFrame::new();
        df.add_float_column("y", vec![1.0, 2.0, 4.0, 5.0, 7.0, 9.0]).unwrap();
        df.add_integer_column(
            "stratum",
            vec![Some(1), Some(1), Some(2), Some(2), Some(3), Some(3)],
        )
        .unwrap();
        df
    }

    #[derive(Debug)]
    struct NullHandle;

    impl ModelHandle for NullHandle {
        fn fixed_effects(&self) -> &[NamedEffect] {
            &[]
        }
        fn random_effects(&self) -> &[NamedEffect] {
            &[]
        }
        fn variance_components(&self) -> &[VarianceEstimate] {
            &[]
        }
        fn fitted_fixed(&self) -> &[f64] {
            &[]
        }
        fn log_likelihood(&self) -> f64 {
            0.0
        }
        fn aic(&self) -> f64 {
            0.0
        }
        fn bic(&self) -> f64 {
            0.0
        }
        fn n_obs(&self) -> usize {
            0
        }
        fn converged(&self) -> bool {
            true
        }
        fn warnings(&self) -> &[MaihdaWarning] {
            &[]
        }
        fn predict(&self, new_data: &DataFrame, _: bool) -> Result<Vec<Option<f64>>> {
            Ok(vec![None; new_data.nrows()])
        }
    }

    #[derive(Debug)]
    struct BayesStub;

    impl MixedModelFitter for BayesStub {
        fn engine(&self) -> Engine {
            Engine::Bayesian
        }
        fn fit(&self, _: &Formula, _: &DataFrame, _: Family) -> Result<Box<dyn ModelHandle>> {
            Ok(Box::new(NullHandle))
        }
    }

    #[test]
    fn test_fit_defaults_to_gaussian_reml() {
        let model = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .fit()
            .unwrap();
        assert_eq!(model.family(), Family::Gaussian);
        assert_eq!(model.engine(), Engine::Reml);
        assert_eq!(model.n_obs(), 6);
        assert!(model.strata().is_none());
    }

    #[test]
    fn test_unknown_family_name_fails_fast() {
        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .family_name("gamma")
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::UnsupportedFamily(_)));
    }

    #[test]
    fn test_unknown_engine_name_fails_fast() {
        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .engine_name("stan")
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::UnsupportedEngine(_)));
    }

    #[test]
    fn test_bayesian_without_fitter_is_unsupported() {
        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .engine(Engine::Bayesian)
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::UnsupportedEngine(_)));
    }

    #[test]
    fn test_injected_fitter_sets_engine() {
        let model = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .fitter(Arc::new(BayesStub))
            .fit()
            .unwrap();
        assert_eq!(model.engine(), Engine::Bayesian);

        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .engine(Engine::Reml)
            .fitter(Arc::new(BayesStub))
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_inputs() {
        let err = FittedModel::builder().data(sample_df()).fit().unwrap_err();
        assert!(matches!(err, MaihdaError::InvalidArgument(_)));

        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(DataFrame::new())
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::InvalidArgument(_)));

        let err = FittedModel::builder()
            .formula("y ~ 1 + (1 | region)")
            .data(sample_df())
            .fit()
            .unwrap_err();
        assert!(matches!(err, MaihdaError::ColumnNotFound(_)));
    }

    #[test]
    fn test_refit_shares_configuration() {
        let model = FittedModel::builder()
            .formula("y ~ 1 + (1 | stratum)")
            .data(sample_df())
            .fit()
            .unwrap();
        let resampled = model.data().take_rows(&[0, 0, 2, 3, 4, 5]).unwrap();
        let refit = model.refit(resampled).unwrap();
        assert_eq!(refit.formula(), model.formula());
        assert_eq!(refit.data().nrows(), 6);
        assert_eq!(refit.engine(), Engine::Reml);
    }
}
