use crate::data::DataFrame;
use crate::error::Result;
use crate::fit::FittedModel;

/// Scale of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionScale {
    /// Linear predictor.
    #[default]
    Link,
    /// Mean of the response (inverse link applied).
    Response,
}

/// Point predictions for each row of `new_data`.
///
/// With `include_random` the stratum's random intercept is added; strata the
/// model has not seen contribute zero. Rows missing a required field predict
/// `None`.
pub fn predict(
    model: &FittedModel,
    new_data: &DataFrame,
    scale: PredictionScale,
    include_random: bool,
) -> Result<Vec<Option<f64>>> {
    let eta = model.handle().predict(new_data, include_random)?;
    Ok(match scale {
        PredictionScale::Link => eta,
        PredictionScale::Response => {
            let link = model.family().link();
            eta.into_iter().map(|e| e.map(|v| link.inv_link(v))).collect()
        }
    })
}
