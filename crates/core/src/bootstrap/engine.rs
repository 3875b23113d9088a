use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{MaihdaError, MaihdaWarning, Result};

use super::config::BootstrapConfig;

/// A percentile bootstrap confidence interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapInterval {
    pub lower: f64,
    pub upper: f64,
    pub conf_level: f64,
    /// Replicates that produced a statistic.
    pub n_success: usize,
    /// Replicates attempted.
    pub n_requested: usize,
    pub warnings: Vec<MaihdaWarning>,
}

impl BootstrapInterval {
    /// At least half of the replicates succeeded.
    pub fn is_reliable(&self) -> bool {
        2 * self.n_success >= self.n_requested
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Draw `n` row indices uniformly from `0..n`, with replacement.
pub fn resample_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Sample quantile with linear interpolation between order statistics
/// (Hyndman & Fan type 7). `None` for an empty sample or `p` outside [0, 1].
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(quantile_sorted(&sorted, p))
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Non-parametric bootstrap confidence interval for a statistic.
///
/// Each replicate draws `n` indices with replacement and hands them to
/// `score`, which refits whatever it needs and returns the statistic.
/// Replicates returning an error or a non-finite value are discarded.
///
/// # Errors
/// - `InvalidArgument` for `n == 0` or an invalid config.
/// - `BootstrapFailed` when no replicate succeeds.
///
/// Fewer than 50% successful replicates is reported as a
/// `BootstrapUnreliable` warning on the interval.
pub fn bootstrap_ci<F>(score: F, n: usize, config: &BootstrapConfig) -> Result<BootstrapInterval>
where
    F: Fn(&[usize]) -> Result<f64> + Sync,
{
    let mut rng = config.rng();
    bootstrap_ci_with_rng(score, n, config, &mut rng)
}

/// [`bootstrap_ci`] drawing from a caller-supplied random source.
///
/// One sub-seed per replicate is drawn from `rng` up front, so the result
/// is identical whether or not replicates run in parallel.
pub fn bootstrap_ci_with_rng<F, R>(
    score: F,
    n: usize,
    config: &BootstrapConfig,
    rng: &mut R,
) -> Result<BootstrapInterval>
where
    F: Fn(&[usize]) -> Result<f64> + Sync,
    R: Rng + ?Sized,
{
    config.validate()?;
    if n == 0 {
        return Err(MaihdaError::InvalidArgument(
            "cannot bootstrap an empty data set".into(),
        ));
    }

    let n_boot = config.get_n_boot();
    let seeds: Vec<u64> = (0..n_boot).map(|_| rng.gen()).collect();

    let replicate = |(b, seed): (usize, &u64)| -> Option<f64> {
        let mut rng = StdRng::seed_from_u64(*seed);
        let indices = resample_indices(n, &mut rng);
        match score(&indices) {
            Ok(v) if v.is_finite() => Some(v),
            Ok(v) => {
                log::debug!("bootstrap replicate {} discarded: statistic is {}", b + 1, v);
                None
            }
            Err(e) => {
                log::debug!("bootstrap replicate {} failed: {}", b + 1, e);
                None
            }
        }
    };

    let mut values: Vec<f64> = if config.is_parallel() {
        seeds.par_iter().enumerate().filter_map(replicate).collect()
    } else {
        seeds.iter().enumerate().filter_map(replicate).collect()
    };

    let n_success = values.len();
    if n_success == 0 {
        return Err(MaihdaError::BootstrapFailed { n_boot });
    }

    let mut warnings = Vec::new();
    if 2 * n_success < n_boot {
        warnings.push(
            MaihdaWarning::BootstrapUnreliable {
                succeeded: n_success,
                requested: n_boot,
            }
            .emit(),
        );
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let alpha = (1.0 - config.get_conf_level()) / 2.0;
    let lower = quantile_sorted(&values, alpha);
    let upper = quantile_sorted(&values, 1.0 - alpha);

    log::info!(
        "bootstrap: {}/{} replicates succeeded, {:.1}% interval [{:.6}, {:.6}]",
        n_success,
        n_boot,
        100.0 * config.get_conf_level(),
        lower,
        upper
    );

    Ok(BootstrapInterval {
        lower,
        upper,
        conf_level: config.get_conf_level(),
        n_success,
        n_requested: n_boot,
        warnings,
    })
}
