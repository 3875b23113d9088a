use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{MaihdaError, Result};

/// Settings for a bootstrap run.
///
/// ```
/// use maihda_core::bootstrap::BootstrapConfig;
///
/// let config = BootstrapConfig::new().n_boot(200).seed(42);
/// assert_eq!(config.get_n_boot(), 200);
/// assert_eq!(config.get_conf_level(), 0.95);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    n_boot: usize,
    conf_level: f64,
    seed: Option<u64>,
    parallel: bool,
}

impl BootstrapConfig {
    /// Defaults: 1000 replicates, 95% interval, entropy seed, sequential.
    pub fn new() -> Self {
        Self {
            n_boot: 1000,
            conf_level: 0.95,
            seed: None,
            parallel: false,
        }
    }

    /// Number of bootstrap replicates.
    pub fn n_boot(mut self, n: usize) -> Self {
        self.n_boot = n;
        self
    }

    /// Two-sided confidence level, in (0, 1).
    pub fn conf_level(mut self, level: f64) -> Self {
        self.conf_level = level;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Refit replicates on the rayon thread pool. Results do not depend on
    /// this setting.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn get_n_boot(&self) -> usize {
        self.n_boot
    }

    pub fn get_conf_level(&self) -> f64 {
        self.conf_level
    }

    pub fn get_seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_boot == 0 {
            return Err(MaihdaError::InvalidArgument(
                "n_boot must be at least 1".into(),
            ));
        }
        if !(self.conf_level > 0.0 && self.conf_level < 1.0) {
            return Err(MaihdaError::InvalidArgument(format!(
                "conf_level must be in (0, 1), got {}",
                self.conf_level
            )));
        }
        Ok(())
    }

    /// Random source for this run: seeded when a seed is set.
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new()
    }
}
