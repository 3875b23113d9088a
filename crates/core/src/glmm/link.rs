//! Link functions for GLMMs.
//!
//! Maps between the linear predictor (eta) and the mean (mu).

/// Link function interface.
pub trait LinkFunction {
    /// Apply the link function: eta = g(mu).
    fn link(&self, mu: f64) -> f64;
    /// Apply the inverse link: mu = g^{-1}(eta).
    fn inv_link(&self, eta: f64) -> f64;
    /// Derivative of the inverse link: d(mu)/d(eta).
    fn inv_link_deriv(&self, eta: f64) -> f64;
    /// Variance function: V(mu).
    fn variance(&self, mu: f64) -> f64;
}

/// Identity link for gaussian responses.
#[derive(Debug, Clone, Copy)]
pub struct IdentityLink;

impl LinkFunction for IdentityLink {
    fn link(&self, mu: f64) -> f64 {
        mu
    }

    fn inv_link(&self, eta: f64) -> f64 {
        eta
    }

    fn inv_link_deriv(&self, _eta: f64) -> f64 {
        1.0
    }

    fn variance(&self, _mu: f64) -> f64 {
        1.0
    }
}

/// Logit link for binary responses.
#[derive(Debug, Clone, Copy)]
pub struct LogitLink;

impl LinkFunction for LogitLink {
    fn link(&self, mu: f64) -> f64 {
        (mu / (1.0 - mu)).ln()
    }

    fn inv_link(&self, eta: f64) -> f64 {
        1.0 / (1.0 + (-eta).exp())
    }

    fn inv_link_deriv(&self, eta: f64) -> f64 {
        let p = self.inv_link(eta);
        p * (1.0 - p)
    }

    fn variance(&self, mu: f64) -> f64 {
        mu * (1.0 - mu)
    }
}

/// Log link for counts.
#[derive(Debug, Clone, Copy)]
pub struct LogLink;

impl LinkFunction for LogLink {
    fn link(&self, mu: f64) -> f64 {
        mu.ln()
    }

    fn inv_link(&self, eta: f64) -> f64 {
        eta.exp()
    }

    fn inv_link_deriv(&self, eta: f64) -> f64 {
        eta.exp()
    }

    fn variance(&self, mu: f64) -> f64 {
        mu
    }
}
