//! Generalized linear mixed models.
//!
//! Families and link functions for non-gaussian responses, and the
//! penalized quasi-likelihood fitter built on the weighted EM-REML engine.

mod family;
mod link;
mod pql;

pub use family::Family;
pub use link::{IdentityLink, LinkFunction, LogLink, LogitLink};
pub use pql::Pql;
