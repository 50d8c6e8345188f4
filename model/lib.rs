#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
//! Probabilistic linear discriminant analysis.
//!
//! A fitted [`PldaModel`] relates four coordinate spaces: the raw data D,
//! the decorrelated space X, the latent space U where within-category
//! variance is the identity, and the model subspace U_model holding only
//! the latent axes that carry between-category variance. Data can be moved
//! between any two of them and scored under the prior, per-category
//! posterior and posterior-predictive Gaussians, or compared with the
//! same-versus-different likelihood ratio.

pub mod error;
pub mod fit;
pub mod inference;
pub mod params;
pub mod plda;
pub mod space;
mod transform;

#[path = "../estimate/mod.rs"]
pub mod estimate;

pub use error::PldaError;
pub use estimate::{CategoryAssignments, EstimateError, Estimators, ProjectionBasis};
pub use fit::{FitOptions, Reduction};
pub use inference::log_marginal_likelihood;
pub use params::{BayesParams, GaussianParams, LatentGeometry, ModelParams};
pub use plda::PldaModel;
pub use space::{Space, Step, space_walk};
