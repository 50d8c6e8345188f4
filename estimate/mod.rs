//! Numeric collaborators consumed by the model: dimensionality reduction,
//! scatter matrices, the maximum-likelihood parameter estimator, the
//! Bayesian parameter derivations and the diagonal Gaussian density.
//!
//! Each collaborator sits behind a trait so a model can be driven by stub
//! strategies in tests. [`Estimators::default`] wires in the built-in
//! implementations.

pub mod bayes;
pub mod density;
pub mod faer_ndarray;
pub mod likelihood;
pub mod pca;
pub mod scatter;

use crate::params::{GaussianParams, LatentGeometry};
use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

pub use bayes::ConjugateGaussian;
pub use density::DiagonalGaussian;
pub use faer_ndarray::FaerLinalgError;
pub use likelihood::IoffeEstimator;
pub use pca::{PcaBasis, PcaFitter};
pub use scatter::ClassScatter;

/// Failures raised by the numeric collaborators.
#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("Estimation requires at least one sample and one feature, got {samples}x{features}.")]
    EmptyInput { samples: usize, features: usize },

    #[error("Category assignments cover {assignments} samples but the data has {samples} rows.")]
    AssignmentMismatch { samples: usize, assignments: usize },

    #[error("At least {required} categories are required, found {found}.")]
    TooFewCategories { required: usize, found: usize },

    #[error(
        "The average category size is {average}; at least one category needs more than one sample."
    )]
    SingletonCategories { average: f64 },

    #[error(
        "Within-category scatter is singular (eigenvalue {eigenvalue:e}); reduce the feature dimensionality first."
    )]
    SingularWithinScatter { eigenvalue: f64 },

    #[error("Cannot keep {requested} components from data with {samples} samples and {features} features.")]
    InvalidComponentCount {
        requested: usize,
        samples: usize,
        features: usize,
    },

    #[error("Projection basis expects {expected} input columns, got {found}.")]
    BasisDimensionMismatch { expected: usize, found: usize },

    #[error("Gaussian parameters span {expected} dimensions but the input has {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Variance at dimension {index} must be strictly positive, got {value}.")]
    NonPositiveVariance { index: usize, value: f64 },

    #[error("Estimated latent geometry is invalid: {0}")]
    InvalidGeometry(String),

    #[error("Bayesian parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] FaerLinalgError),
}

/// Dense integer encoding of category labels, in order of first appearance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryAssignments {
    ids: Vec<usize>,
    n_categories: usize,
}

impl CategoryAssignments {
    /// Encodes `labels`, returning the assignments together with the distinct
    /// labels indexed by their category id.
    pub fn from_labels<L>(labels: &[L]) -> (Self, Vec<L>)
    where
        L: Eq + Hash + Clone,
    {
        let mut lookup: AHashMap<&L, usize> = AHashMap::new();
        let mut categories = Vec::new();
        let ids: Vec<usize> = labels
            .iter()
            .map(|label| {
                *lookup.entry(label).or_insert_with(|| {
                    categories.push(label.clone());
                    categories.len() - 1
                })
            })
            .collect();
        let assignments = Self {
            ids,
            n_categories: categories.len(),
        };
        (assignments, categories)
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn n_categories(&self) -> usize {
        self.n_categories
    }

    /// Number of samples assigned to each category.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_categories];
        for &id in &self.ids {
            counts[id] += 1;
        }
        counts
    }

    pub(crate) fn check_rows(&self, samples: usize) -> Result<(), EstimateError> {
        if self.ids.len() != samples {
            return Err(EstimateError::AssignmentMismatch {
                samples,
                assignments: self.ids.len(),
            });
        }
        Ok(())
    }
}

/// Between- and within-category scatter matrices, both `features x features`.
#[derive(Clone, Debug)]
pub struct ScatterMatrices {
    pub between: Array2<f64>,
    pub within: Array2<f64>,
}

/// A fitted, invertible-in-principle projection between the raw data space
/// and the decorrelated feature space.
pub trait ProjectionBasis: fmt::Debug + Send + Sync {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;
    fn forward(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimateError>;
    /// Reconstruction; exact only when no rank reduction took place.
    fn inverse(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimateError>;
}

/// Fits a [`ProjectionBasis`] keeping `components` output dimensions.
pub trait BasisFitter: Send + Sync {
    fn fit(
        &self,
        data: ArrayView2<'_, f64>,
        components: usize,
    ) -> Result<Arc<dyn ProjectionBasis>, EstimateError>;
}

pub trait ScatterEstimator: Send + Sync {
    fn scatter(
        &self,
        data: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
    ) -> Result<ScatterMatrices, EstimateError>;
}

/// Estimates the generative parameters from decorrelated, labeled data.
pub trait LikelihoodEstimator: Send + Sync {
    fn fit(
        &self,
        data: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
    ) -> Result<LatentGeometry, EstimateError>;
}

/// Closed-form prior, posterior and posterior-predictive parameter sets over
/// the model subspace.
pub trait BayesianEstimator: Send + Sync {
    fn prior(
        &self,
        psi_diag: ArrayView1<'_, f64>,
        relevant_dims: &[usize],
    ) -> Result<GaussianParams, EstimateError>;

    /// One parameter set per category id.
    fn posterior(
        &self,
        u_model: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
        prior: &GaussianParams,
    ) -> Result<Vec<GaussianParams>, EstimateError>;

    fn posterior_predictive(&self, posterior: &[GaussianParams]) -> Vec<GaussianParams>;
}

/// Log-density of a diagonal-covariance multivariate Gaussian.
pub trait DensityEvaluator: Send + Sync {
    /// One log-density per row of `data`.
    fn logpdf(
        &self,
        data: ArrayView2<'_, f64>,
        params: &GaussianParams,
    ) -> Result<Array1<f64>, EstimateError>;
}

/// The collaborator strategies a model is driven by.
#[derive(Clone)]
pub struct Estimators {
    pub basis: Arc<dyn BasisFitter>,
    pub scatter: Arc<dyn ScatterEstimator>,
    pub likelihood: Arc<dyn LikelihoodEstimator>,
    pub bayes: Arc<dyn BayesianEstimator>,
    pub density: Arc<dyn DensityEvaluator>,
}

impl Default for Estimators {
    fn default() -> Self {
        Self {
            basis: Arc::new(PcaFitter),
            scatter: Arc::new(ClassScatter),
            likelihood: Arc::new(IoffeEstimator::default()),
            bayes: Arc::new(ConjugateGaussian),
            density: Arc::new(DiagonalGaussian),
        }
    }
}

impl fmt::Debug for Estimators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Estimators { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_follow_first_appearance() {
        let labels = ["bob", "alice", "bob", "carol", "alice"];
        let (assignments, categories) = CategoryAssignments::from_labels(&labels);
        assert_eq!(categories, vec!["bob", "alice", "carol"]);
        assert_eq!(assignments.ids(), &[0, 1, 0, 2, 1]);
        assert_eq!(assignments.n_categories(), 3);
        assert_eq!(assignments.counts(), vec![2, 2, 1]);
    }

    #[test]
    fn row_check_reports_mismatch() {
        let (assignments, _) = CategoryAssignments::from_labels(&[1_u32, 2, 2]);
        assert!(assignments.check_rows(3).is_ok());
        assert!(matches!(
            assignments.check_rows(4),
            Err(EstimateError::AssignmentMismatch {
                samples: 4,
                assignments: 3
            })
        ));
    }
}
