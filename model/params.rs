use crate::error::PldaError;
use crate::estimate::{EstimateError, ProjectionBasis};
use ahash::AHashMap;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;

/// Largest entry of `loading · inverse_loading - I` accepted, relative to the
/// dimension and the magnitudes of both matrices.
pub const INVERSE_TOLERANCE: f64 = 1.0e-8;

/// Mean and diagonal covariance of a Gaussian over the model subspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub mean: Array1<f64>,
    pub cov_diag: Array1<f64>,
}

impl GaussianParams {
    pub fn new(mean: Array1<f64>, cov_diag: Array1<f64>) -> Self {
        Self { mean, cov_diag }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    fn check(&self, what: &str, dim: usize) -> Result<(), EstimateError> {
        if self.mean.len() != dim || self.cov_diag.len() != dim {
            return Err(EstimateError::InvalidParameters(format!(
                "{what} parameters have mean length {} and covariance length {}, expected {dim}",
                self.mean.len(),
                self.cov_diag.len()
            )));
        }
        if let Some((index, &value)) = self
            .cov_diag
            .iter()
            .enumerate()
            .find(|(_, v)| !(**v > 0.0))
        {
            return Err(EstimateError::NonPositiveVariance { index, value });
        }
        Ok(())
    }
}

/// The affine latent geometry produced by the maximum-likelihood estimator.
///
/// `loading` maps U to X (`x = mean + loading · u`) and `inverse_loading`
/// maps back. `psi_diag` is the between-category variance along each axis
/// of U; within-category variance is unit in U. `relevant_dims` selects the
/// axes with positive between-category variance and defines U_model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentGeometry {
    pub mean: Array1<f64>,
    pub loading: Array2<f64>,
    pub inverse_loading: Array2<f64>,
    pub psi_diag: Array1<f64>,
    pub relevant_dims: Vec<usize>,
}

impl LatentGeometry {
    pub fn latent_dim(&self) -> usize {
        self.loading.nrows()
    }

    pub(crate) fn validate(&self) -> Result<(), EstimateError> {
        let invalid = |msg: String| Err(EstimateError::InvalidGeometry(msg));
        let (rows, cols) = self.loading.dim();
        if rows != cols {
            return invalid(format!("loading must be square, got {rows}x{cols}"));
        }
        if self.inverse_loading.dim() != (rows, cols) {
            return invalid(format!(
                "inverse loading has shape {:?}, expected {rows}x{cols}",
                self.inverse_loading.dim()
            ));
        }
        if self.mean.len() != rows {
            return invalid(format!(
                "mean has length {}, expected {rows}",
                self.mean.len()
            ));
        }
        let max_abs = |m: &Array2<f64>| m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let tolerance = INVERSE_TOLERANCE
            * rows as f64
            * (max_abs(&self.loading) * max_abs(&self.inverse_loading)).max(1.0);
        let product = self.loading.dot(&self.inverse_loading);
        let deviation = product
            .indexed_iter()
            .map(|((i, j), &v)| if i == j { (v - 1.0).abs() } else { v.abs() })
            .fold(0.0_f64, f64::max);
        if !(deviation <= tolerance) || product.iter().any(|v| !v.is_finite()) {
            return invalid(format!(
                "inverse loading is not the inverse of loading (max deviation from identity {deviation:e})"
            ));
        }
        if self.psi_diag.len() != rows {
            return invalid(format!(
                "psi diagonal has length {}, expected {rows}",
                self.psi_diag.len()
            ));
        }
        if let Some(&dim) = self.relevant_dims.iter().find(|&&d| d >= rows) {
            return invalid(format!("relevant dimension {dim} is outside 0..{rows}"));
        }
        if let Some(dim) = self.relevant_dims.iter().duplicates().next() {
            return invalid(format!("relevant dimension {dim} is listed twice"));
        }
        if let Some(&dim) = self
            .relevant_dims
            .iter()
            .find(|&&d| !(self.psi_diag[d] > 0.0))
        {
            return invalid(format!(
                "relevant dimension {dim} has non-positive between-category variance {}",
                self.psi_diag[dim]
            ));
        }
        Ok(())
    }
}

/// Geometric parameters of a fitted model: the optional projection basis
/// between D and X plus the latent geometry.
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub(crate) basis: Option<Arc<dyn ProjectionBasis>>,
    pub(crate) geometry: LatentGeometry,
}

impl ModelParams {
    pub fn new(
        basis: Option<Arc<dyn ProjectionBasis>>,
        geometry: LatentGeometry,
    ) -> Result<Self, PldaError> {
        geometry
            .validate()
            .map_err(|err| PldaError::Configuration(err.to_string()))?;
        if let Some(basis) = &basis {
            if basis.output_dim() != geometry.latent_dim() {
                return Err(PldaError::Configuration(format!(
                    "projection basis produces {} features but the latent geometry expects {}",
                    basis.output_dim(),
                    geometry.latent_dim()
                )));
            }
        }
        Ok(Self { basis, geometry })
    }

    pub fn basis(&self) -> Option<&Arc<dyn ProjectionBasis>> {
        self.basis.as_ref()
    }

    pub fn geometry(&self) -> &LatentGeometry {
        &self.geometry
    }

    pub fn relevant_dims(&self) -> &[usize] {
        &self.geometry.relevant_dims
    }
}

/// Derived Bayesian parameter sets, all over the model subspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "L: Serialize + Eq + Hash",
    deserialize = "L: Deserialize<'de> + Eq + Hash"
))]
pub struct BayesParams<L> {
    pub prior: GaussianParams,
    pub posterior: AHashMap<L, GaussianParams>,
    pub posterior_predictive: AHashMap<L, GaussianParams>,
}

impl<L> BayesParams<L>
where
    L: Eq + Hash + Clone,
{
    /// Keys per-category parameter sets by their label.
    pub fn from_categories(
        prior: GaussianParams,
        categories: &[L],
        posterior: Vec<GaussianParams>,
        posterior_predictive: Vec<GaussianParams>,
    ) -> Result<Self, PldaError> {
        if posterior.len() != categories.len() || posterior_predictive.len() != categories.len() {
            return Err(PldaError::Configuration(format!(
                "{} categories but {} posterior and {} posterior-predictive parameter sets",
                categories.len(),
                posterior.len(),
                posterior_predictive.len()
            )));
        }
        Ok(Self {
            prior,
            posterior: categories.iter().cloned().zip(posterior).collect(),
            posterior_predictive: categories
                .iter()
                .cloned()
                .zip(posterior_predictive)
                .collect(),
        })
    }

    pub(crate) fn validate(&self, dim: usize) -> Result<(), EstimateError> {
        self.prior.check("prior", dim)?;
        for params in self.posterior.values() {
            params.check("posterior", dim)?;
        }
        for params in self.posterior_predictive.values() {
            params.check("posterior-predictive", dim)?;
        }
        if self.posterior.len() != self.posterior_predictive.len()
            || self
                .posterior
                .keys()
                .any(|key| !self.posterior_predictive.contains_key(key))
        {
            return Err(EstimateError::InvalidParameters(
                "posterior and posterior-predictive parameters cover different categories".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a fit produces. Replaced as a unit on every successful fit.
#[derive(Debug, Clone)]
pub struct FittedState<L> {
    pub(crate) params: ModelParams,
    pub(crate) bayes: BayesParams<L>,
    pub(crate) categories: Vec<L>,
}
