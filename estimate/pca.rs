use super::faer_ndarray::descending_eigh;
use super::{BasisFitter, EstimateError, ProjectionBasis};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Principal-component basis: centers on the training mean and rotates onto
/// the leading eigenvectors of the sample covariance. No whitening.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PcaBasis {
    /// Training mean, shape `(features)`.
    mean: Array1<f64>,
    /// Principal axes as columns, shape `(features, components)`.
    rotation: Array2<f64>,
    /// Variance captured by each kept axis.
    explained_variance: Array1<f64>,
}

impl PcaBasis {
    pub fn new(
        mean: Array1<f64>,
        rotation: Array2<f64>,
        explained_variance: Array1<f64>,
    ) -> Result<Self, EstimateError> {
        if rotation.nrows() != mean.len() {
            return Err(EstimateError::BasisDimensionMismatch {
                expected: mean.len(),
                found: rotation.nrows(),
            });
        }
        if explained_variance.len() != rotation.ncols() {
            return Err(EstimateError::BasisDimensionMismatch {
                expected: rotation.ncols(),
                found: explained_variance.len(),
            });
        }
        Ok(Self {
            mean,
            rotation,
            explained_variance,
        })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    fn check_columns(&self, found: usize, expected: usize) -> Result<(), EstimateError> {
        if found != expected {
            return Err(EstimateError::BasisDimensionMismatch { expected, found });
        }
        Ok(())
    }
}

impl ProjectionBasis for PcaBasis {
    fn input_dim(&self) -> usize {
        self.rotation.nrows()
    }

    fn output_dim(&self) -> usize {
        self.rotation.ncols()
    }

    fn forward(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimateError> {
        self.check_columns(data.ncols(), self.input_dim())?;
        Ok((&data - &self.mean).dot(&self.rotation))
    }

    fn inverse(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, EstimateError> {
        self.check_columns(data.ncols(), self.output_dim())?;
        Ok(data.dot(&self.rotation.t()) + &self.mean)
    }
}

/// Fits a [`PcaBasis`] from the eigendecomposition of the sample covariance.
#[derive(Clone, Copy, Debug, Default)]
pub struct PcaFitter;

impl PcaFitter {
    pub fn fit_basis(
        &self,
        data: ArrayView2<'_, f64>,
        components: usize,
    ) -> Result<PcaBasis, EstimateError> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(EstimateError::EmptyInput {
                samples: n_samples,
                features: n_features,
            });
        }
        if components > n_features || components > n_samples {
            return Err(EstimateError::InvalidComponentCount {
                requested: components,
                samples: n_samples,
                features: n_features,
            });
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(EstimateError::EmptyInput {
                samples: n_samples,
                features: n_features,
            })?;
        let centered = &data - &mean;
        let denominator = n_samples.saturating_sub(1).max(1) as f64;
        let covariance = centered.t().dot(&centered) / denominator;

        let (values, vectors) = descending_eigh(&covariance)?;
        log::debug!(
            "PCA covariance spectrum (leading {components} of {n_features}): {:?}",
            values.slice(ndarray::s![..components])
        );

        let kept: Vec<usize> = (0..components).collect();
        let rotation = vectors.select(Axis(1), &kept);
        let explained_variance = values.select(Axis(0), &kept).mapv(|v| v.max(0.0));
        PcaBasis::new(mean, rotation, explained_variance)
    }
}

impl BasisFitter for PcaFitter {
    fn fit(
        &self,
        data: ArrayView2<'_, f64>,
        components: usize,
    ) -> Result<Arc<dyn ProjectionBasis>, EstimateError> {
        Ok(Arc::new(self.fit_basis(data, components)?))
    }
}
