use super::{DensityEvaluator, EstimateError};
use crate::params::GaussianParams;
use ndarray::{Array1, ArrayView2, Axis};
use std::f64::consts::PI;

/// Multivariate normal with diagonal covariance, evaluated as a sum of
/// independent univariate log-densities.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiagonalGaussian;

impl DensityEvaluator for DiagonalGaussian {
    fn logpdf(
        &self,
        data: ArrayView2<'_, f64>,
        params: &GaussianParams,
    ) -> Result<Array1<f64>, EstimateError> {
        if params.cov_diag.len() != params.dim() {
            return Err(EstimateError::DimensionMismatch {
                expected: params.dim(),
                found: params.cov_diag.len(),
            });
        }
        if data.ncols() != params.dim() {
            return Err(EstimateError::DimensionMismatch {
                expected: params.dim(),
                found: data.ncols(),
            });
        }
        if let Some((index, &value)) = params
            .cov_diag
            .iter()
            .enumerate()
            .find(|(_, v)| !(**v > 0.0))
        {
            return Err(EstimateError::NonPositiveVariance { index, value });
        }

        let log_norm: f64 = params
            .cov_diag
            .iter()
            .map(|&var| (2.0 * PI * var).ln())
            .sum();
        let precision = params.cov_diag.mapv(f64::recip);
        let centered = &data - &params.mean;
        let mahalanobis = (&centered * &centered * &precision).sum_axis(Axis(1));
        Ok(mahalanobis.mapv(|m| -0.5 * (log_norm + m)))
    }
}
