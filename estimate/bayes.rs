use super::{BayesianEstimator, CategoryAssignments, EstimateError};
use crate::params::GaussianParams;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Conjugate updates for a Gaussian category mean with prior `N(0, Ψ)` and
/// unit within-category variance, one independent axis at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConjugateGaussian;

impl BayesianEstimator for ConjugateGaussian {
    fn prior(
        &self,
        psi_diag: ArrayView1<'_, f64>,
        relevant_dims: &[usize],
    ) -> Result<GaussianParams, EstimateError> {
        if let Some(&dim) = relevant_dims.iter().find(|&&d| d >= psi_diag.len()) {
            return Err(EstimateError::InvalidGeometry(format!(
                "relevant dimension {dim} is outside 0..{}",
                psi_diag.len()
            )));
        }
        let cov_diag = psi_diag.select(Axis(0), relevant_dims);
        Ok(GaussianParams::new(Array1::zeros(relevant_dims.len()), cov_diag))
    }

    fn posterior(
        &self,
        u_model: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
        prior: &GaussianParams,
    ) -> Result<Vec<GaussianParams>, EstimateError> {
        categories.check_rows(u_model.nrows())?;
        if u_model.ncols() != prior.dim() {
            return Err(EstimateError::DimensionMismatch {
                expected: prior.dim(),
                found: u_model.ncols(),
            });
        }

        let mut sums = Array2::<f64>::zeros((categories.n_categories(), prior.dim()));
        for (row, &id) in u_model.axis_iter(Axis(0)).zip(categories.ids()) {
            let mut target = sums.row_mut(id);
            target += &row;
        }

        let posterior = sums
            .axis_iter(Axis(0))
            .zip(categories.counts())
            .map(|(sum, count)| {
                let n = count as f64;
                let cov_diag = prior.cov_diag.mapv(|psi| psi / (1.0 + n * psi));
                let mean = &sum * &cov_diag;
                GaussianParams::new(mean, cov_diag)
            })
            .collect();
        Ok(posterior)
    }

    fn posterior_predictive(&self, posterior: &[GaussianParams]) -> Vec<GaussianParams> {
        posterior
            .iter()
            .map(|params| GaussianParams::new(params.mean.clone(), &params.cov_diag + 1.0))
            .collect()
    }
}
