//! Closed-form Bayesian densities over the model subspace U_model.
//!
//! Every axis of U_model is treated independently: the category mean along
//! axis `j` has prior `N(0, ψ_j)` and observations scatter around it with
//! unit variance.

use crate::error::PldaError;
use crate::params::GaussianParams;
use crate::plda::PldaModel;
use crate::space::Space;
use crate::transform::{as_batch, check_trailing};
use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Dimension, concatenate};
use std::f64::consts::PI;
use std::fmt::Debug;
use std::hash::Hash;

/// Log marginal likelihood of `n` samples sharing one unknown category mean,
/// integrated against the prior variances `psi_diag`.
///
/// Per axis, with `s = Σ x²` and `x̄` the sample mean:
/// `-n/2 ln 2π - 1/2 ln(nψ + 1) - s/2 + n²ψ x̄² / (2(nψ + 1))`.
///
/// Fails with [`PldaError::Shape`] when the sample width differs from the
/// number of prior variances.
pub fn log_marginal_likelihood(
    samples: ArrayView2<'_, f64>,
    psi_diag: ArrayView1<'_, f64>,
) -> Result<f64, PldaError> {
    check_trailing(&samples, Space::UModel, psi_diag.len())?;
    let n = samples.nrows() as f64;
    if samples.nrows() == 0 {
        return Ok(0.0);
    }
    let sum_of_squares = samples.mapv(|x| x * x).sum_axis(Axis(0));
    let sample_mean = samples.sum_axis(Axis(0)) / n;

    let total = ndarray::Zip::from(&psi_diag)
        .and(&sum_of_squares)
        .and(&sample_mean)
        .fold(0.0, |acc, &psi, &squares, &mean| {
            let n_psi_plus_one = n * psi + 1.0;
            let log_constant = -0.5 * n * (2.0 * PI).ln() - 0.5 * n_psi_plus_one.ln();
            let penalty = -0.5 * squares;
            let bonus = 0.5 * n * n * psi * mean * mean / n_psi_plus_one;
            acc + log_constant + penalty + bonus
        });
    Ok(total)
}

impl<L> PldaModel<L>
where
    L: Eq + Hash + Clone + Debug,
{
    fn model_batch<'a, S, D>(
        &self,
        data: &'a ArrayBase<S, D>,
    ) -> Result<ArrayView2<'a, f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let expected = self.get_dimensionality(Space::UModel)?;
        let batch = as_batch(data)?;
        check_trailing(&batch, Space::UModel, expected)?;
        Ok(batch)
    }

    fn logp(
        &self,
        batch: ArrayView2<'_, f64>,
        params: &GaussianParams,
    ) -> Result<Array1<f64>, PldaError> {
        Ok(self.estimators.density.logpdf(batch, params)?)
    }

    /// Log-density of each U_model row under the prior over category means.
    pub fn logp_prior<S, D>(&self, v_model: &ArrayBase<S, D>) -> Result<Array1<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let batch = self.model_batch(v_model)?;
        self.logp(batch, self.prior_params()?)
    }

    /// Log-density of each U_model row under the posterior over `category`'s
    /// mean.
    pub fn logp_posterior<S, D>(
        &self,
        v_model: &ArrayBase<S, D>,
        category: &L,
    ) -> Result<Array1<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let batch = self.model_batch(v_model)?;
        self.logp(batch, self.posterior_params(category)?)
    }

    /// Log-density of each U_model row as a new observation from `category`.
    pub fn logp_posterior_predictive<S, D>(
        &self,
        u_model: &ArrayBase<S, D>,
        category: &L,
    ) -> Result<Array1<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let batch = self.model_batch(u_model)?;
        self.logp(batch, self.posterior_predictive_params(category)?)
    }

    /// Log-probability of the whole batch under a single shared category,
    /// with the category mean integrated out. A single vector counts as a
    /// batch of one sample.
    pub fn logp_marginal_likelihood<S, D>(
        &self,
        u_model: &ArrayBase<S, D>,
    ) -> Result<f64, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let batch = self.model_batch(u_model)?;
        let prior = self.prior_params()?;
        log_marginal_likelihood(batch, prior.cov_diag.view())
    }

    /// Same-versus-different log-likelihood ratio of two batches: positive
    /// values favour one shared category, negative values two independent
    /// ones.
    pub fn same_diff_log_likelihood_ratio<S1, D1, S2, D2>(
        &self,
        u_model_p: &ArrayBase<S1, D1>,
        u_model_g: &ArrayBase<S2, D2>,
    ) -> Result<f64, PldaError>
    where
        S1: Data<Elem = f64>,
        D1: Dimension,
        S2: Data<Elem = f64>,
        D2: Dimension,
    {
        let probe = self.model_batch(u_model_p)?;
        let gallery = self.model_batch(u_model_g)?;
        let psi = &self.prior_params()?.cov_diag;

        let joined = concatenate(Axis(0), &[probe, gallery]).map_err(|_| PldaError::Shape {
            space: Space::UModel,
            expected: probe.ncols(),
            found: gallery.ncols(),
        })?;
        let ll_same = log_marginal_likelihood(joined.view(), psi.view())?;
        let ll_probe = log_marginal_likelihood(probe, psi.view())?;
        let ll_gallery = log_marginal_likelihood(gallery, psi.view())?;
        Ok(ll_same - (ll_probe + ll_gallery))
    }
}
