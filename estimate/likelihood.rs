//! Maximum-likelihood PLDA parameters in the closed form of Ioffe (2006),
//! "Probabilistic Linear Discriminant Analysis".
//!
//! The generalized eigenvectors `W` of `S_b w = λ S_w w` simultaneously
//! diagonalize both scatter matrices. With `n` the average category size:
//!
//! * `A = W⁻ᵀ · diag(sqrt(n / (n - 1) · Λ_w))` maps the latent space U to X,
//! * `Ψ = max(0, (n - 1) / n · Λ_b / Λ_w - 1 / n)` is the between-category
//!   variance along each latent axis,
//! * the within-category variance in U is the identity.

use super::faer_ndarray::FaerEigh;
use super::{
    CategoryAssignments, ClassScatter, EstimateError, LikelihoodEstimator, ScatterEstimator,
};
use crate::params::LatentGeometry;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::sync::Arc;

/// Relative eigenvalue floor below which the within-category scatter is
/// treated as singular.
pub const WITHIN_SCATTER_EPSILON: f64 = 1.0e-10;

#[derive(Clone)]
pub struct IoffeEstimator {
    scatter: Arc<dyn ScatterEstimator>,
}

impl Default for IoffeEstimator {
    fn default() -> Self {
        Self::new(Arc::new(ClassScatter))
    }
}

impl IoffeEstimator {
    pub fn new(scatter: Arc<dyn ScatterEstimator>) -> Self {
        Self { scatter }
    }
}

/// Symmetric part of a matrix, used to clean up round-off before an
/// eigendecomposition.
fn symmetrize(matrix: &Array2<f64>) -> Array2<f64> {
    (matrix + &matrix.t()) * 0.5
}

/// Generalized eigenvectors of `(between, within)`, normalized so that
/// `Wᵀ S_w W = I`. Returns the eigenvalues, `W` and the factors needed to
/// form `W⁻ᵀ` without a general inverse.
struct GeneralizedEigen {
    values: Array1<f64>,
    vectors: Array2<f64>,
    inverse_transpose: Array2<f64>,
}

fn generalized_eigen(
    between: &Array2<f64>,
    within: &Array2<f64>,
) -> Result<GeneralizedEigen, EstimateError> {
    let (within_values, within_vectors) = symmetrize(within).eigh(Side::Lower)?;
    let largest = within_values.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    let floor = largest.max(f64::MIN_POSITIVE) * WITHIN_SCATTER_EPSILON;
    if let Some(&smallest) = within_values.iter().find(|&&v| v <= floor) {
        return Err(EstimateError::SingularWithinScatter {
            eigenvalue: smallest,
        });
    }

    // S_w = V D Vᵀ, whitening by V D^{-1/2} turns the problem into an
    // ordinary symmetric one.
    let inv_sqrt = within_values.mapv(|v| v.sqrt().recip());
    let sqrt = within_values.mapv(f64::sqrt);
    let whitening = &within_vectors * &inv_sqrt;
    let reduced = symmetrize(&whitening.t().dot(between).dot(&whitening));
    let (values, rotation) = reduced.eigh(Side::Lower)?;

    let vectors = whitening.dot(&rotation);
    // (V D^{-1/2} E)^{-T} = V D^{1/2} E since V and E are orthogonal.
    let inverse_transpose = (&within_vectors * &sqrt).dot(&rotation);
    Ok(GeneralizedEigen {
        values,
        vectors,
        inverse_transpose,
    })
}

impl LikelihoodEstimator for IoffeEstimator {
    fn fit(
        &self,
        data: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
    ) -> Result<LatentGeometry, EstimateError> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(EstimateError::EmptyInput {
                samples: n_samples,
                features: n_features,
            });
        }
        categories.check_rows(n_samples)?;
        if categories.n_categories() < 2 {
            return Err(EstimateError::TooFewCategories {
                required: 2,
                found: categories.n_categories(),
            });
        }
        let n_avg = n_samples as f64 / categories.n_categories() as f64;
        if n_avg <= 1.0 {
            return Err(EstimateError::SingletonCategories { average: n_avg });
        }
        log::debug!(
            "Estimating PLDA parameters from {n_samples} samples in {} categories (average size {n_avg:.3})",
            categories.n_categories()
        );

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(EstimateError::EmptyInput {
                samples: n_samples,
                features: n_features,
            })?;
        let scatter = self.scatter.scatter(data, categories)?;
        let eigen = generalized_eigen(&scatter.between, &scatter.within)?;

        let lambda_b = eigen
            .vectors
            .t()
            .dot(&scatter.between)
            .dot(&eigen.vectors)
            .diag()
            .to_owned();
        let lambda_w = eigen
            .vectors
            .t()
            .dot(&scatter.within)
            .dot(&eigen.vectors)
            .diag()
            .to_owned();
        log::debug!("Generalized eigenvalues: {:?}", eigen.values);

        let scale = lambda_w.mapv(|w| (n_avg / (n_avg - 1.0) * w).sqrt());
        let loading = &eigen.inverse_transpose * &scale;
        let inverse_loading = &eigen.vectors.t() / &scale.view().insert_axis(Axis(1));

        let psi_diag = ndarray::Zip::from(&lambda_b)
            .and(&lambda_w)
            .map_collect(|&b, &w| ((n_avg - 1.0) / n_avg * b / w - 1.0 / n_avg).max(0.0));
        let relevant_dims: Vec<usize> = psi_diag
            .iter()
            .enumerate()
            .filter(|(_, psi)| **psi > 0.0)
            .map(|(dim, _)| dim)
            .collect();

        let geometry = LatentGeometry {
            mean,
            loading,
            inverse_loading,
            psi_diag,
            relevant_dims,
        };
        geometry.validate()?;
        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// Three well-separated categories along the first axis; the second axis
    /// carries only within-category noise.
    fn separated(rng: &mut StdRng) -> (Array2<f64>, Vec<usize>) {
        let noise = Normal::new(0.0, 0.5).unwrap();
        let centers = [-6.0, 0.0, 6.0];
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (label, center) in centers.iter().enumerate() {
            for _ in 0..40 {
                rows.push(center + noise.sample(rng));
                rows.push(noise.sample(rng));
                labels.push(label);
            }
        }
        (Array2::from_shape_vec((labels.len(), 2), rows).unwrap(), labels)
    }

    #[test]
    fn loading_and_inverse_are_consistent() {
        let mut rng = StdRng::seed_from_u64(11);
        let (data, labels) = separated(&mut rng);
        let (assignments, _) = CategoryAssignments::from_labels(&labels);
        let geometry = IoffeEstimator::default()
            .fit(data.view(), &assignments)
            .unwrap();
        let product = geometry.loading.dot(&geometry.inverse_loading);
        let identity = Array2::<f64>::eye(2);
        for (a, b) in product.iter().zip(identity.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn within_category_covariance_is_whitened() {
        let mut rng = StdRng::seed_from_u64(3);
        let (data, labels) = separated(&mut rng);
        let (assignments, _) = CategoryAssignments::from_labels(&labels);
        let geometry = IoffeEstimator::default()
            .fit(data.view(), &assignments)
            .unwrap();
        let u = (&data - &geometry.mean).dot(&geometry.inverse_loading.t());
        let within = ClassScatter.scatter(u.view(), &assignments).unwrap().within;
        let n_avg = 40.0;
        let expected = (n_avg - 1.0) / n_avg;
        assert_abs_diff_eq!(within[(0, 0)], expected, epsilon = 1e-8);
        assert_abs_diff_eq!(within[(1, 1)], expected, epsilon = 1e-8);
        assert_abs_diff_eq!(within[(0, 1)], 0.0, epsilon = 1e-8);
    }

    #[test]
    fn separated_axis_is_the_only_relevant_dimension() {
        let mut rng = StdRng::seed_from_u64(5);
        let (data, labels) = separated(&mut rng);
        let (assignments, _) = CategoryAssignments::from_labels(&labels);
        let geometry = IoffeEstimator::default()
            .fit(data.view(), &assignments)
            .unwrap();
        assert!(geometry.psi_diag.iter().all(|&psi| psi >= 0.0));
        let strongest = geometry
            .psi_diag
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(strongest > 10.0, "psi = {:?}", geometry.psi_diag);
        assert!(!geometry.relevant_dims.is_empty());
        assert!(geometry.relevant_dims.len() <= 2);
    }

    #[test]
    fn singleton_categories_are_rejected() {
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let (assignments, _) = CategoryAssignments::from_labels(&[0, 1, 2]);
        assert!(matches!(
            IoffeEstimator::default().fit(data.view(), &assignments),
            Err(EstimateError::SingletonCategories { .. })
        ));
    }

    #[test]
    fn single_category_is_rejected() {
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let (assignments, _) = CategoryAssignments::from_labels(&[0, 0, 0]);
        assert!(matches!(
            IoffeEstimator::default().fit(data.view(), &assignments),
            Err(EstimateError::TooFewCategories { found: 1, .. })
        ));
    }

    #[test]
    fn singular_within_scatter_is_rejected() {
        // The third feature duplicates the first.
        let data = array![
            [0.0, 1.0, 0.0],
            [1.0, 0.5, 1.0],
            [4.0, 2.0, 4.0],
            [5.0, 3.5, 5.0]
        ];
        let (assignments, _) = CategoryAssignments::from_labels(&[0, 0, 1, 1]);
        assert!(matches!(
            IoffeEstimator::default().fit(data.view(), &assignments),
            Err(EstimateError::SingularWithinScatter { .. })
        ));
    }
}
