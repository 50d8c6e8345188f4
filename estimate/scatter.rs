use super::{CategoryAssignments, EstimateError, ScatterEstimator, ScatterMatrices};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Per-category means, indexed by category id, and the grand mean.
pub(crate) fn category_means(
    data: ArrayView2<'_, f64>,
    categories: &CategoryAssignments,
) -> (Array2<f64>, Array1<f64>) {
    let n_features = data.ncols();
    let mut sums = Array2::<f64>::zeros((categories.n_categories(), n_features));
    for (row, &id) in data.axis_iter(Axis(0)).zip(categories.ids()) {
        let mut target = sums.row_mut(id);
        target += &row;
    }
    let counts = categories.counts();
    for (mut sum, &count) in sums.axis_iter_mut(Axis(0)).zip(&counts) {
        sum /= count as f64;
    }
    let grand = data.sum_axis(Axis(0)) / data.nrows() as f64;
    (sums, grand)
}

/// Between- and within-category scatter normalized by the total sample count.
///
/// `S_b = Σ_k (n_k / N) (m_k - m)(m_k - m)ᵀ` and
/// `S_w = (1 / N) Σ_k Σ_{i∈k} (x_i - m_k)(x_i - m_k)ᵀ`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassScatter;

impl ScatterEstimator for ClassScatter {
    fn scatter(
        &self,
        data: ArrayView2<'_, f64>,
        categories: &CategoryAssignments,
    ) -> Result<ScatterMatrices, EstimateError> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(EstimateError::EmptyInput {
                samples: n_samples,
                features: n_features,
            });
        }
        categories.check_rows(n_samples)?;

        let (means, grand) = category_means(data, categories);
        let total = n_samples as f64;

        let mut offsets = &means - &grand;
        for (mut offset, &count) in offsets.axis_iter_mut(Axis(0)).zip(&categories.counts()) {
            offset *= (count as f64 / total).sqrt();
        }
        let between = offsets.t().dot(&offsets);

        let centered = &data - &means.select(Axis(0), categories.ids());
        let within = centered.t().dot(&centered) / total;

        Ok(ScatterMatrices { between, within })
    }
}
