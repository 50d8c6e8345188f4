use faer::diag::DiagRef;
use faer::linalg::solvers;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
    #[error("Eigendecomposition requires a square matrix, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

/// Zero-copy faer view over an ndarray matrix when the memory layout allows
/// it, otherwise an owned copy.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let borrowed = array.as_slice_memory_order().and_then(|slice| {
            if array.is_standard_layout() {
                Some(MatRef::from_row_major_slice(slice, rows, cols))
            } else if array.t().is_standard_layout() {
                Some(MatRef::from_column_major_slice(slice, rows, cols))
            } else {
                None
            }
        });
        let storage = match borrowed {
            Some(view) => FaerStorage::Borrowed(view),
            None => FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.storage {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

pub trait FaerEigh {
    /// Eigenvalues in ascending order with the matching eigenvectors as columns.
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigh for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
        let (rows, cols) = self.dim();
        if rows != cols {
            return Err(FaerLinalgError::NotSquare { rows, cols });
        }
        let faer_view = FaerArrayView::new(self);
        let eigen = faer_view
            .as_ref()
            .self_adjoint_eigen(side)
            .map_err(FaerLinalgError::SelfAdjointEigen)?;
        let values = diag_to_array(eigen.S());
        let vectors = mat_to_array(eigen.U());
        Ok((values, vectors))
    }
}

/// Eigenpairs of a symmetric matrix sorted by decreasing eigenvalue.
pub fn descending_eigh(
    matrix: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
    let (values, vectors) = matrix.eigh(Side::Lower)?;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| {
        values[j]
            .partial_cmp(&values[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let sorted_values = Array1::from_iter(order.iter().map(|&idx| values[idx]));
    let sorted_vectors = vectors.select(ndarray::Axis(1), &order);
    Ok((sorted_values, sorted_vectors))
}

/// Numerical rank of a symmetric matrix.
///
/// For a symmetric matrix the singular values are the absolute eigenvalues,
/// so this uses the usual SVD rank cutoff `max|λ| * n * eps`.
pub fn symmetric_rank(matrix: &Array2<f64>) -> Result<usize, FaerLinalgError> {
    let n = matrix.nrows();
    if n == 0 {
        return Ok(0);
    }
    let (values, _) = matrix.eigh(Side::Lower)?;
    let largest = values.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    let tolerance = largest * n as f64 * f64::EPSILON;
    Ok(values.iter().filter(|&&v| v.abs() > tolerance).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_psd(n: usize, rank: usize, rng: &mut StdRng) -> Array2<f64> {
        let mut mat = Array2::zeros((rank, n));
        for i in 0..rank {
            for j in 0..n {
                mat[(i, j)] = rng.gen_range(-1.0..1.0);
            }
        }
        mat.t().dot(&mat)
    }

    #[test]
    fn eigh_reconstructs_symmetric_matrix() {
        let matrix = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let (values, vectors) = matrix.eigh(Side::Lower).unwrap();
        let rebuilt = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (a, b) in rebuilt.iter().zip(matrix.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn descending_eigh_orders_values() {
        let matrix = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let (values, vectors) = descending_eigh(&matrix).unwrap();
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[(1, 0)].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn symmetric_rank_detects_deficiency() {
        let mut rng = StdRng::seed_from_u64(7);
        let matrix = random_psd(12, 5, &mut rng);
        assert_eq!(symmetric_rank(&matrix).unwrap(), 5);
        assert_eq!(symmetric_rank(&Array2::<f64>::eye(4)).unwrap(), 4);
        assert_eq!(symmetric_rank(&Array2::<f64>::zeros((3, 3))).unwrap(), 0);
    }

    #[test]
    fn eigh_rejects_rectangular_input() {
        let matrix = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            matrix.eigh(Side::Lower),
            Err(FaerLinalgError::NotSquare { rows: 2, cols: 3 })
        ));
    }
}
