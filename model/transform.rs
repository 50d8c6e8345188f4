use crate::error::PldaError;
use crate::estimate::ProjectionBasis;
use crate::params::ModelParams;
use crate::space::{Space, Step, space_walk};
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Dimension, Ix1, Ix2};

/// Views a single vector or a `samples x features` batch as a batch.
pub(crate) fn as_batch<S, D>(data: &ArrayBase<S, D>) -> Result<ArrayView2<'_, f64>, PldaError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let view = data.view().into_dyn();
    match view.ndim() {
        1 => view
            .into_dimensionality::<Ix1>()
            .map(|row| row.insert_axis(Axis(0)))
            .map_err(|_| PldaError::Rank(1)),
        2 => view
            .into_dimensionality::<Ix2>()
            .map_err(|_| PldaError::Rank(2)),
        n => Err(PldaError::Rank(n)),
    }
}

pub(crate) fn check_trailing(
    batch: &ArrayView2<'_, f64>,
    space: Space,
    expected: usize,
) -> Result<(), PldaError> {
    if batch.ncols() != expected {
        return Err(PldaError::Shape {
            space,
            expected,
            found: batch.ncols(),
        });
    }
    Ok(())
}

fn d_to_x(
    data: ArrayView2<'_, f64>,
    basis: Option<&dyn ProjectionBasis>,
) -> Result<Array2<f64>, PldaError> {
    match basis {
        Some(basis) => Ok(basis.forward(data)?),
        None => Ok(data.to_owned()),
    }
}

fn x_to_u(
    data: ArrayView2<'_, f64>,
    inverse_loading: &Array2<f64>,
    mean: &Array1<f64>,
) -> Array2<f64> {
    (&data - mean).dot(&inverse_loading.t())
}

fn u_to_u_model(data: ArrayView2<'_, f64>, relevant_dims: &[usize]) -> Array2<f64> {
    data.select(Axis(1), relevant_dims)
}

/// Embeds model-subspace coordinates into U; the discarded axes are zero.
fn u_model_to_u(
    data: ArrayView2<'_, f64>,
    relevant_dims: &[usize],
    latent_dim: usize,
) -> Array2<f64> {
    let mut full = Array2::zeros((data.nrows(), latent_dim));
    for (column, &dim) in relevant_dims.iter().enumerate() {
        full.column_mut(dim).assign(&data.column(column));
    }
    full
}

fn u_to_x(data: ArrayView2<'_, f64>, loading: &Array2<f64>, mean: &Array1<f64>) -> Array2<f64> {
    data.dot(&loading.t()) + mean
}

fn x_to_d(
    data: ArrayView2<'_, f64>,
    basis: Option<&dyn ProjectionBasis>,
) -> Result<Array2<f64>, PldaError> {
    match basis {
        Some(basis) => Ok(basis.inverse(data)?),
        None => Ok(data.to_owned()),
    }
}

impl ModelParams {
    /// Dimensionality of `space` under these parameters.
    pub fn dimensionality(&self, space: Space) -> usize {
        match space {
            Space::UModel => self.geometry.relevant_dims.len(),
            Space::U | Space::X => self.geometry.latent_dim(),
            Space::D => match &self.basis {
                Some(basis) => basis.input_dim(),
                None => self.geometry.mean.len(),
            },
        }
    }

    /// Moves `data` from `from` to `to`, applying each elementary step on the
    /// path between them in order.
    pub fn transform<S, D>(
        &self,
        data: &ArrayBase<S, D>,
        from: Space,
        to: Space,
    ) -> Result<Array2<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let batch = as_batch(data)?;
        check_trailing(&batch, from, self.dimensionality(from))?;

        let mut current = batch.to_owned();
        for step in space_walk(from, to) {
            current = self.apply(step, current.view())?;
        }
        Ok(current)
    }

    fn apply(&self, step: Step, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, PldaError> {
        let geometry = &self.geometry;
        let basis = self.basis.as_deref();
        match step {
            Step::DToX => d_to_x(data, basis),
            Step::XToU => Ok(x_to_u(data, &geometry.inverse_loading, &geometry.mean)),
            Step::UToUModel => Ok(u_to_u_model(data, &geometry.relevant_dims)),
            Step::UModelToU => Ok(u_model_to_u(
                data,
                &geometry.relevant_dims,
                geometry.latent_dim(),
            )),
            Step::UToX => Ok(u_to_x(data, &geometry.loading, &geometry.mean)),
            Step::XToD => x_to_d(data, basis),
        }
    }
}
