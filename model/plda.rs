use crate::error::PldaError;
use crate::estimate::Estimators;
use crate::params::{BayesParams, FittedState, GaussianParams, ModelParams};
use crate::space::Space;
use ndarray::{Array2, ArrayBase, Data, Dimension};
use std::fmt::Debug;
use std::hash::Hash;

/// Probabilistic linear discriminant analysis model.
///
/// The model is unusable until [`PldaModel::fit`] succeeds (or it is built
/// from explicit parameters with [`PldaModel::from_parameters`]); every query
/// before that fails with [`PldaError::NotFitted`]. A fit replaces all
/// parameters at once. Queries only read the parameters, so a fitted model
/// can be shared across threads as long as nobody refits it concurrently.
#[derive(Debug, Clone)]
pub struct PldaModel<L> {
    pub(crate) estimators: Estimators,
    pub(crate) state: Option<FittedState<L>>,
}

impl<L> Default for PldaModel<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> PldaModel<L> {
    pub fn new() -> Self {
        Self::with_estimators(Estimators::default())
    }

    /// A model driven by the given collaborator strategies.
    pub fn with_estimators(estimators: Estimators) -> Self {
        Self {
            estimators,
            state: None,
        }
    }

    pub fn estimators(&self) -> &Estimators {
        &self.estimators
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn fitted(&self) -> Result<&FittedState<L>, PldaError> {
        self.state.as_ref().ok_or(PldaError::NotFitted)
    }

    pub fn params(&self) -> Result<&ModelParams, PldaError> {
        Ok(&self.fitted()?.params)
    }

    pub fn prior_params(&self) -> Result<&GaussianParams, PldaError> {
        Ok(&self.fitted()?.bayes.prior)
    }

    /// Categories seen at fit time, in order of first appearance.
    pub fn categories(&self) -> Result<&[L], PldaError> {
        Ok(&self.fitted()?.categories)
    }

    pub fn bayes_params(&self) -> Result<&BayesParams<L>, PldaError> {
        Ok(&self.fitted()?.bayes)
    }

    pub fn get_dimensionality(&self, space: Space) -> Result<usize, PldaError> {
        Ok(self.params()?.dimensionality(space))
    }

    /// Expresses `data` (a single vector or a batch with one row per sample)
    /// in `to_space`. A single vector comes back as a batch of one.
    pub fn transform<S, D>(
        &self,
        data: &ArrayBase<S, D>,
        from_space: Space,
        to_space: Space,
    ) -> Result<Array2<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        self.params()?.transform(data, from_space, to_space)
    }

    /// [`PldaModel::transform`] with space names, e.g. `"D"` or `"U_model"`.
    pub fn transform_named<S, D>(
        &self,
        data: &ArrayBase<S, D>,
        from_space: &str,
        to_space: &str,
    ) -> Result<Array2<f64>, PldaError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let from_space: Space = from_space.parse()?;
        let to_space: Space = to_space.parse()?;
        self.transform(data, from_space, to_space)
    }
}

impl<L> PldaModel<L>
where
    L: Eq + Hash + Clone + Debug,
{
    /// Builds a fitted model from explicit parameters after checking that
    /// every Bayesian parameter set spans the model subspace.
    pub fn from_parameters(params: ModelParams, bayes: BayesParams<L>) -> Result<Self, PldaError> {
        bayes
            .validate(params.dimensionality(Space::UModel))
            .map_err(|err| PldaError::Configuration(err.to_string()))?;
        let categories = bayes.posterior.keys().cloned().collect();
        Ok(Self {
            estimators: Estimators::default(),
            state: Some(FittedState {
                params,
                bayes,
                categories,
            }),
        })
    }

    pub fn posterior_params(&self, category: &L) -> Result<&GaussianParams, PldaError> {
        self.fitted()?
            .bayes
            .posterior
            .get(category)
            .ok_or_else(|| PldaError::UnknownCategory(format!("{category:?}")))
    }

    pub fn posterior_predictive_params(&self, category: &L) -> Result<&GaussianParams, PldaError> {
        self.fitted()?
            .bayes
            .posterior_predictive
            .get(category)
            .ok_or_else(|| PldaError::UnknownCategory(format!("{category:?}")))
    }
}
