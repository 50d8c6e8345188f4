use crate::error::PldaError;
use crate::estimate::faer_ndarray::symmetric_rank;
use crate::estimate::{CategoryAssignments, EstimateError, ProjectionBasis};
use crate::params::{BayesParams, FittedState, ModelParams};
use crate::plda::PldaModel;
use crate::space::Space;
use ndarray::ArrayView2;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// How the raw data space D is mapped onto the decorrelated space X.
#[derive(Clone, Default)]
pub enum Reduction {
    /// Fit a new basis whose size is the rank of the within-category scatter,
    /// unless `feat_dim` overrides it.
    #[default]
    Estimate,
    /// No reduction: D and X coincide.
    Skip,
    /// Reuse an already fitted basis as is.
    Supplied(Arc<dyn ProjectionBasis>),
}

impl fmt::Debug for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Estimate => f.write_str("Estimate"),
            Self::Skip => f.write_str("Skip"),
            Self::Supplied(basis) => f.debug_tuple("Supplied").field(basis).finish(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FitOptions {
    /// Requested dimensionality of X.
    pub feat_dim: Option<usize>,
    pub reduction: Reduction,
}

impl FitOptions {
    pub fn with_feat_dim(mut self, feat_dim: usize) -> Self {
        self.feat_dim = Some(feat_dim);
        self
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }
}

impl<L> PldaModel<L>
where
    L: Eq + Hash + Clone + Debug,
{
    /// Fits the model on `data` (one row per sample) with one label per row.
    ///
    /// All parameters are computed first and swapped in together; on any
    /// error the model keeps whatever state it had before the call.
    pub fn fit(
        &mut self,
        data: ArrayView2<'_, f64>,
        labels: &[L],
        options: &FitOptions,
    ) -> Result<(), PldaError> {
        let state = self.estimate_state(data, labels, options)?;
        self.state = Some(state);
        Ok(())
    }

    fn estimate_state(
        &self,
        data: ArrayView2<'_, f64>,
        labels: &[L],
        options: &FitOptions,
    ) -> Result<FittedState<L>, PldaError> {
        if labels.len() != data.nrows() {
            return Err(PldaError::LabelCount {
                samples: data.nrows(),
                labels: labels.len(),
            });
        }
        let (assignments, categories) = CategoryAssignments::from_labels(labels);

        let basis = self.resolve_reduction(data, &assignments, options)?;
        let data_dim = data.ncols();
        match &basis {
            None => log::warn!(
                "Skipping projection and decorrelation; X keeps the data dimensionality {data_dim}"
            ),
            Some(basis) if basis.output_dim() == data_dim => {
                log::info!("Projection keeps {data_dim} features and decorrelates them")
            }
            Some(basis) => log::info!(
                "Projection reduces {data_dim} features to {} and decorrelates them",
                basis.output_dim()
            ),
        }

        let x = match &basis {
            Some(basis) => basis.forward(data)?,
            None => data.to_owned(),
        };

        let geometry = self.estimators.likelihood.fit(x.view(), &assignments)?;
        geometry.validate()?;
        let params = ModelParams::new(basis, geometry)?;
        if params.relevant_dims().is_empty() {
            log::warn!("No latent dimension carries between-category variance; U_model is empty");
        }
        log::info!(
            "Latent space has {} dimensions, {} of them relevant",
            params.dimensionality(Space::U),
            params.dimensionality(Space::UModel)
        );

        let u_model = params.transform(&x, Space::X, Space::UModel)?;
        let bayes = &self.estimators.bayes;
        let prior = bayes.prior(params.geometry().psi_diag.view(), params.relevant_dims())?;
        let posterior = bayes.posterior(u_model.view(), &assignments, &prior)?;
        let posterior_predictive = bayes.posterior_predictive(&posterior);

        let bayes =
            BayesParams::from_categories(prior, &categories, posterior, posterior_predictive)?;
        bayes.validate(params.dimensionality(Space::UModel))?;

        Ok(FittedState {
            params,
            bayes,
            categories,
        })
    }

    fn resolve_reduction(
        &self,
        data: ArrayView2<'_, f64>,
        assignments: &CategoryAssignments,
        options: &FitOptions,
    ) -> Result<Option<Arc<dyn ProjectionBasis>>, PldaError> {
        let data_dim = data.ncols();
        let feat_dim = options.feat_dim;

        let basis = match &options.reduction {
            Reduction::Estimate => {
                if let Some(requested) = feat_dim {
                    if requested == 0 || requested > data_dim {
                        return Err(PldaError::Configuration(format!(
                            "feat_dim={requested} must lie in 1..={data_dim} for a fitted projection"
                        )));
                    }
                }
                log::info!("Estimating a new projection basis");
                let scatter = self.estimators.scatter.scatter(data, assignments)?;
                let rank = symmetric_rank(&scatter.within).map_err(EstimateError::from)?;
                let components = match feat_dim {
                    Some(requested) if requested != rank => {
                        log::warn!(
                            "Estimated feature dimensionality is {rank}; using feat_dim={requested}"
                        );
                        requested
                    }
                    _ => rank,
                };
                Some(self.estimators.basis.fit(data, components)?)
            }
            Reduction::Skip => None,
            Reduction::Supplied(basis) => {
                if let Some(requested) = feat_dim {
                    if basis.output_dim() != requested {
                        return Err(PldaError::Configuration(format!(
                            "the supplied basis produces {} features but feat_dim={requested} was requested",
                            basis.output_dim()
                        )));
                    }
                }
                if basis.input_dim() != data_dim {
                    return Err(PldaError::Configuration(format!(
                        "the supplied basis expects {} features but the data has {data_dim}",
                        basis.input_dim()
                    )));
                }
                Some(Arc::clone(basis))
            }
        };

        if let Some(requested) = feat_dim {
            if requested != data_dim && basis.is_none() {
                return Err(PldaError::Configuration(format!(
                    "feat_dim={requested} differs from the data dimensionality {data_dim}, which requires a projection basis"
                )));
            }
        }
        Ok(basis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{
        BasisFitter, BayesianEstimator, ConjugateGaussian, Estimators, LikelihoodEstimator,
        PcaFitter,
    };
    use crate::params::{GaussianParams, LatentGeometry};
    use ndarray::{Array1, Array2, ArrayView1, array};

    /// Identity geometry with the first latent axis relevant.
    struct FixedGeometry;

    impl LikelihoodEstimator for FixedGeometry {
        fn fit(
            &self,
            data: ArrayView2<'_, f64>,
            categories: &CategoryAssignments,
        ) -> Result<LatentGeometry, EstimateError> {
            assert_eq!(categories.len(), data.nrows());
            let dim = data.ncols();
            let mut psi_diag = Array1::zeros(dim);
            psi_diag[0] = 1.0;
            Ok(LatentGeometry {
                mean: Array1::zeros(dim),
                loading: Array2::eye(dim),
                inverse_loading: Array2::eye(dim),
                psi_diag,
                relevant_dims: vec![0],
            })
        }
    }

    /// Prior with the wrong length, to exercise validation after estimation.
    struct BrokenPrior;

    impl BayesianEstimator for BrokenPrior {
        fn prior(
            &self,
            psi_diag: ArrayView1<'_, f64>,
            relevant_dims: &[usize],
        ) -> Result<GaussianParams, EstimateError> {
            let len = relevant_dims.len() + psi_diag.len();
            Ok(GaussianParams::new(Array1::zeros(len), Array1::ones(len)))
        }

        fn posterior(
            &self,
            u_model: ArrayView2<'_, f64>,
            categories: &CategoryAssignments,
            prior: &GaussianParams,
        ) -> Result<Vec<GaussianParams>, EstimateError> {
            categories.check_rows(u_model.nrows())?;
            Ok(vec![prior.clone(); categories.n_categories()])
        }

        fn posterior_predictive(&self, posterior: &[GaussianParams]) -> Vec<GaussianParams> {
            ConjugateGaussian.posterior_predictive(posterior)
        }
    }

    fn stub_estimators() -> Estimators {
        Estimators {
            likelihood: Arc::new(FixedGeometry),
            ..Estimators::default()
        }
    }

    fn data() -> (Array2<f64>, Vec<&'static str>) {
        let data = array![
            [1.0, 0.1, 2.0],
            [1.2, -0.1, 2.1],
            [-1.0, 0.3, 1.9],
            [-1.1, -0.2, 2.2]
        ];
        (data, vec!["a", "a", "b", "b"])
    }

    #[test]
    fn stub_estimator_drives_fit() {
        let (data, labels) = data();
        let mut model = PldaModel::with_estimators(stub_estimators());
        let options = FitOptions::default().with_reduction(Reduction::Skip);
        model.fit(data.view(), &labels, &options).unwrap();
        assert_eq!(model.get_dimensionality(Space::UModel).unwrap(), 1);
        assert_eq!(model.get_dimensionality(Space::D).unwrap(), 3);
        assert_eq!(model.categories().unwrap(), &["a", "b"]);

        // Posterior for "a": n = 2, psi = 1 -> cov 1/3, mean (1.0 + 1.2) / 3.
        let posterior = model.posterior_params(&"a").unwrap();
        approx::assert_abs_diff_eq!(posterior.cov_diag[0], 1.0 / 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(posterior.mean[0], 2.2 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn label_count_must_match_rows() {
        let (data, _) = data();
        let mut model = PldaModel::with_estimators(stub_estimators());
        let err = model
            .fit(data.view(), &["a", "b"], &FitOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PldaError::LabelCount {
                samples: 4,
                labels: 2
            }
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn skip_with_different_feat_dim_is_rejected() {
        let (data, labels) = data();
        let mut model = PldaModel::with_estimators(stub_estimators());
        let options = FitOptions::default()
            .with_reduction(Reduction::Skip)
            .with_feat_dim(2);
        assert!(matches!(
            model.fit(data.view(), &labels, &options),
            Err(PldaError::Configuration(_))
        ));

        let options = FitOptions::default()
            .with_reduction(Reduction::Skip)
            .with_feat_dim(3);
        assert!(model.fit(data.view(), &labels, &options).is_ok());
    }

    #[test]
    fn estimated_reduction_rejects_out_of_range_feat_dim() {
        let (data, labels) = data();
        let mut model = PldaModel::with_estimators(stub_estimators());
        for feat_dim in [0, 4] {
            let options = FitOptions::default().with_feat_dim(feat_dim);
            assert!(matches!(
                model.fit(data.view(), &labels, &options),
                Err(PldaError::Configuration(_))
            ));
        }
        assert!(!model.is_fitted());

        let options = FitOptions::default().with_feat_dim(3);
        model.fit(data.view(), &labels, &options).unwrap();
        assert_eq!(model.get_dimensionality(Space::X).unwrap(), 3);
    }

    #[test]
    fn supplied_basis_must_agree_with_options_and_data() {
        let (data, labels) = data();
        let basis = PcaFitter.fit(data.view(), 2).unwrap();
        let mut model = PldaModel::with_estimators(stub_estimators());

        let options = FitOptions::default()
            .with_reduction(Reduction::Supplied(basis.clone()))
            .with_feat_dim(3);
        assert!(matches!(
            model.fit(data.view(), &labels, &options),
            Err(PldaError::Configuration(_))
        ));

        let narrow = data.slice(ndarray::s![.., ..2]).to_owned();
        let options = FitOptions::default().with_reduction(Reduction::Supplied(basis.clone()));
        assert!(matches!(
            model.fit(narrow.view(), &labels, &options),
            Err(PldaError::Configuration(_))
        ));

        let options = FitOptions::default()
            .with_reduction(Reduction::Supplied(basis))
            .with_feat_dim(2);
        model.fit(data.view(), &labels, &options).unwrap();
        assert_eq!(model.get_dimensionality(Space::X).unwrap(), 2);
        assert_eq!(model.get_dimensionality(Space::D).unwrap(), 3);
    }

    #[test]
    fn failed_fit_keeps_previous_parameters() {
        let (data, labels) = data();
        let mut model = PldaModel::with_estimators(stub_estimators());
        let skip = FitOptions::default().with_reduction(Reduction::Skip);
        model.fit(data.view(), &labels, &skip).unwrap();
        let before = model.prior_params().unwrap().clone();

        model.estimators = Estimators {
            bayes: Arc::new(BrokenPrior),
            ..stub_estimators()
        };
        assert!(model.fit(data.view(), &labels, &skip).is_err());
        assert!(model.is_fitted());
        assert_eq!(model.prior_params().unwrap(), &before);
    }

    #[test]
    fn failed_first_fit_leaves_model_unfitted() {
        let (data, labels) = data();
        let mut model: PldaModel<&str> = PldaModel::with_estimators(Estimators {
            bayes: Arc::new(BrokenPrior),
            ..stub_estimators()
        });
        let skip = FitOptions::default().with_reduction(Reduction::Skip);
        assert!(model.fit(data.view(), &labels, &skip).is_err());
        assert!(matches!(
            model.get_dimensionality(Space::U),
            Err(PldaError::NotFitted)
        ));
    }
}
