//! Calibration of glacier mass balance parameters against observations.
//!
//! Two calibration strategies are provided:
//! - `mcmc`: Bayesian calibration with an affine-invariant ensemble sampler, followed by
//!   stratified sampling of a parameter ensemble from the posterior
//! - `optimize`: bounded Nelder–Mead minimisation of the z-score misfit, widening the
//!   parameter bounds over up to three rounds
//!
//! # Module Organisation
//!
//! - `distribution`, `parameter_set`, `priors`: prior distributions of the free parameters
//! - `target`, `likelihood`: observations and the Gaussian likelihood
//! - `model_runner`: evaluation of the glacier model for a vector of free parameters
//! - `sampler`: the ensemble sampler, chains and convergence diagnostics
//! - `ensemble`: stratified selection of posterior draws
//! - `observations`: loading mass balance observations and mapping them onto the model
//!   time axis and elevation bins

pub mod distribution;
pub mod ensemble;
pub mod error;
pub mod likelihood;
pub mod mcmc;
pub mod model_runner;
pub mod observations;
pub mod optimize;
pub mod parameter_set;
pub mod priors;
pub mod sampler;
pub mod target;

#[cfg(test)]
mod testing;

pub use distribution::{Distribution, Normal, TruncatedNormal, Uniform};
pub use error::{Error, Result};
pub use likelihood::{GaussianLikelihood, LikelihoodFn, ModelOutput, VariableOutput};
pub use mcmc::{calibrate_glacier, CalibratedEnsemble, EnsembleMember, McmcSettings};
pub use model_runner::{GlacierRunner, ModelRunner};
pub use observations::{load_observations, MassBalanceObservation, ObservationType};
pub use optimize::{optimise_glacier, GlacierProblem, OptimisationResult, OptimisationSettings};
pub use parameter_set::ParameterSet;
pub use priors::PriorConfig;
pub use sampler::{Chain, EnsembleSampler, WalkerInit};
pub use target::Target;
