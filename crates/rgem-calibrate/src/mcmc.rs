//! Bayesian calibration of a glacier against a mass balance observation.
//!
//! The posterior of the precipitation factor, temperature bias and degree-day factor of
//! snow is sampled with the ensemble sampler. When the posterior mass balance misses the
//! observation, the chain is rerun once with priors shifted towards parameter values
//! that move the mass balance in the right direction. An ensemble spanning the posterior
//! of the mass balance is then drawn by stratified sampling.

use crate::ensemble::stratified_sample;
use crate::likelihood::GaussianLikelihood;
use crate::model_runner::{GlacierRunner, ModelRunner, MASS_BALANCE_VARIABLE};
use crate::priors::PriorConfig;
use crate::sampler::{
    seeded_rng, Chain, EnsembleSampler, ProgressInfo, WalkerInit, ENSEMBLE_DRAW_STREAM,
};
use crate::{Error, Result, Target};
use indexmap::IndexMap;
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rgem_core::parameters::ModelParameters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Settings of the Markov chain Monte Carlo calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmcSettings {
    /// Iterations of every walker
    /// default: 1000
    pub iterations: usize,
    /// Iterations discarded as burn-in
    /// default: 200
    pub burn: usize,
    /// Store every `thin`-th iteration
    /// default: 1
    pub thin: usize,
    /// Number of walkers, even
    /// default: 32
    pub n_walkers: usize,
    /// Number of parameter sets in the calibrated ensemble
    /// default: 100
    pub ensemble_size: usize,
    /// Distance between modelled and observed mass balance that triggers a rerun with
    /// shifted priors
    /// unit: m w.e. a^-1
    /// default: 0.1
    pub shift_threshold: f64,
    /// Seed for reproducible calibrations
    /// default: none
    pub seed: Option<u64>,
    pub priors: PriorConfig,
}

impl Default for McmcSettings {
    fn default() -> Self {
        Self {
            iterations: 1000,
            burn: 200,
            thin: 1,
            n_walkers: 32,
            ensemble_size: 100,
            shift_threshold: 0.1,
            seed: None,
            priors: PriorConfig::default(),
        }
    }
}

/// One parameter set of a calibrated ensemble with its modelled mass balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    #[serde(flatten)]
    pub parameters: ModelParameters,
    /// Modelled mass balance over the observed period (m w.e. a^-1)
    pub massbal: f64,
}

/// Calibrated parameter ensemble of one glacier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedEnsemble {
    pub rgi_id: String,
    pub glacier_number: String,
    /// Members in increasing order of mass balance
    pub rows: Vec<EnsembleMember>,
    /// Observed mass balance (m w.e. a^-1)
    pub observed: f64,
    pub observed_error: f64,
    pub ensemble_mean: f64,
    /// Population standard deviation of the members' mass balance
    pub ensemble_std: f64,
    /// Whether the priors were shifted
    pub shifted: bool,
}

impl CalibratedEnsemble {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn parameters(&self) -> Vec<ModelParameters> {
        self.rows.iter().map(|r| r.parameters).collect()
    }
}

fn mean(values: &Array1<f64>) -> f64 {
    values.mean().unwrap_or(f64::NAN)
}

/// Posterior draws after burn-in with the mass balance of each draw.
///
/// Draws whose model run failed have no mass balance and are dropped.
fn posterior_traces(chain: &Chain, discard: usize) -> IndexMap<String, Array1<f64>> {
    let params = chain.to_param_map(discard);
    let massbal = chain.flat_blobs(discard);
    let keep: Vec<usize> = (0..massbal.len())
        .filter(|&i| massbal[i].is_finite())
        .collect();

    let mut traces: IndexMap<String, Array1<f64>> = params
        .into_iter()
        .map(|(name, trace)| (name, keep.iter().map(|&i| trace[i]).collect()))
        .collect();
    traces.insert(
        MASS_BALANCE_VARIABLE.to_string(),
        keep.iter().map(|&i| massbal[i]).collect(),
    );
    traces
}

fn sample_posterior(
    runner: GlacierRunner,
    target: &Target,
    priors: &PriorConfig,
    settings: &McmcSettings,
) -> Result<IndexMap<String, Array1<f64>>> {
    let mut sampler =
        EnsembleSampler::new(priors.parameter_set()?, runner, GaussianLikelihood, target.clone());
    if let Some(seed) = settings.seed {
        sampler = sampler.with_seed(seed);
    }

    let chain = sampler.run_with_walkers(
        settings.iterations,
        WalkerInit::FromPrior,
        settings.n_walkers,
        settings.thin,
        None::<fn(&ProgressInfo)>,
    )?;
    let discard = settings.burn / settings.thin.max(1);
    debug!(
        "Stored {} iterations, R-hat after burn-in {:?}",
        chain.len(),
        chain.r_hat(discard)
    );
    Ok(posterior_traces(&chain, discard))
}

/// Calibrate one glacier against the observation of its runner.
///
/// # Arguments
///
/// * `runner` - Model of the glacier and the observation to calibrate against
/// * `settings` - Chain lengths, ensemble size and priors
///
/// # Returns
///
/// The calibrated ensemble, with the non-calibrated parameters taken from the runner.
pub fn calibrate_glacier(
    runner: GlacierRunner,
    settings: &McmcSettings,
) -> Result<CalibratedEnsemble> {
    let observation = runner.observation().clone();
    let observed = observation.observed_rate();
    let observed_error = observation.observed_rate_error();

    let mut target = Target::new();
    target
        .add_variable(MASS_BALANCE_VARIABLE)
        .add(observation.t2, observed, observed_error)?;

    let mut traces = sample_posterior(runner.clone(), &target, &settings.priors, settings)?;
    let first_mean = traces
        .get(MASS_BALANCE_VARIABLE)
        .map(mean)
        .unwrap_or(f64::NAN);

    let mut shifted = false;
    let miss = (first_mean - observed).abs();
    if miss.is_nan() || miss > settings.shift_threshold {
        let too_positive = first_mean > observed;
        let precfactor_mean = traces.get("precfactor").map(mean).unwrap_or(0.0);
        let tempchange_mean = traces.get("tempchange").map(mean).unwrap_or(0.0);
        let priors = settings
            .priors
            .shifted(too_positive, precfactor_mean, tempchange_mean);
        debug!(
            "{}: modelled {:.3} vs observed {:.3} m w.e. a-1, rerunning with shifted priors",
            observation.rgi_id, first_mean, observed
        );
        traces = sample_posterior(runner.clone(), &target, &priors, settings)?;
        shifted = true;
    }

    let n_draws = traces.get(MASS_BALANCE_VARIABLE).map_or(0, |t| t.len());
    if n_draws < settings.ensemble_size {
        return Err(Error::SamplingError(format!(
            "{}: only {} valid posterior draws for an ensemble of {}",
            observation.rgi_id, n_draws, settings.ensemble_size
        )));
    }

    let mut rng = match settings.seed {
        Some(seed) => seeded_rng(seed, ENSEMBLE_DRAW_STREAM, 0),
        None => ChaCha8Rng::from_entropy(),
    };
    let sample = stratified_sample(
        &traces,
        MASS_BALANCE_VARIABLE,
        settings.ensemble_size,
        &mut rng,
    )?;

    let mut rows = Vec::with_capacity(settings.ensemble_size);
    for i in 0..settings.ensemble_size {
        let free: Vec<f64> = runner
            .param_names()
            .iter()
            .map(|name| sample.get(name).map_or(f64::NAN, |t| t[i]))
            .collect();
        rows.push(EnsembleMember {
            parameters: runner.model_parameters(&free)?,
            massbal: sample[MASS_BALANCE_VARIABLE][i],
        });
    }

    let massbal = &sample[MASS_BALANCE_VARIABLE];
    let ensemble_mean = mean(massbal);
    let ensemble_std = massbal.std(0.0);
    info!(
        "{}: observed {:.2} ± {:.2}, ensemble {:.2} ± {:.2} m w.e. a-1",
        observation.rgi_id, observed, observed_error, ensemble_mean, ensemble_std
    );
    if (ensemble_mean - observed).abs() > settings.shift_threshold {
        warn!(
            "{}: ensemble mean mass balance {:.2} is still more than {} from the observed {:.2}",
            observation.rgi_id, ensemble_mean, settings.shift_threshold, observed
        );
    }

    Ok(CalibratedEnsemble {
        rgi_id: observation.rgi_id,
        glacier_number: observation.glacier_number,
        rows,
        observed,
        observed_error,
        ensemble_mean,
        ensemble_std,
        shifted,
    })
}
