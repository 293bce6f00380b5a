//! Affine-invariant ensemble sampler.
//!
//! Markov chain Monte Carlo with the stretch move of Goodman & Weare (2010). An ensemble
//! of walkers is split in two halves; each walker of one half proposes a point on the line
//! through itself and a random walker of the other half. Proposals of a half are evaluated
//! in parallel.
//!
//! Besides the parameters, every stored sample carries a "blob": a scalar derived from the
//! model output (for glaciers, the modelled mass balance), so the posterior of the model
//! output is available without rerunning the model.
//!
//! # References
//!
//! Goodman, J., & Weare, J. (2010). Ensemble samplers with affine invariance.
//! Communications in Applied Mathematics and Computational Science, 5(1), 65-80.

use crate::{
    likelihood::LikelihoodFn, model_runner::ModelRunner, parameter_set::ParameterSet,
    target::Target, Error, Result,
};
use indexmap::IndexMap;
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Stream of the generator placing the initial walkers.
pub const WALKER_INIT_STREAM: u64 = 1;
/// Stream of the generator driving the stretch moves.
pub const ITERATION_STREAM: u64 = 2;
/// Stream of the generator drawing the calibrated ensemble from the chain.
pub const ENSEMBLE_DRAW_STREAM: u64 = 3;

/// Words of generator output reserved for each iteration of a resumable run.
const WORDS_PER_ITERATION: u128 = 1 << 32;

/// Generator keyed by `seed` on its own `stream`, positioned `offset` iterations in.
///
/// Different seeds give unrelated keys and different streams never share output, so a
/// seed can be reused for several purposes and adjacent seeds do not overlap.
pub fn seeded_rng(seed: u64, stream: u64, offset: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng.set_word_pos(offset as u128 * WORDS_PER_ITERATION);
    rng
}

/// Progress reported to callbacks after every iteration.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Iteration just completed (0-indexed)
    pub iteration: usize,
    pub total: usize,
    pub acceptance_rate: f64,
    pub mean_log_prob: f64,
}

fn write_bincode<T: Serialize, P: AsRef<Path>>(value: &T, path: P, what: &str) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        Error::SamplingError(format!("Failed to create {} {}: {}", what, path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, value)
        .map_err(|e| Error::SamplingError(format!("Failed to serialize {}: {}", what, e)))?;
    writer
        .flush()
        .map_err(|e| Error::SamplingError(format!("Failed to flush {}: {}", what, e)))
}

fn read_bincode<T: DeserializeOwned, P: AsRef<Path>>(path: P, what: &str) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::SamplingError(format!("Failed to open {} {}: {}", what, path.display(), e))
    })?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| Error::SamplingError(format!("Failed to deserialize {}: {}", what, e)))
}

/// Positions and bookkeeping of the walkers at one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerState {
    /// Shape (n_walkers, n_params)
    pub positions: Array2<f64>,
    /// Log posterior at each position, negative infinity until evaluated
    pub log_probs: Array1<f64>,
    /// Blob at each position
    pub blobs: Array1<f64>,
    pub n_accepted: Array1<usize>,
    pub n_proposed: Array1<usize>,
    pub param_names: Vec<String>,
}

impl SamplerState {
    /// Create a state from initial positions.
    ///
    /// Fails unless there is one name per column and at least two walkers.
    pub fn new(positions: Array2<f64>, param_names: Vec<String>) -> Result<Self> {
        let (n_walkers, n_params) = positions.dim();
        if param_names.len() != n_params {
            return Err(Error::SamplingError(format!(
                "{} parameter names for positions with {} columns",
                param_names.len(),
                n_params
            )));
        }
        if n_walkers < 2 {
            return Err(Error::SamplingError(
                "Ensemble sampling needs at least 2 walkers".to_string(),
            ));
        }

        Ok(Self {
            positions,
            log_probs: Array1::from_elem(n_walkers, f64::NEG_INFINITY),
            blobs: Array1::from_elem(n_walkers, f64::NAN),
            n_accepted: Array1::zeros(n_walkers),
            n_proposed: Array1::zeros(n_walkers),
            param_names,
        })
    }

    pub fn n_walkers(&self) -> usize {
        self.positions.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.positions.ncols()
    }

    /// Fraction of accepted proposals of each walker, 0 before any proposal.
    pub fn acceptance_fraction(&self) -> Array1<f64> {
        self.n_accepted
            .iter()
            .zip(self.n_proposed.iter())
            .map(|(&accepted, &proposed)| {
                if proposed > 0 {
                    accepted as f64 / proposed as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn mean_acceptance_rate(&self) -> f64 {
        let proposed: usize = self.n_proposed.sum();
        if proposed == 0 {
            return 0.0;
        }
        self.n_accepted.sum() as f64 / proposed as f64
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_bincode(self, path, "checkpoint")
    }

    pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_bincode(path, "checkpoint")
    }
}

/// Samples stored by a sampler run.
///
/// Every `thin`-th iteration is stored as the positions, log posteriors and blobs of all
/// walkers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    /// One (n_walkers, n_params) array per stored iteration
    samples: Vec<Array2<f64>>,
    log_probs: Vec<Array1<f64>>,
    blobs: Vec<Array1<f64>>,
    param_names: Vec<String>,
    thin: usize,
    total_iterations: usize,
}

impl Chain {
    /// Create an empty chain storing every `thin`-th iteration (at least every one).
    pub fn new(param_names: Vec<String>, thin: usize) -> Self {
        Self {
            samples: Vec::new(),
            log_probs: Vec::new(),
            blobs: Vec::new(),
            param_names,
            thin: thin.max(1),
            total_iterations: 0,
        }
    }

    /// Record an iteration. Returns whether it was stored.
    pub fn push(&mut self, state: &SamplerState) -> bool {
        self.total_iterations += 1;
        if self.total_iterations % self.thin != 0 {
            return false;
        }
        self.samples.push(state.positions.clone());
        self.log_probs.push(state.log_probs.clone());
        self.blobs.push(state.blobs.clone());
        true
    }

    /// Number of stored iterations.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn thin(&self) -> usize {
        self.thin
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn n_walkers(&self) -> usize {
        self.samples.first().map_or(0, |s| s.nrows())
    }

    /// Stored iterations after discarding the first `discard`.
    fn kept(&self, discard: usize) -> usize {
        self.len().saturating_sub(discard)
    }

    /// Stored positions after discarding the first `discard` stored iterations.
    ///
    /// Returns shape `(kept * n_walkers, n_params)`, iteration-major: all walkers of the
    /// first kept iteration, then all walkers of the next.
    pub fn flat_samples(&self, discard: usize) -> Array2<f64> {
        let n_params = self.param_names.len();
        let n_walkers = self.n_walkers();
        let mut flat = Array2::zeros((self.kept(discard) * n_walkers, n_params));
        for (i, sample) in self.samples.iter().skip(discard).enumerate() {
            flat.slice_mut(s![i * n_walkers..(i + 1) * n_walkers, ..])
                .assign(sample);
        }
        flat
    }

    fn flatten(series: &[Array1<f64>], discard: usize) -> Array1<f64> {
        series
            .iter()
            .skip(discard)
            .flat_map(|values| values.iter().copied())
            .collect()
    }

    /// Log posteriors in the order of [`flat_samples`](Self::flat_samples).
    pub fn flat_log_probs(&self, discard: usize) -> Array1<f64> {
        Self::flatten(&self.log_probs, discard)
    }

    /// Blobs in the order of [`flat_samples`](Self::flat_samples).
    pub fn flat_blobs(&self, discard: usize) -> Array1<f64> {
        Self::flatten(&self.blobs, discard)
    }

    /// Flat samples of each parameter by name.
    pub fn to_param_map(&self, discard: usize) -> IndexMap<String, Array1<f64>> {
        let flat = self.flat_samples(discard);
        self.param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), flat.column(i).to_owned()))
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_bincode(self, path, "chain")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_bincode(path, "chain")
    }

    /// Append the samples of a later chain segment.
    ///
    /// Both chains must have the same parameters and thinning.
    pub fn merge(&mut self, other: &Chain) -> Result<()> {
        if self.param_names != other.param_names {
            return Err(Error::SamplingError(format!(
                "Cannot merge chains of parameters {:?} and {:?}",
                self.param_names, other.param_names
            )));
        }
        if self.thin != other.thin {
            return Err(Error::SamplingError(format!(
                "Cannot merge chains thinned by {} and {}",
                self.thin, other.thin
            )));
        }
        self.samples.extend(other.samples.iter().cloned());
        self.log_probs.extend(other.log_probs.iter().cloned());
        self.blobs.extend(other.blobs.iter().cloned());
        self.total_iterations += other.total_iterations;
        Ok(())
    }

    /// Trace of one parameter for one walker over the kept iterations.
    fn walker_trace(&self, discard: usize, walker: usize, param: usize) -> Vec<f64> {
        self.samples
            .iter()
            .skip(discard)
            .map(|sample| sample[[walker, param]])
            .collect()
    }

    /// Split-chain Gelman-Rubin statistic of each parameter.
    ///
    /// Each walker's kept trace is split in half, giving `2 * n_walkers` sequences of
    /// length `n`. With `W` the mean within-sequence variance and `B` the between-sequence
    /// variance, `R = sqrt(((n - 1) W + B) / (n W))`. Empty with fewer than 4 kept
    /// iterations.
    pub fn r_hat(&self, discard: usize) -> IndexMap<String, f64> {
        let mut result = IndexMap::new();
        let n_keep = self.kept(discard);
        if n_keep < 4 {
            return result;
        }
        let n = n_keep / 2;
        let n_walkers = self.n_walkers();
        let m = 2 * n_walkers;

        for (param, name) in self.param_names.iter().enumerate() {
            let mut means = Vec::with_capacity(m);
            let mut variances = Vec::with_capacity(m);
            for walker in 0..n_walkers {
                let trace = self.walker_trace(discard, walker, param);
                for half in [&trace[..n], &trace[n..2 * n]] {
                    let mean = half.iter().sum::<f64>() / n as f64;
                    let var = half.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                    means.push(mean);
                    variances.push(var);
                }
            }

            let w = variances.iter().sum::<f64>() / m as f64;
            let grand_mean = means.iter().sum::<f64>() / m as f64;
            let b = n as f64 * means.iter().map(|x| (x - grand_mean).powi(2)).sum::<f64>()
                / (m - 1) as f64;
            let var_plus = ((n - 1) as f64 * w + b) / n as f64;
            result.insert(name.clone(), (var_plus / w).sqrt());
        }
        result
    }

    /// Whether every parameter has a finite R-hat below `threshold`.
    pub fn is_converged(&self, discard: usize, threshold: f64) -> bool {
        let r_hat = self.r_hat(discard);
        !r_hat.is_empty() && r_hat.values().all(|&r| r.is_finite() && r < threshold)
    }

    /// Sum of the positive walker-averaged autocorrelations of each parameter.
    ///
    /// Lags run up to `min(n / 2, 100)` and the sum stops at the first non-positive lag.
    /// Empty with fewer than 10 kept iterations.
    fn autocorrelation_sums(&self, discard: usize) -> Vec<(String, f64)> {
        let n_keep = self.kept(discard);
        if n_keep < 10 {
            return Vec::new();
        }
        let n_walkers = self.n_walkers();
        let max_lag = (n_keep / 2).min(100);

        self.param_names
            .iter()
            .enumerate()
            .map(|(param, name)| {
                let mut mean_rho = vec![0.0; max_lag];
                for walker in 0..n_walkers {
                    let trace = self.walker_trace(discard, walker, param);
                    for (acc, rho) in mean_rho.iter_mut().zip(autocorrelation(&trace, max_lag)) {
                        *acc += rho / n_walkers as f64;
                    }
                }
                let sum = mean_rho.iter().take_while(|&&rho| rho > 0.0).sum::<f64>();
                (name.clone(), sum)
            })
            .collect()
    }

    /// Effective sample size of each parameter, `N / (1 + 2 Σρ)` with `N` the number of
    /// kept samples over all walkers.
    pub fn ess(&self, discard: usize) -> IndexMap<String, f64> {
        let n_total = (self.kept(discard) * self.n_walkers()) as f64;
        self.autocorrelation_sums(discard)
            .into_iter()
            .map(|(name, sum)| (name, n_total / (1.0 + 2.0 * sum)))
            .collect()
    }

    /// Integrated autocorrelation time of each parameter, `1 + 2 Σρ`.
    pub fn autocorr_time(&self, discard: usize) -> IndexMap<String, f64> {
        self.autocorrelation_sums(discard)
            .into_iter()
            .map(|(name, sum)| (name, 1.0 + 2.0 * sum))
            .collect()
    }
}

/// Autocorrelation of a trace at lags `1..=max_lag`. A constant trace gives zeros.
fn autocorrelation(trace: &[f64], max_lag: usize) -> Vec<f64> {
    let n = trace.len();
    let mean = trace.iter().sum::<f64>() / n as f64;
    let variance = trace.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if variance == 0.0 {
        return vec![0.0; max_lag];
    }

    (1..=max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            let cov = trace
                .iter()
                .zip(&trace[lag..])
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / (n - lag) as f64;
            cov / variance
        })
        .collect()
}

/// Stretch move proposal with scale `a`.
#[derive(Debug, Clone, Copy)]
pub struct StretchMove {
    pub a: f64,
}

impl Default for StretchMove {
    fn default() -> Self {
        Self { a: 2.0 }
    }
}

impl StretchMove {
    /// Fails unless `a > 1`.
    pub fn new(a: f64) -> Result<Self> {
        if !(a > 1.0) {
            return Err(Error::InvalidParameter(format!(
                "Stretch move scale must be greater than 1, got {}",
                a
            )));
        }
        Ok(Self { a })
    }

    /// Draw a stretch factor from `g(z) ∝ 1/sqrt(z)` on `[1/a, a]`.
    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen();
        ((self.a - 1.0) * u + 1.0).powi(2) / self.a
    }

    /// Probability of accepting a proposal, `min(1, z^(n-1) exp(Δ ln p))`.
    ///
    /// Proposals with a non-finite log posterior are never accepted.
    pub fn acceptance_probability(
        &self,
        z: f64,
        n_params: usize,
        log_prob_old: f64,
        log_prob_new: f64,
    ) -> f64 {
        if !log_prob_new.is_finite() {
            return 0.0;
        }
        let log_ratio = (n_params as f64 - 1.0) * z.ln() + log_prob_new - log_prob_old;
        log_ratio.exp().min(1.0)
    }

    /// Propose `c + z (x - c)` for a walker at `x` and a random complementary walker `c`.
    ///
    /// Returns the proposal and the stretch factor.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current: ArrayView1<f64>,
        complementary: &Array2<f64>,
    ) -> (Array1<f64>, f64) {
        let z = self.sample_z(rng);
        let other = complementary.row(rng.gen_range(0..complementary.nrows()));
        let proposal = &other + &((&current - &other) * z);
        (proposal, z)
    }
}

/// How walkers are placed before the first iteration.
#[derive(Debug, Clone)]
pub enum WalkerInit {
    /// Independent draws from the priors
    FromPrior,
    /// Uniformly within `radius / 2` of `center` in every dimension
    Ball { center: Vec<f64>, radius: f64 },
    /// Given positions, shape (n_walkers, n_params)
    Explicit(Array2<f64>),
}

impl WalkerInit {
    pub fn initialize<R: Rng>(
        &self,
        n_walkers: usize,
        params: &ParameterSet,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let n_params = params.len();
        match self {
            WalkerInit::FromPrior => Ok(params.sample_random_with_rng(n_walkers, rng)),
            WalkerInit::Ball { center, radius } => {
                if center.len() != n_params {
                    return Err(Error::InvalidParameter(format!(
                        "Ball centre has {} values for {} parameters",
                        center.len(),
                        n_params
                    )));
                }
                Ok(Array2::from_shape_fn((n_walkers, n_params), |(_, j)| {
                    center[j] + (rng.gen::<f64>() - 0.5) * radius
                }))
            }
            WalkerInit::Explicit(positions) => {
                if positions.dim() != (n_walkers, n_params) {
                    return Err(Error::InvalidParameter(format!(
                        "Explicit positions have shape {:?}, expected ({}, {})",
                        positions.dim(),
                        n_walkers,
                        n_params
                    )));
                }
                Ok(positions.clone())
            }
        }
    }
}

/// Ensemble sampler of the posterior of a [`ParameterSet`] given a [`Target`].
///
/// The log posterior of a parameter vector is its log prior plus the log likelihood of the
/// model output. Failed model runs, likelihood errors and vectors outside the prior
/// support get a log posterior of negative infinity and are never accepted.
pub struct EnsembleSampler<R: ModelRunner, L: LikelihoodFn> {
    params: ParameterSet,
    runner: R,
    likelihood: L,
    target: Target,
    stretch: StretchMove,
    /// `max(2 * n_params, 32)`
    default_n_walkers: usize,
    seed: Option<u64>,
}

impl<R: ModelRunner, L: LikelihoodFn> EnsembleSampler<R, L> {
    pub fn new(params: ParameterSet, runner: R, likelihood: L, target: Target) -> Self {
        let default_n_walkers = (2 * params.len()).max(32);
        Self {
            params,
            runner,
            likelihood,
            target,
            stretch: StretchMove::default(),
            default_n_walkers,
            seed: None,
        }
    }

    pub fn with_stretch_param(mut self, a: f64) -> Result<Self> {
        self.stretch = StretchMove::new(a)?;
        Ok(self)
    }

    /// Seed the random number generator so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn default_n_walkers(&self) -> usize {
        self.default_n_walkers
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Generator on `stream` for a run that has already completed `offset` iterations.
    fn rng(&self, stream: u64, offset: usize) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => seeded_rng(seed, stream, offset),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Log posterior and blob of each parameter vector.
    fn log_posterior_batch(&self, param_sets: &[Vec<f64>]) -> Vec<(f64, f64)> {
        let outputs = self.runner.run_batch(param_sets);

        param_sets
            .par_iter()
            .zip(outputs.par_iter())
            .map(|(params, output)| {
                let log_prior = match self.params.log_prior(params) {
                    Ok(lp) if lp.is_finite() => lp,
                    _ => return (f64::NEG_INFINITY, f64::NAN),
                };
                let Ok(output) = output else {
                    return (f64::NEG_INFINITY, f64::NAN);
                };
                let blob = self.runner.blob(output);
                match self.likelihood.ln_likelihood(output, &self.target) {
                    Ok(ll) if !ll.is_nan() => (log_prior + ll, blob),
                    _ => (f64::NEG_INFINITY, blob),
                }
            })
            .collect()
    }

    fn evaluate_state(&self, state: &mut SamplerState) {
        let positions: Vec<Vec<f64>> = state.positions.outer_iter().map(|r| r.to_vec()).collect();
        for (i, (lp, blob)) in self.log_posterior_batch(&positions).into_iter().enumerate() {
            state.log_probs[i] = lp;
            state.blobs[i] = blob;
        }
    }

    /// Run `n_iterations` with the default number of walkers.
    ///
    /// # Arguments
    ///
    /// * `n_iterations` - Number of iterations; each updates every walker once
    /// * `init` - Starting positions of the walkers
    /// * `thin` - Store every `thin`-th iteration
    pub fn run(&self, n_iterations: usize, init: WalkerInit, thin: usize) -> Result<Chain> {
        self.run_with_walkers(
            n_iterations,
            init,
            self.default_n_walkers,
            thin,
            None::<fn(&ProgressInfo)>,
        )
    }

    pub fn run_with_progress<F>(
        &self,
        n_iterations: usize,
        init: WalkerInit,
        thin: usize,
        progress_callback: F,
    ) -> Result<Chain>
    where
        F: FnMut(&ProgressInfo),
    {
        self.run_with_walkers(
            n_iterations,
            init,
            self.default_n_walkers,
            thin,
            Some(progress_callback),
        )
    }

    /// Run with a given number of walkers, which must be even and at least 2.
    pub fn run_with_walkers<F>(
        &self,
        n_iterations: usize,
        init: WalkerInit,
        n_walkers: usize,
        thin: usize,
        progress_callback: Option<F>,
    ) -> Result<Chain>
    where
        F: FnMut(&ProgressInfo),
    {
        let (state, chain) = self.initial_state(init, n_walkers, thin)?;
        self.run_from_state(state, chain, n_iterations, None, progress_callback)
    }

    /// Run while saving the state and chain every `checkpoint_every` iterations.
    ///
    /// Checkpoints are written to `<checkpoint_path>.state` and `<checkpoint_path>.chain`
    /// and can be continued with [`resume_from_checkpoint`](Self::resume_from_checkpoint).
    pub fn run_with_checkpoint<F, P>(
        &self,
        n_iterations: usize,
        init: WalkerInit,
        thin: usize,
        checkpoint_every: usize,
        checkpoint_path: P,
        progress_callback: Option<F>,
    ) -> Result<Chain>
    where
        F: FnMut(&ProgressInfo),
        P: AsRef<Path>,
    {
        let (state, chain) = self.initial_state(init, self.default_n_walkers, thin)?;
        self.run_from_state(
            state,
            chain,
            n_iterations,
            Some((checkpoint_every, checkpoint_path.as_ref())),
            progress_callback,
        )
    }

    /// Continue a checkpointed run until it has completed `n_iterations` in total.
    pub fn resume_from_checkpoint<F, P>(
        &self,
        n_iterations: usize,
        checkpoint_every: usize,
        checkpoint_path: P,
        progress_callback: Option<F>,
    ) -> Result<Chain>
    where
        F: FnMut(&ProgressInfo),
        P: AsRef<Path>,
    {
        let (state_path, chain_path) = checkpoint_files(checkpoint_path.as_ref());
        let state = SamplerState::load_checkpoint(&state_path)?;
        let chain = Chain::load(&chain_path)?;

        if state.param_names != self.runner.param_names() {
            return Err(Error::SamplingError(format!(
                "Checkpoint parameters {:?} do not match the sampler's {:?}",
                state.param_names,
                self.runner.param_names()
            )));
        }

        let remaining = n_iterations.saturating_sub(chain.total_iterations());
        debug!(
            "Resuming from {} with {} iterations remaining",
            state_path, remaining
        );
        self.run_from_state(
            state,
            chain,
            remaining,
            Some((checkpoint_every, checkpoint_path.as_ref())),
            progress_callback,
        )
    }

    fn initial_state(
        &self,
        init: WalkerInit,
        n_walkers: usize,
        thin: usize,
    ) -> Result<(SamplerState, Chain)> {
        if n_walkers < 2 || n_walkers % 2 != 0 {
            return Err(Error::SamplingError(format!(
                "Number of walkers must be even and at least 2, got {}",
                n_walkers
            )));
        }

        let mut rng = self.rng(WALKER_INIT_STREAM, 0);
        let positions = init.initialize(n_walkers, &self.params, &mut rng)?;
        let param_names: Vec<String> = self
            .params
            .param_names()
            .into_iter()
            .map(String::from)
            .collect();
        let state = SamplerState::new(positions, param_names.clone())?;
        Ok((state, Chain::new(param_names, thin)))
    }

    fn run_from_state<F>(
        &self,
        mut state: SamplerState,
        mut chain: Chain,
        n_iterations: usize,
        checkpoint: Option<(usize, &Path)>,
        mut progress_callback: Option<F>,
    ) -> Result<Chain>
    where
        F: FnMut(&ProgressInfo),
    {
        let n_walkers = state.n_walkers();
        if n_walkers % 2 != 0 {
            return Err(Error::SamplingError(format!(
                "Number of walkers must be even, got {}",
                n_walkers
            )));
        }
        if state.log_probs.iter().all(|lp| !lp.is_finite()) {
            self.evaluate_state(&mut state);
        }

        let mut rng = self.rng(ITERATION_STREAM, chain.total_iterations());
        let half = n_walkers / 2;

        for iteration in 0..n_iterations {
            self.update_group(&mut state, 0..half, half..n_walkers, &mut rng);
            self.update_group(&mut state, half..n_walkers, 0..half, &mut rng);
            chain.push(&state);

            if let Some((every, path)) = checkpoint {
                if every > 0 && (iteration + 1) % every == 0 {
                    let (state_path, chain_path) = checkpoint_files(path);
                    state.save_checkpoint(&state_path)?;
                    chain.save(&chain_path)?;
                }
            }

            if let Some(callback) = progress_callback.as_mut() {
                callback(&ProgressInfo {
                    iteration,
                    total: n_iterations,
                    acceptance_rate: state.mean_acceptance_rate(),
                    mean_log_prob: state.log_probs.mean().unwrap_or(f64::NEG_INFINITY),
                });
            }
        }

        debug!(
            "Sampled {} iterations with {} walkers, acceptance rate {:.3}",
            n_iterations,
            n_walkers,
            state.mean_acceptance_rate()
        );
        Ok(chain)
    }

    /// Move the walkers in `active` using the walkers in `complementary`.
    fn update_group<G: Rng>(
        &self,
        state: &mut SamplerState,
        active: Range<usize>,
        complementary: Range<usize>,
        rng: &mut G,
    ) {
        let others = state.positions.slice(s![complementary, ..]).to_owned();
        let proposals: Vec<(Array1<f64>, f64)> = active
            .clone()
            .map(|i| self.stretch.propose(rng, state.positions.row(i), &others))
            .collect();

        let vectors: Vec<Vec<f64>> = proposals.iter().map(|(p, _)| p.to_vec()).collect();
        let evaluated = self.log_posterior_batch(&vectors);
        let n_params = state.n_params();

        for (walker, ((proposal, z), (log_prob, blob))) in
            active.zip(proposals.into_iter().zip(evaluated))
        {
            let accept =
                self.stretch
                    .acceptance_probability(z, n_params, state.log_probs[walker], log_prob);
            state.n_proposed[walker] += 1;
            if rng.gen::<f64>() < accept {
                state.positions.row_mut(walker).assign(&proposal);
                state.log_probs[walker] = log_prob;
                state.blobs[walker] = blob;
                state.n_accepted[walker] += 1;
            }
        }
    }
}

fn checkpoint_files(base: &Path) -> (String, String) {
    (
        format!("{}.state", base.display()),
        format!("{}.chain", base.display()),
    )
}
