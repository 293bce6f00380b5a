//! Calibration by minimising the misfit to mass balance observations.
//!
//! The precipitation factor, precipitation gradient, degree-day factor of snow and
//! temperature bias are optimised with a bounded Nelder–Mead simplex. The misfit of an
//! observation is a z-score, so observations of different length and type can be
//! combined. When the optimum found within the narrow bounds still misses the
//! observations, the bounds are widened and the optimisation is repeated, up to three
//! rounds.

use crate::observations::{MassBalanceObservation, ObservationType};
use crate::{Error, Result};
use rgem_core::climate::GlacierClimate;
use rgem_core::dates::DatesTable;
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use rgem_core::massbalance::{area_weighted_mass_balance, run_mass_balance, MassBalanceMode};
use rgem_core::parameters::{MassBalanceOptions, ModelParameters};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tracing::{debug, info, warn};

/// Names of the optimised parameters, in the order of the optimisation vector.
pub const OPTIMISED_PARAMETERS: [&str; 4] = ["precfactor", "precgrad", "ddfsnow", "tempchange"];

/// Lower and upper bound of each optimised parameter.
pub type Bounds = [(f64, f64); 4];

/// Bounds of the successive optimisation rounds.
pub const ROUND_BOUNDS: [Bounds; 3] = [
    [(0.9, 1.2), (0.0001, 0.00025), (0.0036, 0.0046), (-1.0, 1.0)],
    [(0.75, 1.5), (0.0001, 0.00025), (0.0031, 0.0051), (-2.0, 2.0)],
    [(0.5, 2.0), (0.0001, 0.00025), (0.0026, 0.0056), (-5.0, 5.0)],
];

/// Settings of the optimisation calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimisationSettings {
    /// Uncertainty of a mass balance observation per year of the observed period
    /// unit: m w.e. a^-1
    /// default: 0.1
    pub uncertainty_mwea: f64,
    /// Accepted |z| when a glacier has a single observation
    /// default: 0.1
    pub tolerance_single: f64,
    /// Accepted |z| of the geodetic observation, or mean |z|, for several observations
    /// default: 1.0
    pub tolerance_all: f64,
    /// Spread of the objective over the simplex at convergence
    /// default: 1e-6
    pub ftol: f64,
    /// Objective evaluations per round
    /// default: 2000
    pub max_evaluations: usize,
}

impl Default for OptimisationSettings {
    fn default() -> Self {
        Self {
            uncertainty_mwea: 0.1,
            tolerance_single: 0.1,
            tolerance_all: 1.0,
            ftol: 1e-6,
            max_evaluations: 2000,
        }
    }
}

/// Observed and modelled mass balance of one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub glacier_number: String,
    pub obs_type: ObservationType,
    /// Observed mass balance over the period (m w.e.)
    pub obs: f64,
    /// Modelled mass balance over the period (m w.e.)
    pub model: f64,
    /// Uncertainty of the observation (m w.e.)
    pub uncertainty: f64,
    pub zscore: f64,
    /// Optimisation rounds that were run
    pub calround: usize,
}

/// Optimised parameters of one glacier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisationResult {
    pub rgi_id: String,
    pub glacier_number: String,
    pub parameters: ModelParameters,
    pub comparisons: Vec<Comparison>,
    pub rounds: usize,
    /// Sum of |z| at the optimum
    pub objective: f64,
}

/// Minimise `f` within `bounds` with the Nelder–Mead simplex method.
///
/// Trial points are projected onto the bounds. Non-finite objective values are treated
/// as infinitely bad.
///
/// # Arguments
///
/// * `f` - Objective to minimise
/// * `x0` - Initial guess, projected onto the bounds
/// * `bounds` - Lower and upper bound of every dimension
/// * `ftol` - Spread of the objective over the simplex at which to stop
/// * `max_evaluations` - Maximum number of objective evaluations
///
/// # Returns
///
/// The best point found and its objective value.
pub fn nelder_mead<F>(
    f: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    ftol: f64,
    max_evaluations: usize,
) -> Result<(Vec<f64>, f64)>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 || bounds.len() != n {
        return Err(Error::InvalidParameter(format!(
            "{} bounds for {} parameters",
            bounds.len(),
            n
        )));
    }
    if let Some((low, high)) = bounds.iter().find(|(low, high)| !(low <= high)) {
        return Err(Error::InvalidParameter(format!(
            "Invalid bounds ({}, {})",
            low, high
        )));
    }

    let project = |x: &mut [f64]| {
        for (xi, (low, high)) in x.iter_mut().zip(bounds) {
            *xi = xi.clamp(*low, *high);
        }
    };
    let evaluations = Cell::new(0usize);
    let eval = |x: &[f64]| {
        evaluations.set(evaluations.get() + 1);
        let value = f(x);
        if value.is_finite() {
            value
        } else {
            f64::INFINITY
        }
    };

    // Initial simplex: step 5% of the range along each axis, away from the nearer bound
    let mut start = x0.to_vec();
    project(&mut start);
    let mut simplex: Vec<Vec<f64>> = vec![start.clone()];
    for (i, (low, high)) in bounds.iter().enumerate() {
        let mut vertex = start.clone();
        let step = 0.05 * (high - low);
        vertex[i] = if vertex[i] + step <= *high {
            vertex[i] + step
        } else {
            vertex[i] - step
        };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

    while evaluations.get() < max_evaluations {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = values[0];
        let worst = values[n];
        if best.is_finite() && (worst - best).abs() <= ftol {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|x| x[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coefficient: f64| -> Vec<f64> {
            let mut x: Vec<f64> = centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + coefficient * (c - w))
                .collect();
            project(&mut x);
            x
        };

        let reflected = towards(1.0);
        let f_reflected = eval(&reflected);
        if f_reflected < best {
            let expanded = towards(2.0);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        // Outside contraction if the reflection improved on the worst vertex, else inside
        let contracted = towards(if f_reflected < worst { 0.5 } else { -0.5 });
        let f_contracted = eval(&contracted);
        if f_contracted < f_reflected.min(worst) {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // Shrink towards the best vertex
        for i in 1..=n {
            let shrunk: Vec<f64> = simplex[0]
                .iter()
                .zip(&simplex[i])
                .map(|(b, x)| b + 0.5 * (x - b))
                .collect();
            values[i] = eval(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let (best, value) = simplex
        .into_iter()
        .zip(values)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| Error::SamplingError("Empty simplex".to_string()))?;
    Ok((best, value))
}

/// Model of one glacier compared against its observations.
#[derive(Debug, Clone)]
pub struct GlacierProblem<'a> {
    pub base: ModelParameters,
    pub glacier: &'a GlacierAttributes,
    pub geometry: &'a GlacierGeometry,
    pub climate: &'a GlacierClimate,
    pub dates: &'a DatesTable,
    pub options: &'a MassBalanceOptions,
    pub observations: &'a [MassBalanceObservation],
}

impl GlacierProblem<'_> {
    /// Full model parameters for an optimisation vector.
    ///
    /// The degree-day factor of ice follows the degree-day factor of snow.
    pub fn model_parameters(&self, x: &[f64]) -> Result<ModelParameters> {
        let [precfactor, precgrad, ddfsnow, tempchange] = x else {
            return Err(Error::InvalidParameter(format!(
                "Expected {} parameters, got {}",
                OPTIMISED_PARAMETERS.len(),
                x.len()
            )));
        };
        Ok(ModelParameters {
            precfactor: *precfactor,
            precgrad: *precgrad,
            ddfsnow: *ddfsnow,
            ddfice: ddfsnow / self.options.ddfsnow_ice_ratio,
            tempchange: *tempchange,
            ..self.base
        })
    }

    fn initial_guess(&self) -> Vec<f64> {
        vec![
            self.base.precfactor,
            self.base.precgrad,
            self.base.ddfsnow,
            self.base.tempchange,
        ]
    }

    /// Compare the model run with `params` against every observation.
    pub fn compare(
        &self,
        params: &ModelParameters,
        settings: &OptimisationSettings,
    ) -> Result<Vec<Comparison>> {
        let output = run_mass_balance(
            params,
            self.glacier,
            self.geometry,
            self.climate,
            self.dates,
            self.options,
            MassBalanceMode::AreaConstant,
        )?;

        Ok(self
            .observations
            .iter()
            .map(|obs| {
                let model = area_weighted_mass_balance(
                    &output,
                    (obs.z1_idx, obs.z2_idx),
                    obs.t1_idx,
                    obs.t2_idx,
                );
                let uncertainty = settings.uncertainty_mwea * obs.years();
                Comparison {
                    glacier_number: obs.glacier_number.clone(),
                    obs_type: obs.obs_type,
                    obs: obs.mb_mwe,
                    model,
                    uncertainty,
                    zscore: (model - obs.mb_mwe) / uncertainty,
                    calround: 0,
                }
            })
            .collect())
    }

    /// Sum of |z| over all observations; infinite when the model cannot be run.
    fn objective(&self, x: &[f64], settings: &OptimisationSettings) -> f64 {
        let comparisons = self
            .model_parameters(x)
            .and_then(|params| self.compare(&params, settings));
        match comparisons {
            Ok(rows) => rows.iter().map(|c| c.zscore.abs()).sum(),
            Err(err) => {
                debug!("{}: objective failed: {}", self.glacier.rgi_id, err);
                f64::INFINITY
            }
        }
    }
}

/// Whether the comparisons are close enough to stop widening the bounds.
///
/// A single observation must have `|z| <= tolerance_single`. With several observations,
/// the first geodetic one, or else the mean `|z|`, must be within `tolerance_all`.
pub fn within_tolerance(comparisons: &[Comparison], settings: &OptimisationSettings) -> bool {
    let (zscore, tolerance) = match comparisons {
        [] => return false,
        [single] => (single.zscore.abs(), settings.tolerance_single),
        rows => match rows.iter().find(|c| c.obs_type == ObservationType::Geodetic) {
            Some(geodetic) => (geodetic.zscore.abs(), settings.tolerance_all),
            None => (
                rows.iter().map(|c| c.zscore.abs()).sum::<f64>() / rows.len() as f64,
                settings.tolerance_all,
            ),
        },
    };
    zscore <= tolerance
}

/// Optimise the parameters of one glacier against its observations.
///
/// Each round starts from the optimum of the previous one; the first round starts from
/// the base parameters.
///
/// # Arguments
///
/// * `problem` - Glacier, forcing and observations
/// * `settings` - Tolerances and limits of the optimisation
///
/// # Returns
///
/// The optimised parameters and the comparison against every observation.
pub fn optimise_glacier(
    problem: &GlacierProblem,
    settings: &OptimisationSettings,
) -> Result<OptimisationResult> {
    if problem.observations.is_empty() {
        return Err(Error::InvalidTarget(format!(
            "No observations of {}",
            problem.glacier.rgi_id
        )));
    }
    if problem.glacier.is_water_terminating() {
        warn!(
            "{} is water-terminating; calibrating without frontal ablation",
            problem.glacier.rgi_id
        );
    }

    let mut x = problem.initial_guess();
    let mut objective = f64::INFINITY;
    let mut comparisons = Vec::new();
    let mut rounds = 0;

    for bounds in ROUND_BOUNDS.iter() {
        if rounds > 0 && within_tolerance(&comparisons, settings) {
            break;
        }
        let (optimum, value) = nelder_mead(
            |x| problem.objective(x, settings),
            &x,
            bounds,
            settings.ftol,
            settings.max_evaluations,
        )?;
        rounds += 1;
        x = optimum;
        objective = value;
        comparisons = problem.compare(&problem.model_parameters(&x)?, settings)?;
        debug!(
            "{}: round {} objective {:.4} at {:?}",
            problem.glacier.rgi_id, rounds, objective, x
        );
    }

    for row in comparisons.iter_mut() {
        row.calround = rounds;
    }
    if within_tolerance(&comparisons, settings) {
        info!(
            "{}: optimised in {} round(s), sum |z| {:.3}",
            problem.glacier.rgi_id, rounds, objective
        );
    } else {
        warn!(
            "{}: observations not matched after {} rounds, sum |z| {:.3}",
            problem.glacier.rgi_id, rounds, objective
        );
    }

    Ok(OptimisationResult {
        rgi_id: problem.glacier.rgi_id.clone(),
        glacier_number: problem.glacier.glacier_number.clone(),
        parameters: problem.model_parameters(&x)?,
        comparisons,
        rounds,
        objective,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{climate, dates, geometry, glacier, observation};
    use approx::assert_relative_eq;

    struct Fixture {
        glacier: GlacierAttributes,
        geometry: GlacierGeometry,
        climate: GlacierClimate,
        dates: DatesTable,
        options: MassBalanceOptions,
    }

    impl Fixture {
        fn new() -> Self {
            let dates = dates();
            Self {
                glacier: glacier(),
                geometry: geometry(),
                climate: climate(&dates),
                dates,
                options: MassBalanceOptions::default(),
            }
        }

        fn problem<'a>(&'a self, observations: &'a [MassBalanceObservation]) -> GlacierProblem<'a> {
            GlacierProblem {
                base: ModelParameters::default(),
                glacier: &self.glacier,
                geometry: &self.geometry,
                climate: &self.climate,
                dates: &self.dates,
                options: &self.options,
                observations,
            }
        }
    }

    fn comparison(obs_type: ObservationType, zscore: f64) -> Comparison {
        Comparison {
            glacier_number: "00001".to_string(),
            obs_type,
            obs: 0.0,
            model: 0.0,
            uncertainty: 1.0,
            zscore,
            calround: 0,
        }
    }

    #[test]
    fn nelder_mead_quadratic() {
        let f = |x: &[f64]| (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 0.5).powi(2);
        let (x, value) =
            nelder_mead(f, &[0.0, 0.0], &[(-3.0, 3.0), (-3.0, 3.0)], 1e-12, 5000).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(x[1], -0.5, epsilon = 1e-3);
        assert!(value < 1e-6);
    }

    #[test]
    fn nelder_mead_respects_bounds() {
        let f = |x: &[f64]| (x[0] - 5.0).powi(2) + x[1].powi(2);
        let (x, _) = nelder_mead(f, &[0.5, 0.5], &[(0.0, 1.0), (-1.0, 1.0)], 1e-12, 5000).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-4);
        assert!(x[1].abs() < 1e-2);

        assert!(nelder_mead(f, &[0.5], &[(0.0, 1.0), (0.0, 1.0)], 1e-6, 10).is_err());
        assert!(nelder_mead(f, &[0.5, 0.5], &[(1.0, 0.0), (0.0, 1.0)], 1e-6, 10).is_err());
    }

    #[test]
    fn tolerance_check() {
        let settings = OptimisationSettings::default();
        assert!(within_tolerance(&[comparison(ObservationType::Geodetic, 0.05)], &settings));
        assert!(!within_tolerance(&[comparison(ObservationType::Geodetic, -0.2)], &settings));

        // The geodetic observation decides, even when listed second
        let rows = [
            comparison(ObservationType::Glaciological, 5.0),
            comparison(ObservationType::Geodetic, 0.5),
        ];
        assert!(within_tolerance(&rows, &settings));

        // Otherwise the mean |z|
        let rows = [
            comparison(ObservationType::Glaciological, 0.5),
            comparison(ObservationType::Glaciological, -2.0),
        ];
        assert!(!within_tolerance(&rows, &settings));
        assert!(!within_tolerance(&[comparison(ObservationType::Geodetic, f64::NAN)], &settings));
        assert!(!within_tolerance(&[], &settings));
    }

    #[test]
    fn reachable_observation_in_one_round() {
        let fixture = Fixture::new();
        let settings = OptimisationSettings::default();

        // Observation produced by parameters inside the first bounds
        let truth = [1.1, 0.00015, 0.004, 0.3];
        let mut obs = observation();
        let model = {
            let problem = fixture.problem(std::slice::from_ref(&obs));
            let params = problem.model_parameters(&truth).unwrap();
            problem.compare(&params, &settings).unwrap()[0].model
        };
        obs.mb_mwe = model;

        let observations = [obs];
        let result = optimise_glacier(&fixture.problem(&observations), &settings).unwrap();

        assert_eq!(result.rounds, 1);
        assert_eq!(result.comparisons.len(), 1);
        assert_eq!(result.comparisons[0].calround, 1);
        assert!(result.comparisons[0].zscore.abs() <= settings.tolerance_single);
        assert_relative_eq!(
            result.parameters.ddfice,
            result.parameters.ddfsnow / 0.7,
            epsilon = 1e-12
        );
        assert_eq!(result.parameters.lrgcm, ModelParameters::default().lrgcm);
    }

    #[test]
    fn unreachable_observation_uses_all_rounds() {
        let fixture = Fixture::new();
        let settings = OptimisationSettings {
            max_evaluations: 300,
            ..OptimisationSettings::default()
        };
        let mut obs = observation();
        obs.mb_mwe = -500.0;
        let observations = [obs];

        let result = optimise_glacier(&fixture.problem(&observations), &settings).unwrap();

        assert_eq!(result.rounds, 3);
        let widest = ROUND_BOUNDS[2];
        let p = result.parameters;
        for (value, (low, high)) in [p.precfactor, p.precgrad, p.ddfsnow, p.tempchange]
            .iter()
            .zip(widest)
        {
            assert!(*value >= low && *value <= high);
        }
        // Melting as much as possible: warmest and driest corner
        assert_relative_eq!(p.tempchange, 5.0, epsilon = 1e-2);
        assert!(result.comparisons[0].zscore > 0.0);
        assert!(!within_tolerance(&result.comparisons, &settings));
    }

    #[test]
    fn no_observations() {
        let fixture = Fixture::new();
        let settings = OptimisationSettings::default();
        assert!(optimise_glacier(&fixture.problem(&[]), &settings).is_err());
    }
}
