//! Simulation of glacier evolution for one or more climate datasets.

use crate::config::RunConfig;
use crate::error::RunResult;
use crate::export::{
    ensemble_statistics, load_calibrated_parameters, write_json, GlacierSimulation,
    MemberOutput, SimulationOutput,
};
use crate::setup::{self, ClimateDataset, ClimateSource, Execution};
use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rgem_core::dates::DatesTable;
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use rgem_core::massbalance::{run_mass_balance, MassBalanceMode};
use rgem_core::parameters::ModelParameters;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parameter sets to simulate from a calibrated ensemble.
///
/// A single set is the ensemble mean. Otherwise every k-th member is taken after skipping
/// `burn` members, with `k = (len - burn) / n` and a random start within the first `k`
/// members after the burn-in.
pub fn select_parameters<R: Rng>(
    ensemble: &[ModelParameters],
    n: usize,
    burn: usize,
    rng: &mut R,
) -> Vec<ModelParameters> {
    if ensemble.is_empty() || n == 0 {
        return Vec::new();
    }
    if n == 1 || ensemble.len() == 1 {
        return vec![mean_parameters(ensemble)];
    }

    let burn = burn.min(ensemble.len() - 1);
    let spacing = ((ensemble.len() - burn) / n).max(1);
    let start = burn + rng.gen_range(0..spacing);
    ensemble[start..].iter().step_by(spacing).take(n).copied().collect()
}

fn mean_parameters(ensemble: &[ModelParameters]) -> ModelParameters {
    let mut sums = vec![0.0; ModelParameters::NAMES.len()];
    for params in ensemble {
        for (sum, value) in sums.iter_mut().zip(params.to_vec()) {
            *sum += value;
        }
    }
    let n = ensemble.len() as f64;
    let means: Vec<f64> = sums.into_iter().map(|s| s / n).collect();
    ModelParameters::from_slice(&means).unwrap_or_default()
}

struct SimulationInputs<'a> {
    config: &'a RunConfig,
    dataset: &'a ClimateDataset,
    climate: &'a ClimateSource,
    dates: &'a DatesTable,
    calibrated: Option<&'a IndexMap<String, Vec<ModelParameters>>>,
    output_dir: PathBuf,
}

impl SimulationInputs<'_> {
    fn parameter_sets(
        &self,
        glacier: &GlacierAttributes,
        rng: &mut ChaCha8Rng,
    ) -> Vec<ModelParameters> {
        let Some(calibrated) = self.calibrated else {
            return vec![self.config.parameters];
        };
        match calibrated.get(&glacier.rgi_id) {
            Some(ensemble) => select_parameters(
                ensemble,
                self.config.simulation.sim_iters,
                self.config.simulation.sim_burn,
                rng,
            ),
            None => {
                warn!(
                    "{} has no calibrated parameters; using the configured parameters",
                    glacier.rgi_id
                );
                vec![self.config.parameters]
            }
        }
    }

    fn simulate_glacier(
        &self,
        index: usize,
        glacier: &GlacierAttributes,
        geometry: &GlacierGeometry,
    ) -> RunResult<()> {
        let climate = self
            .climate
            .glacier_climate(self.config, index, glacier, self.dates)?;
        let mut rng = match self.config.simulation.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => ChaCha8Rng::from_entropy(),
        };

        let spinup = self.dates.spinup_years() as usize;
        let mut members = Vec::new();
        for params in self.parameter_sets(glacier, &mut rng) {
            let output = run_mass_balance(
                &params,
                glacier,
                geometry,
                &climate,
                self.dates,
                &self.config.options,
                MassBalanceMode::Dynamic,
            )?
            .without_spinup(spinup);
            let member = MemberOutput::new(params, &output);
            debug!("{}: mb {:.3} m w.e. a-1", glacier.rgi_id, member.mb_mwea);
            members.push(member);
        }

        let output = match self.config.simulation.output_package {
            0 => return Ok(()),
            1 => SimulationOutput::Members { members },
            _ => SimulationOutput::Statistics {
                n_members: members.len(),
                variables: ensemble_statistics(&members),
            },
        };
        let years = self.dates.year_labels()[spinup..].to_vec();
        let years_plus_one = self.dates.year_labels_plus_one()[spinup..].to_vec();
        let simulation = GlacierSimulation {
            rgi_id: glacier.rgi_id.clone(),
            dataset: self.dataset.name.clone(),
            scenario: self.dataset.scenario.clone(),
            years,
            years_plus_one,
            output,
        };
        write_json(
            &self.output_dir.join(format!("{}.json", glacier.rgi_id)),
            &simulation,
        )
    }
}

/// Directory of the output of one climate dataset.
fn output_dir(config: &RunConfig, dataset: &ClimateDataset) -> PathBuf {
    let source = if config.simulation.calibrated_parameters.is_some() {
        "calibrated"
    } else {
        "default"
    };
    config.simulation.output_dir.join(format!(
        "{}_{}_ba{:?}_{}_{}",
        dataset.label(),
        source,
        config.climate.bias_method,
        config.run.start_year,
        config.run.end_year
    ))
}

/// Simulate every selected glacier with every climate dataset.
///
/// # Arguments
///
/// * `config` - Run configuration
/// * `gcm_list` - Reference dataset name or a file listing datasets of one scenario
/// * `glacier_list` - File of glacier numbers overriding the configured selection
/// * `execution` - Parallelism of the run
pub fn run(
    config: &RunConfig,
    gcm_list: Option<&str>,
    glacier_list: Option<&Path>,
    execution: Execution,
) -> RunResult<()> {
    let start = Instant::now();
    let mut glaciers = setup::glaciers(config, glacier_list)?;
    let geometries = setup::geometries(config, &mut glaciers)?;
    let dates = setup::dates(config)?;
    let datasets = setup::climate_datasets(gcm_list, &config.climate.reference)?;
    let calibrated = config
        .simulation
        .calibrated_parameters
        .as_deref()
        .map(load_calibrated_parameters)
        .transpose()?;

    for glacier in glaciers.iter().filter(|g| g.is_water_terminating()) {
        warn!(
            "{} is water-terminating; frontal ablation is not modelled",
            glacier.rgi_id
        );
    }

    let pool = execution.thread_pool()?;
    let chunk_size = execution.chunk_size(glaciers.len());

    for dataset in &datasets {
        let dataset_start = Instant::now();
        info!("Processing {}", dataset.label());
        let climate = ClimateSource::load(config, dataset, &glaciers)?;
        let inputs = SimulationInputs {
            config,
            dataset,
            climate: &climate,
            dates: &dates,
            calibrated: calibrated.as_ref(),
            output_dir: output_dir(config, dataset),
        };

        let indices: Vec<usize> = (0..glaciers.len()).collect();
        let chunks: Vec<&[usize]> = indices.chunks(chunk_size).collect();
        let simulate_chunk = |(n, chunk): (usize, &&[usize])| -> RunResult<()> {
            for &i in chunk.iter() {
                inputs.simulate_glacier(i, &glaciers[i], &geometries[i])?;
            }
            debug!("Finished chunk {} of {}", n + 1, chunks.len());
            Ok(())
        };
        if execution.serial {
            chunks.iter().enumerate().try_for_each(simulate_chunk)?;
        } else {
            pool.install(|| chunks.par_iter().enumerate().try_for_each(simulate_chunk))?;
        }

        info!(
            "Simulated {} glaciers with {} in {:.1} s",
            glaciers.len(),
            dataset.label(),
            dataset_start.elapsed().as_secs_f64()
        );
    }

    if config.simulation.output_package == 0 {
        info!("Output package 0: no simulation output written");
    }
    info!("Total processing time {:.1} s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ensemble(n: usize) -> Vec<ModelParameters> {
        (0..n)
            .map(|i| ModelParameters {
                tempchange: i as f64,
                ..ModelParameters::default()
            })
            .collect()
    }

    #[test]
    fn every_kth_member_after_burn() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let selected = select_parameters(&ensemble(100), 10, 20, &mut rng);

        assert_eq!(selected.len(), 10);
        let first = selected[0].tempchange;
        assert!((20.0..28.0).contains(&first));
        for (k, params) in selected.iter().enumerate() {
            assert_relative_eq!(params.tempchange, first + 8.0 * k as f64);
        }
    }

    #[test]
    fn single_set_is_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let selected = select_parameters(&ensemble(5), 1, 0, &mut rng);
        assert_eq!(selected.len(), 1);
        assert_relative_eq!(selected[0].tempchange, 2.0);
        assert_relative_eq!(selected[0].ddfsnow, 0.0041);

        let one = select_parameters(&ensemble(1), 50, 0, &mut rng);
        assert_eq!(one, ensemble(1));
        assert!(select_parameters(&[], 5, 0, &mut rng).is_empty());
    }

    #[test]
    fn more_members_than_available() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let selected = select_parameters(&ensemble(6), 10, 2, &mut rng);
        // Spacing of one: all members after the burn-in
        assert_eq!(selected.len(), 4);
        assert_relative_eq!(selected[0].tempchange, 2.0);
    }

    #[test]
    fn no_members_requested() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(select_parameters(&ensemble(10), 0, 2, &mut rng).is_empty());
        assert!(select_parameters(&ensemble(1), 0, 0, &mut rng).is_empty());
    }
}
