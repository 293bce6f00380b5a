//! Calibration of the selected glaciers against mass balance observations.
//!
//! Two methods are available. Optimisation writes one row of parameters per glacier and
//! one comparison row per observation to CSV chunks, which are merged into dated files.
//! MCMC writes the calibrated ensemble of every glacier to its own file, which are merged
//! into a single file keyed by RGI id.

use crate::config::{CalibrationMethod, RunConfig};
use crate::error::RunResult;
use crate::export::{
    clear_json_files, merge_csv_chunks, merge_ensembles, write_csv, write_json, ParameterRow,
};
use crate::setup::{self, ClimateDataset, ClimateSource, Execution};
use rayon::prelude::*;
use rgem_calibrate::optimize::Comparison;
use rgem_calibrate::{
    calibrate_glacier, load_observations, optimise_glacier, GlacierProblem, GlacierRunner,
    MassBalanceObservation, ObservationType,
};
use rgem_core::dates::DatesTable;
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inputs of every glacier of a calibration run.
struct CalibrationInputs<'a> {
    config: &'a RunConfig,
    glaciers: &'a [GlacierAttributes],
    geometries: &'a [GlacierGeometry],
    climate: &'a ClimateSource,
    dates: &'a DatesTable,
    observations: &'a [MassBalanceObservation],
}

impl CalibrationInputs<'_> {
    fn glacier_observations(&self, glacier: &GlacierAttributes) -> Vec<MassBalanceObservation> {
        self.observations
            .iter()
            .filter(|obs| obs.rgi_id == glacier.rgi_id)
            .cloned()
            .collect()
    }

    /// Optimise glacier `index`, returning `None` when it has no observations.
    fn optimise(&self, index: usize) -> RunResult<Option<(ParameterRow, Vec<Comparison>)>> {
        let glacier = &self.glaciers[index];
        let observations = self.glacier_observations(glacier);
        if observations.is_empty() {
            debug!("{} has no observations", glacier.rgi_id);
            return Ok(None);
        }
        let climate = self
            .climate
            .glacier_climate(self.config, index, glacier, self.dates)?;
        let problem = GlacierProblem {
            base: self.config.parameters,
            glacier,
            geometry: &self.geometries[index],
            climate: &climate,
            dates: self.dates,
            options: &self.config.options,
            observations: &observations,
        };
        let result = optimise_glacier(&problem, &self.config.calibration.optimisation)?;
        Ok(Some((ParameterRow::from(&result), result.comparisons)))
    }

    /// Sample the ensemble of glacier `index` and write it to the parallel directory.
    fn sample(&self, index: usize) -> RunResult<bool> {
        let glacier = &self.glaciers[index];
        let observations = self.glacier_observations(glacier);
        let Some(observation) = calibration_observation(&observations) else {
            debug!("{} has no observations", glacier.rgi_id);
            return Ok(false);
        };
        if observations.len() > 1 {
            debug!(
                "{} has {} observations; calibrating against {}-{}",
                glacier.rgi_id,
                observations.len(),
                observation.t1,
                observation.t2
            );
        }

        let climate = self
            .climate
            .glacier_climate(self.config, index, glacier, self.dates)?;
        let runner = GlacierRunner::new(
            self.config.parameters,
            glacier.clone(),
            self.geometries[index].clone(),
            climate,
            self.dates.clone(),
            self.config.options,
            observation.clone(),
        );
        let mut settings = self.config.calibration.mcmc.clone();
        settings.seed = settings.seed.map(|seed| seed.wrapping_add(index as u64));

        let ensemble = calibrate_glacier(runner, &settings)?;
        info!(
            "{}: {} members, mean {:.3} (observed {:.3}) m w.e. a-1",
            glacier.rgi_id,
            ensemble.len(),
            ensemble.ensemble_mean,
            ensemble.observed
        );
        let path = self
            .config
            .calibration
            .parallel_dir
            .join(format!("{}.json", glacier.rgi_id));
        write_json(&path, &ensemble)?;
        Ok(true)
    }
}

/// Observation an ensemble is calibrated against: the first geodetic observation, or the
/// first observation if there is none.
pub fn calibration_observation(
    observations: &[MassBalanceObservation],
) -> Option<&MassBalanceObservation> {
    observations
        .iter()
        .find(|obs| obs.obs_type == ObservationType::Geodetic)
        .or_else(|| observations.first())
}

/// Prefixes of the parameter and comparison chunks of an optimisation run.
pub fn optimisation_prefixes(config: &RunConfig, dataset: &ClimateDataset) -> (String, String) {
    let regions = config
        .glaciers
        .regions_o1
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = format!(
        "opt{}_R{}_{}_{}_{}_",
        CalibrationMethod::Optimisation.option_number(),
        regions,
        dataset.label(),
        config.run.start_year - config.run.spinup_years as i32,
        config.run.end_year
    );
    (
        format!("cal_modelparams_{}", suffix),
        format!("cal_compare_{}", suffix),
    )
}

/// Log a failed glacier and carry on with the rest of the chunk.
fn skip_failed<T>(rgi_id: &str, result: RunResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Calibration of {} failed: {}", rgi_id, e);
            None
        }
    }
}

fn run_optimisation(
    inputs: &CalibrationInputs,
    dataset: &ClimateDataset,
    execution: Execution,
) -> RunResult<()> {
    let config = inputs.config;
    let output_dir = &config.calibration.output_dir;
    let (params_prefix, compare_prefix) = optimisation_prefixes(config, dataset);

    let indices: Vec<usize> = (0..inputs.glaciers.len()).collect();
    let chunks: Vec<&[usize]> = indices
        .chunks(execution.chunk_size(indices.len()))
        .collect();
    let optimise_chunk = |(n, chunk): (usize, &&[usize])| -> RunResult<()> {
        let mut parameters = Vec::new();
        let mut comparisons = Vec::new();
        for &i in chunk.iter() {
            let rgi_id = &inputs.glaciers[i].rgi_id;
            if let Some(Some((row, compare))) = skip_failed(rgi_id, inputs.optimise(i)) {
                parameters.push(row);
                comparisons.extend(compare);
            }
        }
        write_csv(
            &output_dir.join(format!("{}{}.csv", params_prefix, n)),
            &parameters,
        )?;
        write_csv(
            &output_dir.join(format!("{}{}.csv", compare_prefix, n)),
            &comparisons,
        )
    };
    if execution.serial {
        chunks.iter().enumerate().try_for_each(optimise_chunk)?;
    } else {
        execution
            .thread_pool()?
            .install(|| chunks.par_iter().enumerate().try_for_each(optimise_chunk))?;
    }

    let date = chrono::Local::now().format("%Y%m%d").to_string();
    for prefix in [&params_prefix, &compare_prefix] {
        let merged = output_dir.join(format!("{}_{}.csv", date, prefix.trim_end_matches('_')));
        let rows = merge_csv_chunks(output_dir, prefix, &merged)?;
        info!("Merged {} rows into {}", rows, merged.display());
    }
    Ok(())
}

fn run_mcmc(inputs: &CalibrationInputs, execution: Execution) -> RunResult<()> {
    let settings = &inputs.config.calibration;
    let removed = clear_json_files(&settings.parallel_dir)?;
    if removed > 0 {
        debug!(
            "Removed {} ensembles of a previous run from {}",
            removed,
            settings.parallel_dir.display()
        );
    }

    let sample_glacier = |i: usize| {
        skip_failed(&inputs.glaciers[i].rgi_id, inputs.sample(i)).unwrap_or(false)
    };
    let calibrated = if execution.serial {
        (0..inputs.glaciers.len()).filter(|&i| sample_glacier(i)).count()
    } else {
        execution.thread_pool()?.install(|| {
            (0..inputs.glaciers.len())
                .into_par_iter()
                .filter(|&i| sample_glacier(i))
                .count()
        })
    };
    info!(
        "Calibrated {} of {} glaciers",
        calibrated,
        inputs.glaciers.len()
    );

    let merged = settings.output_dir.join(&settings.output_filename);
    let n = merge_ensembles(&settings.parallel_dir, &merged)?;
    info!("Merged {} ensembles into {}", n, merged.display());
    Ok(())
}

/// Calibrate every selected glacier with observations against the reference climate.
///
/// # Arguments
///
/// * `config` - Run configuration
/// * `glacier_list` - File of glacier numbers overriding the configured selection
/// * `execution` - Parallelism of the run
pub fn run(config: &RunConfig, glacier_list: Option<&Path>, execution: Execution) -> RunResult<()> {
    let start = Instant::now();
    let mut glaciers = setup::glaciers(config, glacier_list)?;
    let geometries = setup::geometries(config, &mut glaciers)?;
    let dates = setup::dates(config)?;
    let observations = load_observations(
        &config.calibration.observations,
        &glaciers,
        &geometries,
        &dates,
    )?;
    info!(
        "Loaded {} observations from {}",
        observations.len(),
        config.calibration.observations.display()
    );

    let dataset = ClimateDataset::reference(&config.climate.reference);
    let climate = ClimateSource::load(config, &dataset, &glaciers)?;
    let inputs = CalibrationInputs {
        config,
        glaciers: &glaciers,
        geometries: &geometries,
        climate: &climate,
        dates: &dates,
        observations: &observations,
    };

    match config.calibration.method {
        CalibrationMethod::Optimisation => run_optimisation(&inputs, &dataset, execution)?,
        CalibrationMethod::Mcmc => run_mcmc(&inputs, execution)?,
    }
    info!("Total processing time {:.1} s", start.elapsed().as_secs_f64());
    Ok(())
}
