//! Inputs shared by simulation and calibration runs.

use crate::config::{ClimateSettings, RunConfig};
use crate::error::{RunError, RunResult};
use rgem_core::climate::{
    load_bias_adjustments, BiasAdjustment, BiasMethod, ClimateGrid, GlacierClimate,
    LapseRateSource,
};
use rgem_core::dates::DatesTable;
use rgem_core::geometry::{hypsometry_stats, import_huss_table, GlacierGeometry};
use rgem_core::glacier::{select_glaciers, GlacierAttributes};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read a text file with one entry per line, ignoring blank lines.
pub fn read_list(path: &Path) -> RunResult<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Select the glaciers of the run.
///
/// A glacier list file, one glacier number per line, overrides the numbers in the
/// configuration.
pub fn glaciers(
    config: &RunConfig,
    glacier_list: Option<&Path>,
) -> RunResult<Vec<GlacierAttributes>> {
    let numbers = match glacier_list {
        Some(path) => Some(read_list(path)?),
        None => config.glaciers.glacier_numbers.clone(),
    };
    let glaciers = select_glaciers(
        &config.glaciers.rgi_dir,
        &config.glaciers.regions_o1,
        config.glaciers.regions_o2.as_deref(),
        numbers.as_deref(),
    )?;
    info!(
        "Selected {} glaciers in regions {:?}",
        glaciers.len(),
        config.glaciers.regions_o1
    );
    Ok(glaciers)
}

/// Load the initial geometry of every glacier and fill in its volume and mean elevation.
pub fn geometries(
    config: &RunConfig,
    glaciers: &mut [GlacierAttributes],
) -> RunResult<Vec<GlacierGeometry>> {
    let area = import_huss_table(&config.geometry.area, glaciers)?;
    let thickness = import_huss_table(&config.geometry.thickness, glaciers)?;
    let width = import_huss_table(&config.geometry.width, glaciers)?;
    let geometries = GlacierGeometry::from_tables(&area, &thickness, &width)?;

    for (glacier, geometry) in glaciers.iter_mut().zip(&geometries) {
        let (volume, zmean) = hypsometry_stats(geometry);
        glacier.volume_km3 = volume;
        glacier.zmean = zmean;
    }
    Ok(geometries)
}

pub fn dates(config: &RunConfig) -> RunResult<DatesTable> {
    Ok(DatesTable::model_run(
        config.run.start_year,
        config.run.end_year,
        config.run.spinup_years,
        config.run.year_type,
    )?)
}

/// A climate dataset, optionally of an emission scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateDataset {
    pub name: String,
    pub scenario: Option<String>,
}

impl ClimateDataset {
    pub fn reference(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scenario: None,
        }
    }

    /// Name including the scenario, as used in directory and file names.
    pub fn label(&self) -> String {
        match &self.scenario {
            Some(scenario) => format!("{}_{}", self.name, scenario),
            None => self.name.clone(),
        }
    }

    /// Whether the forcing is read from the reference dataset, either because this is
    /// the reference or because a synthetic climate repeats the reference period.
    fn reads_reference(&self, settings: &ClimateSettings) -> bool {
        settings.synthetic.is_some()
            || (self.name == settings.reference && self.scenario.is_none())
    }

    /// Bias adjustment applied to this dataset. Reference forcing is never adjusted.
    pub fn bias_method(&self, settings: &ClimateSettings) -> BiasMethod {
        if self.reads_reference(settings) {
            BiasMethod::None
        } else {
            settings.bias_method
        }
    }
}

/// Climate datasets named on the command line.
///
/// The argument is either the name of the reference dataset or a file listing dataset
/// names. The scenario is the second `_`-separated token of the list's file name, e.g.
/// `gcms_rcp45.txt` holds datasets of scenario `rcp45`.
pub fn climate_datasets(argument: Option<&str>, reference: &str) -> RunResult<Vec<ClimateDataset>> {
    let argument = match argument {
        None => return Ok(vec![ClimateDataset::reference(reference)]),
        Some(a) if a == reference => return Ok(vec![ClimateDataset::reference(reference)]),
        Some(a) => a,
    };

    let path = Path::new(argument);
    let scenario = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.split('_').nth(1))
        .map(String::from)
        .ok_or_else(|| {
            RunError::Config(format!(
                "cannot find the scenario in the name of climate list {}",
                path.display()
            ))
        })?;

    let datasets: Vec<ClimateDataset> = read_list(path)?
        .into_iter()
        .map(|name| ClimateDataset {
            name,
            scenario: Some(scenario.clone()),
        })
        .collect();
    info!(
        "Found {} climate datasets of scenario {}",
        datasets.len(),
        scenario
    );
    Ok(datasets)
}

/// Climate forcing of every glacier from one dataset.
#[derive(Debug)]
pub struct ClimateSource {
    grid: ClimateGrid,
    lapse: LapseRateSource,
    adjustments: Vec<BiasAdjustment>,
}

impl ClimateSource {
    /// Load a dataset and the bias adjustment of every glacier.
    ///
    /// The reference dataset, also repeated by a synthetic climate, carries a gridded
    /// lapse rate and is never adjusted. Other datasets use the lapse rate climatology
    /// of the configuration.
    pub fn load(
        config: &RunConfig,
        dataset: &ClimateDataset,
        glaciers: &[GlacierAttributes],
    ) -> RunResult<Self> {
        let settings = &config.climate;
        let reference = dataset.reads_reference(settings);

        let dir = if reference {
            settings.dir.join(&settings.reference)
        } else {
            settings.dir.join(dataset.label())
        };
        let grid = ClimateGrid::from_csv(dir.join("climate.csv"), dir.join("elevation.csv"))?;

        let lapse = if reference {
            LapseRateSource::Gridded
        } else {
            LapseRateSource::MonthlyClimatology(settings.lapse_rate_climatology)
        };

        let method = dataset.bias_method(settings);
        let adjustments = load_bias_adjustments(bias_table(config, dataset), method, glaciers)?;
        debug!(
            "Loaded climate {} from {} (bias adjustment {:?})",
            dataset.label(),
            dir.display(),
            method
        );

        Ok(Self {
            grid,
            lapse,
            adjustments,
        })
    }

    /// Climate of glacier `index` aligned to the model dates.
    pub fn glacier_climate(
        &self,
        config: &RunConfig,
        index: usize,
        glacier: &GlacierAttributes,
        dates: &DatesTable,
    ) -> RunResult<GlacierClimate> {
        let mut climate = match &config.climate.synthetic {
            Some(synthetic) => synthetic.glacier_climate(&self.grid, glacier, dates, &self.lapse)?,
            None => self.grid.glacier_climate(glacier, dates, &self.lapse)?,
        };
        if let Some(adjustment) = self.adjustments.get(index) {
            adjustment.apply(&mut climate, dates)?;
        }
        Ok(climate)
    }
}

fn bias_table(config: &RunConfig, dataset: &ClimateDataset) -> PathBuf {
    config
        .climate
        .bias_dir
        .join(format!("{}_biasadj.csv", dataset.label()))
}

/// How glaciers are split over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub processes: usize,
    pub serial: bool,
}

impl Execution {
    /// Number of glaciers per chunk.
    ///
    /// Glaciers are split into one chunk per process when running in parallel and there
    /// are at least two glaciers per process; otherwise all glaciers form a single chunk.
    pub fn chunk_size(&self, n_glaciers: usize) -> usize {
        let processes = self.processes.max(1);
        if self.serial || n_glaciers < 2 * processes {
            n_glaciers.max(1)
        } else {
            n_glaciers.div_ceil(processes)
        }
    }

    pub fn thread_pool(&self) -> RunResult<rayon::ThreadPool> {
        let threads = if self.serial { 1 } else { self.processes.max(1) };
        Ok(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgem_core::climate::SyntheticClimate;
    use std::io::Write;

    #[test]
    fn chunking() {
        let parallel = Execution {
            processes: 4,
            serial: false,
        };
        assert_eq!(parallel.chunk_size(100), 25);
        assert_eq!(parallel.chunk_size(10), 3);
        // Too few glaciers to split
        assert_eq!(parallel.chunk_size(7), 7);

        let serial = Execution {
            processes: 4,
            serial: true,
        };
        assert_eq!(serial.chunk_size(100), 100);
        assert_eq!(serial.chunk_size(0), 1);
    }

    #[test]
    fn reference_forcing_is_not_bias_adjusted() {
        let mut settings = ClimateSettings {
            bias_method: BiasMethod::HussHock2015,
            ..ClimateSettings::default()
        };
        let gcm = ClimateDataset {
            name: "CanESM2".to_string(),
            scenario: Some("rcp45".to_string()),
        };
        let reference = ClimateDataset::reference("ERA-Interim");

        assert_eq!(gcm.bias_method(&settings), BiasMethod::HussHock2015);
        assert_eq!(reference.bias_method(&settings), BiasMethod::None);

        // A synthetic climate repeats the reference dataset for every climate model
        settings.synthetic = Some(SyntheticClimate::default());
        assert_eq!(gcm.bias_method(&settings), BiasMethod::None);
        assert!(gcm.reads_reference(&settings));
    }

    #[test]
    fn reference_dataset() {
        let datasets = climate_datasets(None, "ERA-Interim").unwrap();
        assert_eq!(datasets, vec![ClimateDataset::reference("ERA-Interim")]);
        let datasets = climate_datasets(Some("ERA-Interim"), "ERA-Interim").unwrap();
        assert_eq!(datasets[0].label(), "ERA-Interim");
    }

    #[test]
    fn dataset_list_with_scenario() {
        let path = std::env::temp_dir().join("gcms_rcp85.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "CanESM2\n\nMPI-ESM-LR  ").unwrap();

        let datasets = climate_datasets(path.to_str(), "ERA-Interim").unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[1].name, "MPI-ESM-LR");
        assert_eq!(datasets[1].scenario.as_deref(), Some("rcp85"));
        assert_eq!(datasets[0].label(), "CanESM2_rcp85");

        let unnamed = std::env::temp_dir().join("gcms.txt");
        std::fs::File::create(&unnamed).unwrap();
        assert!(climate_datasets(unnamed.to_str(), "ERA-Interim").is_err());
    }
}
