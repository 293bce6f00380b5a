//! Run configuration read from a TOML file.
//!
//! Every section and field has a default, so a configuration only needs to list what
//! differs from the defaults. See `rgem.toml` at the repository root for a complete
//! example.

use crate::error::{RunError, RunResult};
use rgem_calibrate::{McmcSettings, OptimisationSettings};
use rgem_core::climate::{BiasMethod, SyntheticClimate};
use rgem_core::dates::YearType;
use rgem_core::parameters::{MassBalanceOptions, ModelParameters};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Glaciers to model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlacierSelection {
    /// Directory of RGI inventory tables
    /// default: rgi
    pub rgi_dir: PathBuf,
    /// First-order RGI regions
    /// default: [15]
    pub regions_o1: Vec<u32>,
    /// Second-order RGI regions, all when unset
    pub regions_o2: Option<Vec<u32>>,
    /// Glacier numbers (e.g. "03473"), all when unset
    pub glacier_numbers: Option<Vec<String>>,
}

impl Default for GlacierSelection {
    fn default() -> Self {
        Self {
            rgi_dir: PathBuf::from("rgi"),
            regions_o1: vec![15],
            regions_o2: None,
            glacier_numbers: None,
        }
    }
}

/// Bin tables of the initial glacier geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryTables {
    /// Glacier area per bin (km^2)
    pub area: PathBuf,
    /// Ice thickness per bin (m)
    pub thickness: PathBuf,
    /// Glacier width per bin (km)
    pub width: PathBuf,
}

impl Default for GeometryTables {
    fn default() -> Self {
        Self {
            area: PathBuf::from("geometry/area.csv"),
            thickness: PathBuf::from("geometry/thickness.csv"),
            width: PathBuf::from("geometry/width.csv"),
        }
    }
}

/// Climate datasets and their corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateSettings {
    /// Directory holding one sub-directory per dataset with `climate.csv` and
    /// `elevation.csv`; scenario datasets are stored as `<name>_<scenario>`
    /// default: climate
    pub dir: PathBuf,
    /// Name of the reference dataset, used for calibration
    /// default: ERA-Interim
    pub reference: String,
    /// Mean lapse rate of each calendar month for datasets without a gridded lapse rate
    /// unit: K m^-1
    /// default: -0.0065 for every month
    pub lapse_rate_climatology: [f64; 12],
    /// Bias adjustment of datasets other than the reference
    /// default: none
    pub bias_method: BiasMethod,
    /// Directory of bias adjustment tables named `<dataset>_<scenario>_biasadj.csv`
    /// default: bias_adjustments
    pub bias_dir: PathBuf,
    /// Replace the climate by a repeated reference period
    /// default: unset
    pub synthetic: Option<SyntheticClimate>,
}

impl Default for ClimateSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("climate"),
            reference: "ERA-Interim".to_string(),
            lapse_rate_climatology: [-0.0065; 12],
            bias_method: BiasMethod::None,
            bias_dir: PathBuf::from("bias_adjustments"),
            synthetic: None,
        }
    }
}

/// Model period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPeriod {
    /// First year after spinup
    /// default: 2000
    pub start_year: i32,
    /// Last year (inclusive)
    /// default: 2015
    pub end_year: i32,
    /// default: 0
    pub spinup_years: u32,
    /// default: water
    pub year_type: YearType,
}

impl Default for RunPeriod {
    fn default() -> Self {
        Self {
            start_year: 2000,
            end_year: 2015,
            spinup_years: 0,
            year_type: YearType::Water,
        }
    }
}

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Directory of the simulation output
    /// default: output/simulations
    pub output_dir: PathBuf,
    /// 0: no output, 1: every ensemble member, 2: ensemble statistics
    /// default: 2
    pub output_package: u8,
    /// Merged calibrated ensembles; the default parameters are used when unset
    pub calibrated_parameters: Option<PathBuf>,
    /// Number of ensemble members to simulate
    /// default: 100
    pub sim_iters: usize,
    /// Members skipped at the start of a calibrated ensemble
    /// default: 0
    pub sim_burn: usize,
    /// Seed for the choice of ensemble members
    /// default: unset
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/simulations"),
            output_package: 2,
            calibrated_parameters: None,
            sim_iters: 100,
            sim_burn: 0,
            seed: None,
        }
    }
}

/// Calibration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Minimise the z-score misfit
    Optimisation,
    /// Sample the posterior with Markov chain Monte Carlo
    #[default]
    Mcmc,
}

impl CalibrationMethod {
    /// Number used in output file names.
    pub fn option_number(self) -> u8 {
        match self {
            CalibrationMethod::Optimisation => 1,
            CalibrationMethod::Mcmc => 2,
        }
    }
}

/// Calibration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// default: mcmc
    pub method: CalibrationMethod,
    /// Mass balance observations
    /// default: observations/mass_balance.csv
    pub observations: PathBuf,
    /// Directory of the merged calibration output
    /// default: output/calibration
    pub output_dir: PathBuf,
    /// Directory of the per-glacier ensembles, cleared before every run
    /// default: output/calibration/parallel
    pub parallel_dir: PathBuf,
    /// File name of the merged ensembles
    /// default: calibrated_ensembles.json
    pub output_filename: String,
    pub mcmc: McmcSettings,
    pub optimisation: OptimisationSettings,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            method: CalibrationMethod::Mcmc,
            observations: PathBuf::from("observations/mass_balance.csv"),
            output_dir: PathBuf::from("output/calibration"),
            parallel_dir: PathBuf::from("output/calibration/parallel"),
            output_filename: "calibrated_ensembles.json".to_string(),
            mcmc: McmcSettings::default(),
            optimisation: OptimisationSettings::default(),
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub glaciers: GlacierSelection,
    pub geometry: GeometryTables,
    pub climate: ClimateSettings,
    pub run: RunPeriod,
    /// Parameters used when no calibrated parameters are available
    pub parameters: ModelParameters,
    pub options: MassBalanceOptions,
    pub simulation: SimulationSettings,
    pub calibration: CalibrationSettings,
}

impl RunConfig {
    /// Read a configuration file.
    ///
    /// Relative paths in the file are resolved against the directory of the file.
    pub fn from_file(path: &Path) -> RunResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
        let mut config: RunConfig = toml::from_str(&text).map_err(|source| RunError::ConfigParse {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.glaciers.rgi_dir);
        resolve(&mut self.geometry.area);
        resolve(&mut self.geometry.thickness);
        resolve(&mut self.geometry.width);
        resolve(&mut self.climate.dir);
        resolve(&mut self.climate.bias_dir);
        resolve(&mut self.simulation.output_dir);
        if let Some(p) = self.simulation.calibrated_parameters.as_mut() {
            resolve(p);
        }
        resolve(&mut self.calibration.observations);
        resolve(&mut self.calibration.output_dir);
        resolve(&mut self.calibration.parallel_dir);
    }

    pub fn validate(&self) -> RunResult<()> {
        if self.glaciers.regions_o1.is_empty() {
            return Err(RunError::Config("no first-order regions selected".to_string()));
        }
        if self.run.end_year < self.run.start_year {
            return Err(RunError::Config(format!(
                "end year {} is before start year {}",
                self.run.end_year, self.run.start_year
            )));
        }
        if self.simulation.output_package > 2 {
            return Err(RunError::Config(format!(
                "output_package must be 0, 1 or 2, got {}",
                self.simulation.output_package
            )));
        }
        if self.simulation.sim_iters == 0 {
            return Err(RunError::Config("sim_iters must be at least 1".to_string()));
        }
        if self.calibration.parallel_dir == self.calibration.output_dir {
            return Err(RunError::Config(
                "the parallel directory is cleared before calibrating and must differ from the output directory"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_from_empty_file() {
        let config: RunConfig = toml::from_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration.method, CalibrationMethod::Mcmc);
        assert_eq!(config.parameters, ModelParameters::default());
    }

    #[test]
    fn partial_sections() {
        let text = r#"
[glaciers]
regions_o1 = [13, 14]
glacier_numbers = ["03473", "03733"]

[run]
start_year = 1990
end_year = 2010
spinup_years = 5
year_type = "calendar"

[parameters]
tempchange = 0.5

[calibration]
method = "optimisation"

[calibration.mcmc]
iterations = 5000

[climate]
bias_method = "huss_hock2015"
"#;
        let config: RunConfig = toml::from_str(text).unwrap();
        assert_eq!(config.glaciers.regions_o1, vec![13, 14]);
        assert_eq!(config.run.year_type, YearType::Calendar);
        assert_eq!(config.parameters.tempchange, 0.5);
        assert_eq!(config.parameters.ddfsnow, 0.0041);
        assert_eq!(config.calibration.method, CalibrationMethod::Optimisation);
        assert_eq!(config.calibration.mcmc.iterations, 5000);
        assert_eq!(config.calibration.mcmc.burn, 200);
        assert_eq!(config.climate.bias_method, BiasMethod::HussHock2015);
        assert_eq!(config.simulation.output_package, 2);
    }

    #[test]
    fn paths_relative_to_file() {
        let dir = std::env::temp_dir().join("rgem-config-paths");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[glaciers]\nrgi_dir = \"inventory\"").unwrap();
        writeln!(file, "[simulation]\noutput_dir = \"/tmp/absolute\"").unwrap();

        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.glaciers.rgi_dir, dir.join("inventory"));
        assert_eq!(config.simulation.output_dir, PathBuf::from("/tmp/absolute"));
        assert_eq!(config.geometry.area, dir.join("geometry/area.csv"));
    }

    #[test]
    fn example_configuration() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("rgem.toml");
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.run.end_year, 2018);
        assert_eq!(config.glaciers.regions_o2, Some(vec![3]));
        assert!(config.calibration.parallel_dir.ends_with("output/calibration/parallel"));
        assert!(config.climate.synthetic.is_none());
    }

    #[test]
    fn invalid_configurations() {
        let mut config = RunConfig::default();
        config.simulation.output_package = 3;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.run.end_year = 1999;
        assert!(config.validate().is_err());

        assert!(toml::from_str::<RunConfig>("[run]\nstart_year = \"soon\"").is_err());
        assert!(RunConfig::from_file(Path::new("/nonexistent/rgem.toml")).is_err());
    }
}
