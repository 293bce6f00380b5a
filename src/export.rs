//! Writing, merging and reading run output.

use crate::error::{RunError, RunResult};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Axis};
use rgem_calibrate::optimize::OptimisationResult;
use rgem_calibrate::CalibratedEnsemble;
use rgem_core::massbalance::MassBalanceOutput;
use rgem_core::parameters::ModelParameters;
use rgem_core::stats::EnsembleStats;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

fn create_parent(path: &Path) -> RunResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| RunError::io(dir, e))
        }
        _ => Ok(()),
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> RunResult<()> {
    create_parent(path)?;
    let file = File::create(path).map_err(|e| RunError::io(path, e))?;
    serde_json::to_writer(BufWriter::new(file), value).map_err(|e| RunError::json(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> RunResult<T> {
    let file = File::open(path).map_err(|e| RunError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| RunError::json(path, e))
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> RunResult<()> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| RunError::csv(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| RunError::csv(path, e))?;
    }
    writer.flush().map_err(|e| RunError::io(path, e))
}

/// Files in `dir` whose name satisfies `keep`, sorted by name.
fn files_in(dir: &Path, keep: impl Fn(&str) -> bool) -> RunResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| RunError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(&keep)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Summary of one simulated ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberOutput {
    pub parameters: ModelParameters,
    /// Mean annual glacier-wide mass balance (m w.e. a^-1)
    pub mb_mwea: f64,
    /// Glacier-wide mass balance of each year (m w.e.)
    pub massbaltotal_annual: Array1<f64>,
    /// Runoff of each year (m^3)
    pub runoff_annual: Array1<f64>,
    /// Area at the start of each year and after the last year (km^2)
    pub area: Array1<f64>,
    /// Volume at the start of each year and after the last year (km^3)
    pub volume: Array1<f64>,
    /// Equilibrium line altitude of each year (m a.s.l.)
    pub ela: Array1<f64>,
}

impl MemberOutput {
    /// Summarise a run whose spinup years were already removed.
    pub fn new(parameters: ModelParameters, output: &MassBalanceOutput) -> Self {
        let massbaltotal_annual = output.annual_massbaltotal();
        let mb_mwea = massbaltotal_annual.mean().unwrap_or(f64::NAN);
        Self {
            parameters,
            mb_mwea,
            massbaltotal_annual,
            runoff_annual: output.annual_runoff(),
            area: output.area.clone(),
            volume: output.volume.clone(),
            ela: output.ela.clone(),
        }
    }
}

fn stack(members: &[MemberOutput], series: impl Fn(&MemberOutput) -> Array1<f64>) -> Array2<f64> {
    let rows: Vec<Array1<f64>> = members.iter().map(series).collect();
    let views: Vec<_> = rows.iter().map(|r| r.view()).collect();
    ndarray::stack(Axis(0), &views).unwrap_or_else(|_| Array2::zeros((0, 0)))
}

/// Statistics of every output variable across the members.
pub fn ensemble_statistics(members: &[MemberOutput]) -> IndexMap<String, EnsembleStats> {
    let mut stats = IndexMap::new();
    let variables: [(&str, fn(&MemberOutput) -> Array1<f64>); 6] = [
        ("mb_mwea", |m| Array1::from_elem(1, m.mb_mwea)),
        ("massbaltotal_annual", |m| m.massbaltotal_annual.clone()),
        ("runoff_annual", |m| m.runoff_annual.clone()),
        ("area", |m| m.area.clone()),
        ("volume", |m| m.volume.clone()),
        ("ela", |m| m.ela.clone()),
    ];
    for (name, series) in variables {
        let table = stack(members, series);
        stats.insert(name.to_string(), EnsembleStats::from_members(table.view()));
    }
    stats
}

/// Output of a glacier: every member or the ensemble statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "package", rename_all = "snake_case")]
pub enum SimulationOutput {
    Members { members: Vec<MemberOutput> },
    Statistics {
        n_members: usize,
        variables: IndexMap<String, EnsembleStats>,
    },
}

/// Simulation of one glacier with one climate dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlacierSimulation {
    pub rgi_id: String,
    pub dataset: String,
    pub scenario: Option<String>,
    /// Labels of the model years
    pub years: Vec<i32>,
    /// Labels of the model years plus the year after the run, for area and volume
    pub years_plus_one: Vec<i32>,
    pub output: SimulationOutput,
}

/// Row of the optimised parameter table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub rgi_id: String,
    pub glacier_number: String,
    pub lrgcm: f64,
    pub lrglac: f64,
    pub precfactor: f64,
    pub precgrad: f64,
    pub ddfsnow: f64,
    pub ddfice: f64,
    pub tempsnow: f64,
    pub tempchange: f64,
    pub calround: usize,
    pub sum_abs_zscore: f64,
}

impl From<&OptimisationResult> for ParameterRow {
    fn from(result: &OptimisationResult) -> Self {
        let p = &result.parameters;
        Self {
            rgi_id: result.rgi_id.clone(),
            glacier_number: result.glacier_number.clone(),
            lrgcm: p.lrgcm,
            lrglac: p.lrglac,
            precfactor: p.precfactor,
            precgrad: p.precgrad,
            ddfsnow: p.ddfsnow,
            ddfice: p.ddfice,
            tempsnow: p.tempsnow,
            tempchange: p.tempchange,
            calround: result.rounds,
            sum_abs_zscore: result.objective,
        }
    }
}

impl ParameterRow {
    pub fn parameters(&self) -> ModelParameters {
        ModelParameters {
            lrgcm: self.lrgcm,
            lrglac: self.lrglac,
            precfactor: self.precfactor,
            precgrad: self.precgrad,
            ddfsnow: self.ddfsnow,
            ddfice: self.ddfice,
            tempsnow: self.tempsnow,
            tempchange: self.tempchange,
        }
    }
}

/// Remove the per-glacier ensembles of a previous run.
pub fn clear_json_files(dir: &Path) -> RunResult<usize> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| RunError::io(dir, e))?;
        return Ok(0);
    }
    let files = files_in(dir, |name| name.ends_with(".json"))?;
    for file in &files {
        std::fs::remove_file(file).map_err(|e| RunError::io(file, e))?;
    }
    Ok(files.len())
}

/// Merge the per-glacier ensembles of `dir` into one file keyed by RGI id.
pub fn merge_ensembles(dir: &Path, merged: &Path) -> RunResult<usize> {
    let mut ensembles: IndexMap<String, CalibratedEnsemble> = IndexMap::new();
    for file in files_in(dir, |name| name.ends_with(".json"))? {
        let ensemble: CalibratedEnsemble = read_json(&file)?;
        debug!("Merging {}", file.display());
        ensembles.insert(ensemble.rgi_id.clone(), ensemble);
    }
    ensembles.sort_keys();
    write_json(merged, &ensembles)?;
    Ok(ensembles.len())
}

/// Chunk number of a `<prefix><n>.csv` file name.
fn chunk_number(path: &Path, prefix: &str) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(prefix)?
        .parse()
        .ok()
}

/// Concatenate the CSV files of `dir` starting with `prefix` into `merged`.
///
/// Chunks are merged in the order of their number, `<prefix>2.csv` before `<prefix>10.csv`.
/// The header of the first file is kept and the merged files are removed.
pub fn merge_csv_chunks(dir: &Path, prefix: &str, merged: &Path) -> RunResult<usize> {
    let mut chunks = files_in(dir, |name| name.starts_with(prefix) && name.ends_with(".csv"))?;
    chunks.sort_by_key(|path| (chunk_number(path, prefix).unwrap_or(usize::MAX), path.clone()));
    let mut writer = csv::Writer::from_path(merged).map_err(|e| RunError::csv(merged, e))?;
    let mut header_written = false;
    let mut n_rows = 0;

    for chunk in &chunks {
        let mut reader = csv::Reader::from_path(chunk).map_err(|e| RunError::csv(chunk, e))?;
        let headers = reader.headers().map_err(|e| RunError::csv(chunk, e))?;
        if !header_written && !headers.is_empty() {
            writer
                .write_record(headers)
                .map_err(|e| RunError::csv(merged, e))?;
            header_written = true;
        }
        for record in reader.records() {
            let record = record.map_err(|e| RunError::csv(chunk, e))?;
            writer
                .write_record(&record)
                .map_err(|e| RunError::csv(merged, e))?;
            n_rows += 1;
        }
    }
    writer.flush().map_err(|e| RunError::io(merged, e))?;

    for chunk in &chunks {
        std::fs::remove_file(chunk).map_err(|e| RunError::io(chunk, e))?;
    }
    Ok(n_rows)
}

/// Calibrated parameter sets of each glacier, keyed by RGI id.
///
/// Reads either merged ensembles (`.json`) or an optimised parameter table (`.csv`, one
/// parameter set per glacier).
pub fn load_calibrated_parameters(
    path: &Path,
) -> RunResult<IndexMap<String, Vec<ModelParameters>>> {
    let is_csv = path.extension().is_some_and(|ext| ext == "csv");
    if is_csv {
        let mut reader = csv::Reader::from_path(path).map_err(|e| RunError::csv(path, e))?;
        let mut parameters = IndexMap::new();
        for row in reader.deserialize::<ParameterRow>() {
            let row = row.map_err(|e| RunError::csv(path, e))?;
            parameters.insert(row.rgi_id.clone(), vec![row.parameters()]);
        }
        Ok(parameters)
    } else {
        let ensembles: IndexMap<String, CalibratedEnsemble> = read_json(path)?;
        Ok(ensembles
            .into_iter()
            .map(|(rgi_id, ensemble)| (rgi_id, ensemble.parameters()))
            .collect())
    }
}
