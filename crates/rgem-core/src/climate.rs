//! Climate forcing for the mass balance model.
//!
//! A [`ClimateGrid`] holds monthly temperature, precipitation and (optionally) lapse rate on a
//! regular latitude/longitude grid together with the surface elevation of each cell. The
//! forcing of a glacier is taken from the nearest grid cell and aligned to the model
//! [`DatesTable`] as a [`GlacierClimate`].
//!
//! Climate from a different dataset can be corrected towards the reference dataset with a
//! [`BiasAdjustment`], and a [`SyntheticClimate`] builds an artificial climate by repeating
//! a reference period.

use crate::dates::DatesTable;
use crate::errors::{GemError, GemResult};
use crate::glacier::GlacierAttributes;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Tolerance when matching coordinates to grid axes (degrees)
const COORD_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MonthlyClimate {
    temp: f64,
    prec: f64,
    lapse_rate: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct ClimateCell {
    elevation: f64,
    series: BTreeMap<(i32, u32), MonthlyClimate>,
}

#[derive(Debug, Deserialize)]
struct ClimateRecord {
    lat: f64,
    lon: f64,
    year: i32,
    month: u32,
    temp: f64,
    prec: f64,
    #[serde(default)]
    lr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ElevationRecord {
    lat: f64,
    lon: f64,
    elev: f64,
}

/// Source of the monthly lapse rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LapseRateSource {
    /// Lapse rate stored with the gridded climate
    #[default]
    Gridded,
    /// Mean lapse rate of each calendar month (January first), repeated every year
    MonthlyClimatology([f64; 12]),
}

/// Monthly climate on a regular latitude/longitude grid.
#[derive(Debug, Clone, Default)]
pub struct ClimateGrid {
    lats: Vec<f64>,
    lons: Vec<f64>,
    cells: HashMap<(usize, usize), ClimateCell>,
}

fn axis_index(axis: &[f64], value: f64) -> Option<usize> {
    axis.iter().position(|v| (v - value).abs() < COORD_TOL)
}

fn nearest_index(axis: &[f64], value: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
        .map(|(i, _)| i)
}

fn push_unique(axis: &mut Vec<f64>, value: f64) {
    if axis_index(axis, value).is_none() {
        axis.push(value);
    }
}

impl ClimateGrid {
    /// Load a grid from its climate and elevation tables.
    ///
    /// # Arguments
    ///
    /// * `climate_path` - CSV with columns `lat,lon,year,month,temp,prec` and optionally `lr`
    /// * `elevation_path` - CSV with columns `lat,lon,elev`
    pub fn from_csv<P: AsRef<Path>, Q: AsRef<Path>>(
        climate_path: P,
        elevation_path: Q,
    ) -> GemResult<Self> {
        let mut grid = Self::default();

        let elevation_path = elevation_path.as_ref();
        let elev_err = |source| GemError::Csv {
            path: elevation_path.display().to_string(),
            source,
        };
        let mut reader = csv::Reader::from_path(elevation_path).map_err(elev_err)?;
        for record in reader.deserialize::<ElevationRecord>() {
            let record = record.map_err(elev_err)?;
            grid.set_elevation(record.lat, record.lon, record.elev);
        }

        let climate_path = climate_path.as_ref();
        let clim_err = |source| GemError::Csv {
            path: climate_path.display().to_string(),
            source,
        };
        let mut reader = csv::Reader::from_path(climate_path).map_err(clim_err)?;
        for record in reader.deserialize::<ClimateRecord>() {
            let r = record.map_err(clim_err)?;
            grid.insert(r.lat, r.lon, r.year, r.month, r.temp, r.prec, r.lr)?;
        }

        debug!(
            "Loaded climate grid with {} x {} cells from {}",
            grid.lats.len(),
            grid.lons.len(),
            climate_path.display()
        );
        Ok(grid)
    }

    /// Set the surface elevation of a cell, adding the cell to the grid.
    pub fn set_elevation(&mut self, lat: f64, lon: f64, elevation: f64) {
        push_unique(&mut self.lats, lat);
        push_unique(&mut self.lons, lon);
        let key = (
            axis_index(&self.lats, lat).unwrap_or_default(),
            axis_index(&self.lons, lon).unwrap_or_default(),
        );
        self.cells.entry(key).or_default().elevation = elevation;
    }

    /// Insert one month of climate for a cell whose elevation is already known.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        lat: f64,
        lon: f64,
        year: i32,
        month: u32,
        temp: f64,
        prec: f64,
        lapse_rate: Option<f64>,
    ) -> GemResult<()> {
        let key = match (axis_index(&self.lats, lat), axis_index(&self.lons, lon)) {
            (Some(i), Some(j)) if self.cells.contains_key(&(i, j)) => (i, j),
            _ => {
                return Err(GemError::missing(
                    "climate grid",
                    format!("no elevation for cell ({}, {})", lat, lon),
                ))
            }
        };
        if !(1..=12).contains(&month) {
            return Err(GemError::InvalidInput(format!("month {} out of range", month)));
        }

        if let Some(cell) = self.cells.get_mut(&key) {
            cell.series.insert(
                (year, month),
                MonthlyClimate {
                    temp,
                    prec,
                    lapse_rate,
                },
            );
        }
        Ok(())
    }

    /// Grid indices of the cell nearest to a location.
    ///
    /// Latitude and longitude are matched independently against the grid axes.
    pub fn nearest_cell(&self, lat: f64, lon: f64) -> GemResult<(usize, usize)> {
        match (nearest_index(&self.lats, lat), nearest_index(&self.lons, lon)) {
            (Some(i), Some(j)) => Ok((i, j)),
            _ => Err(GemError::missing("climate grid", "grid is empty")),
        }
    }

    /// Coordinates of a cell.
    pub fn cell_coordinates(&self, cell: (usize, usize)) -> Option<(f64, f64)> {
        Some((*self.lats.get(cell.0)?, *self.lons.get(cell.1)?))
    }

    /// Climate of the cell nearest to a glacier, aligned to the model dates.
    pub fn glacier_climate(
        &self,
        glacier: &GlacierAttributes,
        dates: &DatesTable,
        lapse: &LapseRateSource,
    ) -> GemResult<GlacierClimate> {
        let key = self.nearest_cell(glacier.cen_lat, glacier.cen_lon)?;
        let cell = self.cells.get(&key).ok_or_else(|| {
            GemError::missing(
                &glacier.rgi_id,
                format!("no climate cell at grid index {:?}", key),
            )
        })?;

        let n = dates.len();
        let mut temp = Array1::zeros(n);
        let mut prec = Array1::zeros(n);
        let mut lapse_rate = Array1::zeros(n);

        for (i, step) in dates.steps().iter().enumerate() {
            let month = cell.series.get(&(step.year, step.month)).ok_or_else(|| {
                GemError::missing(
                    &glacier.rgi_id,
                    format!("no climate for {}-{:02}", step.year, step.month),
                )
            })?;
            temp[i] = month.temp;
            prec[i] = month.prec;
            lapse_rate[i] = match lapse {
                LapseRateSource::Gridded => month.lapse_rate.ok_or_else(|| {
                    GemError::missing(
                        &glacier.rgi_id,
                        format!("no lapse rate for {}-{:02}", step.year, step.month),
                    )
                })?,
                LapseRateSource::MonthlyClimatology(values) => values[(step.month - 1) as usize],
            };
        }

        Ok(GlacierClimate {
            temp,
            prec,
            lapse_rate,
            elevation: cell.elevation,
        })
    }
}

/// Monthly climate forcing of a single glacier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlacierClimate {
    /// Air temperature (degC)
    pub temp: Array1<f64>,
    /// Precipitation (m)
    pub prec: Array1<f64>,
    /// Temperature lapse rate (K m^-1)
    pub lapse_rate: Array1<f64>,
    /// Elevation of the climate data (m a.s.l.)
    pub elevation: f64,
}

impl GlacierClimate {
    pub fn len(&self) -> usize {
        self.temp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temp.is_empty()
    }
}

fn tile(series: &Array1<f64>, spinup_months: usize, len: usize) -> Array1<f64> {
    let n = series.len();
    (0..len)
        .map(|i| {
            if i < spinup_months {
                series[i % n]
            } else {
                series[(i - spinup_months) % n]
            }
        })
        .collect()
}

/// Artificial climate made by repeating a reference period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticClimate {
    /// First year of the reference period
    /// unit: yr
    /// default: 2000
    pub start_year: i32,
    /// Last year of the reference period (inclusive)
    /// unit: yr
    /// default: 2015
    pub end_year: i32,
    /// Temperature added to every month
    /// unit: K
    /// default: 0
    pub temp_adjust: f64,
    /// Factor applied to every month of precipitation
    /// unit: dimensionless
    /// default: 1
    pub prec_factor: f64,
}

impl Default for SyntheticClimate {
    fn default() -> Self {
        Self {
            start_year: 2000,
            end_year: 2015,
            temp_adjust: 0.0,
            prec_factor: 1.0,
        }
    }
}

impl SyntheticClimate {
    /// Build the synthetic climate of a glacier for the model dates.
    ///
    /// Spinup months take the first months of the reference period; the remaining
    /// months repeat the reference period from its start and are truncated at the
    /// end of the run.
    pub fn glacier_climate(
        &self,
        grid: &ClimateGrid,
        glacier: &GlacierAttributes,
        dates: &DatesTable,
        lapse: &LapseRateSource,
    ) -> GemResult<GlacierClimate> {
        let reference_dates =
            DatesTable::model_run(self.start_year, self.end_year, 0, dates.year_type())?;
        let reference = grid.glacier_climate(glacier, &reference_dates, lapse)?;

        let spinup = dates.spinup_months();
        let n = dates.len();
        Ok(GlacierClimate {
            temp: tile(&reference.temp, spinup, n) + self.temp_adjust,
            prec: tile(&reference.prec, spinup, n) * self.prec_factor,
            lapse_rate: tile(&reference.lapse_rate, spinup, n),
            elevation: reference.elevation,
        })
    }
}

/// Method used to correct a climate dataset towards the reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BiasMethod {
    #[default]
    None,
    Constant,
    HussHock2015,
    Monthly,
}

/// Bias adjustment of a single glacier's climate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BiasAdjustment {
    #[default]
    None,
    /// Add `temp` to every temperature and multiply every precipitation by `prec`
    Constant { temp: f64, prec: f64 },
    /// Huss and Hock (2015): adjust the monthly mean and scale the variability
    HussHock2015 {
        temp_avg: [f64; 12],
        temp_adj: [f64; 12],
        temp_var: [f64; 12],
        prec_adj: [f64; 12],
        elevation: f64,
    },
    /// Monthly additive temperature and multiplicative precipitation adjustment
    Monthly {
        temp_adj: [f64; 12],
        prec_adj: [f64; 12],
        elevation: f64,
    },
}

impl BiasAdjustment {
    /// Apply the adjustment to a glacier's climate in place.
    pub fn apply(&self, climate: &mut GlacierClimate, dates: &DatesTable) -> GemResult<()> {
        if climate.len() != dates.len() {
            return Err(GemError::DimensionMismatch {
                name: "climate".to_string(),
                expected: dates.len(),
                actual: climate.len(),
            });
        }

        match self {
            BiasAdjustment::None => {}
            BiasAdjustment::Constant { temp, prec } => {
                climate.temp += *temp;
                climate.prec *= *prec;
            }
            BiasAdjustment::HussHock2015 {
                temp_avg,
                temp_adj,
                temp_var,
                prec_adj,
                elevation,
            } => {
                for (i, step) in dates.steps().iter().enumerate() {
                    let m = (step.month - 1) as usize;
                    let mean = temp_avg[m] + temp_adj[m];
                    climate.temp[i] = mean + (climate.temp[i] + temp_adj[m] - mean) * temp_var[m];
                    climate.prec[i] *= prec_adj[m];
                }
                climate.elevation = *elevation;
            }
            BiasAdjustment::Monthly {
                temp_adj,
                prec_adj,
                elevation,
            } => {
                for (i, step) in dates.steps().iter().enumerate() {
                    let m = (step.month - 1) as usize;
                    climate.temp[i] += temp_adj[m];
                    climate.prec[i] *= prec_adj[m];
                }
                climate.elevation = *elevation;
            }
        }
        Ok(())
    }
}

struct ColumnLookup<'a> {
    path: &'a str,
    columns: HashMap<String, usize>,
}

impl ColumnLookup<'_> {
    fn value(&self, record: &csv::StringRecord, name: &str) -> GemResult<f64> {
        let field = self
            .columns
            .get(name)
            .and_then(|i| record.get(*i))
            .ok_or_else(|| GemError::missing(self.path, format!("column '{}'", name)))?;
        field.trim().parse().map_err(|_| {
            GemError::InvalidInput(format!("'{}' in column {} is not a number", field, name))
        })
    }

    fn monthly(&self, record: &csv::StringRecord, prefix: &str) -> GemResult<[f64; 12]> {
        let mut values = [0.0; 12];
        for (m, value) in values.iter_mut().enumerate() {
            *value = self.value(record, &format!("{}_{}", prefix, m + 1))?;
        }
        Ok(values)
    }
}

/// Load per-glacier bias adjustments aligned to `glaciers`.
///
/// The table has an `RGIId` column and, depending on the method:
///
/// * `Constant`: `temp_adj`, `prec_adj`
/// * `HussHock2015`: `ref_zs`, `temp_avg_1..12`, `temp_adj_1..12`, `temp_var_1..12`,
///   `prec_adj_1..12`
/// * `Monthly`: `ref_zs`, `temp_adj_1..12`, `prec_adj_1..12`
///
/// With [`BiasMethod::None`] no file is read.
pub fn load_bias_adjustments<P: AsRef<Path>>(
    path: P,
    method: BiasMethod,
    glaciers: &[GlacierAttributes],
) -> GemResult<Vec<BiasAdjustment>> {
    if method == BiasMethod::None {
        return Ok(vec![BiasAdjustment::None; glaciers.len()]);
    }

    let path = path.as_ref();
    let path_str = path.display().to_string();
    let csv_err = |source| GemError::Csv {
        path: path_str.clone(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let lookup = ColumnLookup {
        path: &path_str,
        columns: reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect(),
    };
    let id_column = *lookup
        .columns
        .get("RGIId")
        .ok_or_else(|| GemError::missing(&path_str, "column 'RGIId'"))?;

    let mut by_id = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let id = record.get(id_column).unwrap_or_default().trim().to_string();
        let adjustment = match method {
            BiasMethod::None => BiasAdjustment::None,
            BiasMethod::Constant => BiasAdjustment::Constant {
                temp: lookup.value(&record, "temp_adj")?,
                prec: lookup.value(&record, "prec_adj")?,
            },
            BiasMethod::HussHock2015 => BiasAdjustment::HussHock2015 {
                temp_avg: lookup.monthly(&record, "temp_avg")?,
                temp_adj: lookup.monthly(&record, "temp_adj")?,
                temp_var: lookup.monthly(&record, "temp_var")?,
                prec_adj: lookup.monthly(&record, "prec_adj")?,
                elevation: lookup.value(&record, "ref_zs")?,
            },
            BiasMethod::Monthly => BiasAdjustment::Monthly {
                temp_adj: lookup.monthly(&record, "temp_adj")?,
                prec_adj: lookup.monthly(&record, "prec_adj")?,
                elevation: lookup.value(&record, "ref_zs")?,
            },
        };
        by_id.insert(id, adjustment);
    }

    glaciers
        .iter()
        .map(|g| {
            by_id
                .remove(&g.rgi_id)
                .ok_or_else(|| {
                    GemError::missing(&g.rgi_id, format!("no bias adjustment in {}", path_str))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::YearType;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn glacier(lat: f64, lon: f64) -> GlacierAttributes {
        GlacierAttributes {
            rgi_id: "RGI60-15.00001".to_string(),
            o1_region: 15,
            o2_region: 1,
            glacier_number: "00001".to_string(),
            cen_lat: lat,
            cen_lon: lon,
            area_km2: 1.0,
            zmin: 5000.0,
            zmed: 5100.0,
            zmax: 5200.0,
            slope: 10.0,
            aspect: 0.0,
            term_type: 0,
            volume_km3: 0.0,
            zmean: 0.0,
        }
    }

    /// Two by two grid with temperature equal to the month and prec scaled by cell
    fn grid(years: std::ops::RangeInclusive<i32>) -> ClimateGrid {
        let mut grid = ClimateGrid::default();
        for (lat, lon, elev) in [
            (28.0, 86.0, 4000.0),
            (28.0, 86.5, 4100.0),
            (28.5, 86.0, 4200.0),
            (28.5, 86.5, 4300.0),
        ] {
            grid.set_elevation(lat, lon, elev);
            for year in years.clone() {
                for month in 1..=12 {
                    let temp = month as f64 + (year % 10) as f64 * 100.0;
                    grid.insert(lat, lon, year, month, temp, elev / 1e4, Some(-0.006))
                        .unwrap();
                }
            }
        }
        grid
    }

    #[test]
    fn nearest_cell_matches_axes_independently() {
        let grid = grid(2000..=2000);
        let cell = grid.nearest_cell(28.4, 86.1).unwrap();
        assert_eq!(grid.cell_coordinates(cell), Some((28.5, 86.0)));

        assert!(ClimateGrid::default().nearest_cell(0.0, 0.0).is_err());
    }

    #[test]
    fn insert_requires_known_cell() {
        let mut grid = grid(2000..=2000);
        assert!(grid.insert(10.0, 10.0, 2000, 1, 0.0, 0.0, None).is_err());
        assert!(grid.insert(28.0, 86.0, 2000, 13, 0.0, 0.0, None).is_err());
    }

    #[test]
    fn glacier_climate_aligns_to_dates() {
        let grid = grid(1999..=2001);
        let dates = DatesTable::model_run(2000, 2001, 0, YearType::Water).unwrap();
        let climate = grid
            .glacier_climate(&glacier(28.1, 86.4), &dates, &LapseRateSource::Gridded)
            .unwrap();

        assert_eq!(climate.len(), 24);
        assert_eq!(climate.elevation, 4100.0);
        // October 1999
        assert_relative_eq!(climate.temp[0], 10.0 + 900.0);
        // January 2000
        assert_relative_eq!(climate.temp[3], 1.0);
        assert_relative_eq!(climate.prec[0], 0.41);
        assert_relative_eq!(climate.lapse_rate[5], -0.006);
    }

    #[test]
    fn glacier_climate_missing_month() {
        let grid = grid(2000..=2000);
        let dates = DatesTable::model_run(2000, 2001, 0, YearType::Calendar).unwrap();
        let err = grid
            .glacier_climate(&glacier(28.0, 86.0), &dates, &LapseRateSource::Gridded)
            .unwrap_err();
        assert!(matches!(err, GemError::MissingData { .. }));
    }

    #[test]
    fn climatology_lapse_rate() {
        let grid = grid(2000..=2000);
        let dates = DatesTable::model_run(2000, 2000, 0, YearType::Calendar).unwrap();
        let mut lapse = [-0.005; 12];
        lapse[6] = -0.008;
        let climate = grid
            .glacier_climate(
                &glacier(28.0, 86.0),
                &dates,
                &LapseRateSource::MonthlyClimatology(lapse),
            )
            .unwrap();
        assert_eq!(climate.lapse_rate[0], -0.005);
        assert_eq!(climate.lapse_rate[6], -0.008);
    }

    #[test]
    fn synthetic_climate_tiles_reference_period() {
        let grid = grid(2000..=2001);
        let dates = DatesTable::model_run(2010, 2012, 1, YearType::Calendar).unwrap();
        let synthetic = SyntheticClimate {
            start_year: 2000,
            end_year: 2001,
            temp_adjust: 1.5,
            prec_factor: 2.0,
        };
        let climate = synthetic
            .glacier_climate(&grid, &glacier(28.0, 86.0), &dates, &LapseRateSource::Gridded)
            .unwrap();

        assert_eq!(climate.len(), 48);
        // Spinup uses the first year of the reference period
        assert_relative_eq!(climate.temp[0], 1.0 + 1.5);
        // First model year restarts the tile
        assert_relative_eq!(climate.temp[12], 1.0 + 1.5);
        assert_relative_eq!(climate.temp[24], 101.0 + 1.5);
        // Third model year repeats the tile again
        assert_relative_eq!(climate.temp[36], 1.0 + 1.5);
        assert_relative_eq!(climate.prec[0], 0.8);
    }

    #[test]
    fn bias_adjustments() {
        let dates = DatesTable::model_run(2000, 2000, 0, YearType::Calendar).unwrap();
        let base = GlacierClimate {
            temp: Array1::from_elem(12, 2.0),
            prec: Array1::from_elem(12, 0.1),
            lapse_rate: Array1::from_elem(12, -0.0065),
            elevation: 4000.0,
        };

        let mut climate = base.clone();
        BiasAdjustment::Constant {
            temp: -1.0,
            prec: 1.5,
        }
        .apply(&mut climate, &dates)
        .unwrap();
        assert_relative_eq!(climate.temp[4], 1.0);
        assert_relative_eq!(climate.prec[4], 0.15);
        assert_eq!(climate.elevation, 4000.0);

        let mut climate = base.clone();
        BiasAdjustment::HussHock2015 {
            temp_avg: [1.0; 12],
            temp_adj: [0.5; 12],
            temp_var: [2.0; 12],
            prec_adj: [0.5; 12],
            elevation: 4500.0,
        }
        .apply(&mut climate, &dates)
        .unwrap();
        // 1.5 + (2.0 + 0.5 - 1.5) * 2.0
        assert_relative_eq!(climate.temp[0], 3.5);
        assert_relative_eq!(climate.prec[0], 0.05);
        assert_eq!(climate.elevation, 4500.0);

        let mut climate = base.clone();
        let mut temp_adj = [0.0; 12];
        temp_adj[1] = 3.0;
        BiasAdjustment::Monthly {
            temp_adj,
            prec_adj: [1.0; 12],
            elevation: 4200.0,
        }
        .apply(&mut climate, &dates)
        .unwrap();
        assert_relative_eq!(climate.temp[0], 2.0);
        assert_relative_eq!(climate.temp[1], 5.0);
        assert_eq!(climate.elevation, 4200.0);
    }

    #[test]
    fn load_constant_bias_table() {
        let path = std::env::temp_dir().join("rgem-bias-constant.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"RGIId,temp_adj,prec_adj\nRGI60-15.00001,-0.5,1.2\n")
            .unwrap();

        let glaciers = vec![glacier(28.0, 86.0)];
        let adjustments = load_bias_adjustments(&path, BiasMethod::Constant, &glaciers).unwrap();
        assert_eq!(
            adjustments,
            vec![BiasAdjustment::Constant {
                temp: -0.5,
                prec: 1.2
            }]
        );

        let none =
            load_bias_adjustments("does-not-exist.csv", BiasMethod::None, &glaciers).unwrap();
        assert_eq!(none, vec![BiasAdjustment::None]);

        let err = load_bias_adjustments(&path, BiasMethod::Monthly, &glaciers).unwrap_err();
        assert!(matches!(err, GemError::MissingData { .. }));
    }

    #[test]
    fn load_grid_from_csv() {
        let dir = std::env::temp_dir();
        let climate_path = dir.join("rgem-climate-grid.csv");
        let elevation_path = dir.join("rgem-climate-elev.csv");
        std::fs::write(
            &climate_path,
            "lat,lon,year,month,temp,prec,lr\n28.0,86.0,2000,1,-5.0,0.02,-0.006\n",
        )
        .unwrap();
        std::fs::write(&elevation_path, "lat,lon,elev\n28.0,86.0,4500\n").unwrap();

        let grid = ClimateGrid::from_csv(&climate_path, &elevation_path).unwrap();
        let dates = DatesTable::model_run(2000, 2000, 0, YearType::Calendar).unwrap();
        // Only January is present
        assert!(grid
            .glacier_climate(&glacier(28.0, 86.0), &dates, &LapseRateSource::Gridded)
            .is_err());
        assert_eq!(grid.nearest_cell(30.0, 90.0).unwrap(), (0, 0));
    }
}
