//! Glacier hypsometry on elevation bins.
//!
//! Area, ice thickness and width of each glacier are provided as tables with one row per
//! glacier and one column per elevation bin (Huss and Farinotti, 2012 layout). All three
//! tables share the same bin axis. Thickness comes from an external inversion that assumes
//! the glacier is in steady state with its climate.

use crate::errors::{GemError, GemResult};
use crate::glacier::GlacierAttributes;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Sentinel used for missing values in the bin tables
const NO_DATA: f64 = -99.0;

/// Per-glacier values on a common elevation-bin axis.
#[derive(Debug, Clone, PartialEq)]
pub struct HussTable {
    /// Bin centre elevations (m a.s.l.), ascending
    pub elevation_bins: Array1<f64>,
    /// One row per glacier, in the order the glaciers were requested
    pub rows: Vec<Array1<f64>>,
}

fn parse_value(field: &str) -> f64 {
    match field.trim().parse::<f64>() {
        Ok(v) if v == NO_DATA || !v.is_finite() => 0.0,
        Ok(v) => v,
        Err(_) => 0.0,
    }
}

/// Import a bin table and align its rows to `glaciers`.
///
/// The first column holds the RGI id and every other column header is a bin centre
/// elevation. `-99`, empty and unparsable values are read as zero.
pub fn import_huss_table<P: AsRef<Path>>(
    path: P,
    glaciers: &[GlacierAttributes],
) -> GemResult<HussTable> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let csv_err = |source| GemError::Csv {
        path: path_str.clone(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let elevation_bins = headers
        .iter()
        .skip(1)
        .map(|h| {
            h.trim().parse::<f64>().map_err(|_| {
                GemError::InvalidInput(format!(
                    "bin header '{}' in {} is not an elevation",
                    h, path_str
                ))
            })
        })
        .collect::<GemResult<Vec<f64>>>()?;
    if elevation_bins.windows(2).any(|w| w[1] <= w[0]) {
        return Err(GemError::InvalidInput(format!(
            "elevation bins in {} are not ascending",
            path_str
        )));
    }

    let mut by_id: HashMap<String, Array1<f64>> = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let Some(id) = record.get(0) else { continue };
        let values: Array1<f64> = (0..elevation_bins.len())
            .map(|i| record.get(i + 1).map(parse_value).unwrap_or(0.0))
            .collect();
        by_id.insert(id.trim().to_string(), values);
    }

    let rows = glaciers
        .iter()
        .map(|g| {
            by_id
                .remove(&g.rgi_id)
                .ok_or_else(|| GemError::missing(&g.rgi_id, format!("no row in {}", path_str)))
        })
        .collect::<GemResult<Vec<_>>>()?;

    Ok(HussTable {
        elevation_bins: Array1::from(elevation_bins),
        rows,
    })
}

/// Hypsometry of a single glacier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlacierGeometry {
    /// Bin centre elevations (m a.s.l.)
    pub elevation_bins: Array1<f64>,
    /// Glacier area per bin (km^2)
    pub area_km2: Array1<f64>,
    /// Ice thickness per bin (m)
    pub thickness_m: Array1<f64>,
    /// Glacier width per bin (km)
    pub width_km: Array1<f64>,
}

impl GlacierGeometry {
    /// Build a geometry. Bins without ice or without area are emptied.
    pub fn new(
        elevation_bins: Array1<f64>,
        mut area_km2: Array1<f64>,
        mut thickness_m: Array1<f64>,
        mut width_km: Array1<f64>,
    ) -> GemResult<Self> {
        let n = elevation_bins.len();
        for (name, values) in [
            ("area", &area_km2),
            ("thickness", &thickness_m),
            ("width", &width_km),
        ] {
            if values.len() != n {
                return Err(GemError::DimensionMismatch {
                    name: name.to_string(),
                    expected: n,
                    actual: values.len(),
                });
            }
        }

        for i in 0..n {
            if thickness_m[i] <= 0.0 || area_km2[i] <= 0.0 {
                area_km2[i] = 0.0;
                thickness_m[i] = 0.0;
                width_km[i] = 0.0;
            }
        }

        Ok(Self {
            elevation_bins,
            area_km2,
            thickness_m,
            width_km,
        })
    }

    /// Build the geometry of each glacier from the area, thickness and width tables.
    pub fn from_tables(
        area: &HussTable,
        thickness: &HussTable,
        width: &HussTable,
    ) -> GemResult<Vec<Self>> {
        for (name, table) in [("thickness", thickness), ("width", width)] {
            if table.elevation_bins != area.elevation_bins {
                return Err(GemError::InvalidInput(format!(
                    "{} bins do not match the area bins",
                    name
                )));
            }
            if table.rows.len() != area.rows.len() {
                return Err(GemError::DimensionMismatch {
                    name: name.to_string(),
                    expected: area.rows.len(),
                    actual: table.rows.len(),
                });
            }
        }

        area.rows
            .iter()
            .zip(&thickness.rows)
            .zip(&width.rows)
            .map(|((a, h), w)| {
                Self::new(area.elevation_bins.clone(), a.clone(), h.clone(), w.clone())
            })
            .collect()
    }

    pub fn n_bins(&self) -> usize {
        self.elevation_bins.len()
    }

    pub fn total_area(&self) -> f64 {
        self.area_km2.sum()
    }

    /// Indices of bins that hold glacier ice.
    pub fn glacier_bins(&self) -> Vec<usize> {
        self.area_km2
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Volume (km^3) and area-weighted mean elevation (m a.s.l.) of a glacier.
///
/// A glacier without area has zero volume and a NaN mean elevation.
pub fn hypsometry_stats(geometry: &GlacierGeometry) -> (f64, f64) {
    let volume = (&geometry.area_km2 * &geometry.thickness_m).sum() / 1000.0;
    let area = geometry.total_area();
    let zmean = if area > 0.0 {
        (&geometry.area_km2 * &geometry.elevation_bins).sum() / area
    } else {
        f64::NAN
    };
    (volume, zmean)
}

/// Index range `[first, last)` of bins that hold glacier area.
pub fn glacier_bin_range(geometry: &GlacierGeometry) -> Option<(usize, usize)> {
    let bins = geometry.glacier_bins();
    match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => Some((*first, last + 1)),
        _ => None,
    }
}
