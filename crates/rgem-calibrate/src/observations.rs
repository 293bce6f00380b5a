//! Observed glacier mass balance used for calibration.

use crate::{Error, Result};
use rgem_core::dates::DatesTable;
use rgem_core::geometry::{glacier_bin_range, GlacierGeometry};
use rgem_core::glacier::GlacierAttributes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Tolerance when comparing observation periods to the model period (years).
const PERIOD_TOLERANCE: f64 = 1e-6;

/// How a mass balance was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    /// Elevation change over a multi-year period
    #[default]
    Geodetic,
    /// Stake and pit measurements
    Glaciological,
}

/// A glacier-wide mass balance observation over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceObservation {
    pub rgi_id: String,
    pub glacier_number: String,
    pub obs_type: ObservationType,
    /// Total mass balance over the period (m w.e.)
    pub mb_mwe: f64,
    /// Uncertainty of the total mass balance (m w.e.)
    pub mb_mwe_err: f64,
    /// Start of the period (fractional year)
    pub t1: f64,
    /// End of the period (fractional year)
    pub t2: f64,
    /// First model month of the period
    pub t1_idx: usize,
    /// Model month after the period
    pub t2_idx: usize,
    /// First elevation bin of the glacier
    pub z1_idx: usize,
    /// Elevation bin after the glacier
    pub z2_idx: usize,
}

impl MassBalanceObservation {
    /// Length of the period in years.
    pub fn years(&self) -> f64 {
        self.t2 - self.t1
    }

    /// Observed mass balance rate (m w.e. a^-1).
    pub fn observed_rate(&self) -> f64 {
        self.mb_mwe / self.years()
    }

    /// Uncertainty of the observed rate (m w.e. a^-1).
    pub fn observed_rate_error(&self) -> f64 {
        self.mb_mwe_err / self.years()
    }
}

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    #[serde(rename = "RGIId")]
    rgi_id: String,
    mb_mwea: f64,
    mb_mwea_sigma: f64,
    t1: f64,
    t2: f64,
    #[serde(default)]
    obs_type: Option<ObservationType>,
}

/// Load mass balance observations for the selected glaciers.
///
/// Rates are converted to totals over the period, periods are mapped to model months and
/// the glacier's elevation bins are attached. Observations of unselected glaciers, outside
/// the model period (after spinup) or of glaciers without ice are dropped.
///
/// # Arguments
///
/// * `path` - CSV with columns `RGIId, mb_mwea, mb_mwea_sigma, t1, t2` and optionally
///   `obs_type`
/// * `glaciers` - Selected glaciers
/// * `geometries` - Geometry of each glacier in `glaciers`
/// * `dates` - Model time axis
///
/// # Returns
///
/// Observations sorted by glacier number, then by start month.
pub fn load_observations<P: AsRef<Path>>(
    path: P,
    glaciers: &[GlacierAttributes],
    geometries: &[GlacierGeometry],
    dates: &DatesTable,
) -> Result<Vec<MassBalanceObservation>> {
    let path = path.as_ref();
    if glaciers.len() != geometries.len() {
        return Err(Error::InvalidParameter(format!(
            "{} glaciers but {} geometries",
            glaciers.len(),
            geometries.len()
        )));
    }

    let csv_error = |source| Error::Csv {
        path: path.display().to_string(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;

    let model_start = dates.decimal_year(dates.spinup_months());
    let model_end = dates.decimal_year(dates.len());

    let mut observations = Vec::new();
    for record in reader.deserialize() {
        let record: ObservationRecord = record.map_err(csv_error)?;

        let Some(index) = glaciers.iter().position(|g| g.rgi_id == record.rgi_id) else {
            debug!("Skipping observation of unselected glacier {}", record.rgi_id);
            continue;
        };
        let glacier = &glaciers[index];

        if record.t1 < model_start - PERIOD_TOLERANCE
            || record.t2 > model_end + PERIOD_TOLERANCE
            || record.t2 <= record.t1
        {
            debug!(
                "Skipping observation of {} over {}-{}: outside model period {}-{}",
                record.rgi_id, record.t1, record.t2, model_start, model_end
            );
            continue;
        }

        let Some((z1_idx, z2_idx)) = glacier_bin_range(&geometries[index]) else {
            debug!("Skipping observation of {}: glacier has no ice", record.rgi_id);
            continue;
        };

        let t1_idx = dates.month_index(record.t1);
        let t2_idx = dates.month_index(record.t2);
        if t1_idx >= t2_idx {
            debug!(
                "Skipping observation of {} over {}-{}: shorter than a month",
                record.rgi_id, record.t1, record.t2
            );
            continue;
        }

        let years = record.t2 - record.t1;
        observations.push(MassBalanceObservation {
            rgi_id: record.rgi_id,
            glacier_number: glacier.glacier_number.clone(),
            obs_type: record.obs_type.unwrap_or_default(),
            mb_mwe: record.mb_mwea * years,
            mb_mwe_err: record.mb_mwea_sigma * years,
            t1: record.t1,
            t2: record.t2,
            t1_idx,
            t2_idx,
            z1_idx,
            z2_idx,
        });
    }

    observations.sort_by(|a, b| {
        a.glacier_number
            .cmp(&b.glacier_number)
            .then(a.t1_idx.cmp(&b.t1_idx))
    });
    info!(
        "Loaded {} mass balance observations from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}
