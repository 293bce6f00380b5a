//! Model parameters and physics options of the mass balance model.

use crate::errors::{GemError, GemResult};
use serde::{Deserialize, Serialize};

/// Parameters of the glacier mass balance model.
///
/// The ordering of [`ModelParameters::NAMES`] is used whenever parameters are stored as a
/// flat vector, e.g. in a calibrated ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// Lapse rate from the climate data to the glacier reference elevation
    /// unit: K m^-1
    /// default: -0.0065
    pub lrgcm: f64,
    /// Lapse rate on the glacier
    /// unit: K m^-1
    /// default: -0.0065
    pub lrglac: f64,
    /// Precipitation factor applied to the climate data
    /// unit: dimensionless
    /// default: 1.0
    pub precfactor: f64,
    /// Precipitation gradient with elevation
    /// unit: m^-1
    /// default: 0.0001
    pub precgrad: f64,
    /// Degree-day factor of snow
    /// unit: m w.e. d^-1 degC^-1
    /// default: 0.0041
    pub ddfsnow: f64,
    /// Degree-day factor of ice
    /// unit: m w.e. d^-1 degC^-1
    /// default: 0.0041 / 0.7
    pub ddfice: f64,
    /// Temperature threshold between snow and rain
    /// unit: degC
    /// default: 1.0
    pub tempsnow: f64,
    /// Temperature bias added to the climate data
    /// unit: K
    /// default: 0.0
    pub tempchange: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            lrgcm: -0.0065,
            lrglac: -0.0065,
            precfactor: 1.0,
            precgrad: 0.0001,
            ddfsnow: 0.0041,
            ddfice: 0.0041 / 0.7,
            tempsnow: 1.0,
            tempchange: 0.0,
        }
    }
}

impl ModelParameters {
    pub const NAMES: [&'static str; 8] = [
        "lrgcm",
        "lrglac",
        "precfactor",
        "precgrad",
        "ddfsnow",
        "ddfice",
        "tempsnow",
        "tempchange",
    ];

    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.lrgcm,
            self.lrglac,
            self.precfactor,
            self.precgrad,
            self.ddfsnow,
            self.ddfice,
            self.tempsnow,
            self.tempchange,
        ]
    }

    /// Build parameters from values in [`ModelParameters::NAMES`] order.
    pub fn from_slice(values: &[f64]) -> GemResult<Self> {
        match values {
            [lrgcm, lrglac, precfactor, precgrad, ddfsnow, ddfice, tempsnow, tempchange] => {
                Ok(Self {
                    lrgcm: *lrgcm,
                    lrglac: *lrglac,
                    precfactor: *precfactor,
                    precgrad: *precgrad,
                    ddfsnow: *ddfsnow,
                    ddfice: *ddfice,
                    tempsnow: *tempsnow,
                    tempchange: *tempchange,
                })
            }
            _ => Err(GemError::InvalidInput(format!(
                "expected {} parameter values, got {}",
                Self::NAMES.len(),
                values.len()
            ))),
        }
    }

    /// Value of a parameter by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.to_vec()[i])
    }

    /// Set a parameter by name.
    pub fn set(&mut self, name: &str, value: f64) -> GemResult<()> {
        let slot = match name {
            "lrgcm" => &mut self.lrgcm,
            "lrglac" => &mut self.lrglac,
            "precfactor" => &mut self.precfactor,
            "precgrad" => &mut self.precgrad,
            "ddfsnow" => &mut self.ddfsnow,
            "ddfice" => &mut self.ddfice,
            "tempsnow" => &mut self.tempsnow,
            "tempchange" => &mut self.tempchange,
            _ => {
                return Err(GemError::InvalidInput(format!(
                    "unknown parameter '{}'",
                    name
                )))
            }
        };
        *slot = value;
        Ok(())
    }
}

/// Initial classification of the glacier surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSurfaceType {
    /// Firn (or snow) above the median elevation, ice below
    MedianElevation,
    /// Firn (or snow) above the area-weighted mean elevation, ice below
    MeanElevation,
}

/// Degree-day factor used for firn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirnDdf {
    /// Mean of the snow and ice degree-day factors
    MeanSnowIce,
    Snow,
}

/// Partitioning of precipitation into snow and rain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationScheme {
    /// All snow below `tempsnow`
    Threshold,
    /// Linear transition from snow to rain within 1 degC of `tempsnow`
    LinearTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreezeScheme {
    None,
    /// Annual refreeze potential from the mean annual temperature (Woodward et al., 1997)
    Woodward,
}

/// Elevation used as the glacier reference elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationReference {
    Median,
    Min,
    Max,
}

/// Physics switches of the mass balance model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassBalanceOptions {
    /// Rule for the initial surface type
    /// default: median_elevation
    pub surface_type_initial: InitialSurfaceType,
    /// Whether bins with a positive mass balance are firn (true) or snow (false)
    /// default: true
    pub firn_above_median: bool,
    /// Degree-day factor of firn
    /// default: mean_snow_ice
    pub ddf_firn: FirnDdf,
    /// default: linear_transition
    pub accumulation: AccumulationScheme,
    /// default: woodward
    pub refreezing: RefreezeScheme,
    /// Whether precipitation decays exponentially in the upper quarter of the glacier
    /// default: true
    pub precipitation_limit: bool,
    /// default: median
    pub elevation_reference: ElevationReference,
    /// Number of years in the running mean used to reclassify the surface type
    /// unit: yr
    /// default: 5
    pub surface_type_window: usize,
    /// unit: kg m^-3
    /// default: 900
    pub density_ice: f64,
    /// unit: kg m^-3
    /// default: 1000
    pub density_water: f64,
    /// Ratio of the snow to ice degree-day factor
    /// unit: dimensionless
    /// default: 0.7
    pub ddfsnow_ice_ratio: f64,
    /// Use the lapse rate of the climate data for both lapse rates instead of
    /// `lrgcm` and `lrglac`
    /// default: true
    pub lapse_rate_from_climate: bool,
}

impl Default for MassBalanceOptions {
    fn default() -> Self {
        Self {
            surface_type_initial: InitialSurfaceType::MedianElevation,
            firn_above_median: true,
            ddf_firn: FirnDdf::MeanSnowIce,
            accumulation: AccumulationScheme::LinearTransition,
            refreezing: RefreezeScheme::Woodward,
            precipitation_limit: true,
            elevation_reference: ElevationReference::Median,
            surface_type_window: 5,
            density_ice: 900.0,
            density_water: 1000.0,
            ddfsnow_ice_ratio: 0.7,
            lapse_rate_from_climate: true,
        }
    }
}
