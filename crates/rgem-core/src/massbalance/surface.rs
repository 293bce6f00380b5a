//! Surface type classification.
//!
//! The initial surface type follows the glacier hypsometry: bins above the reference
//! elevation are firn (or snow), bins at or below it are ice. Afterwards the surface type of each
//! bin is reclassified at the end of every year from the running mean of its annual
//! climatic mass balance (Huss and Hock, 2015).

use crate::geometry::GlacierGeometry;
use crate::parameters::{FirnDdf, MassBalanceOptions};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SurfaceType {
    /// Bin without glacier
    #[default]
    None = 0,
    Ice = 1,
    Snow = 2,
    Firn = 3,
    Debris = 4,
}

impl SurfaceType {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Degree-day factor used to melt this surface.
    pub fn degree_day_factor(self, ddfsnow: f64, ddfice: f64, firn: FirnDdf) -> f64 {
        match self {
            SurfaceType::None => 0.0,
            SurfaceType::Ice | SurfaceType::Debris => ddfice,
            SurfaceType::Snow => ddfsnow,
            SurfaceType::Firn => match firn {
                FirnDdf::MeanSnowIce => (ddfsnow + ddfice) / 2.0,
                FirnDdf::Snow => ddfsnow,
            },
        }
    }
}

fn accumulation_surface(options: &MassBalanceOptions) -> SurfaceType {
    if options.firn_above_median {
        SurfaceType::Firn
    } else {
        SurfaceType::Snow
    }
}

/// Initial surface type of each bin.
///
/// A bin centred exactly on the reference elevation starts as ice.
///
/// # Arguments
///
/// * `geometry` - Initial glacier geometry
/// * `reference_elevation` - Median or mean glacier elevation (m a.s.l.)
/// * `options` - Selects firn or snow for the upper glacier
pub fn initial_surface_type(
    geometry: &GlacierGeometry,
    reference_elevation: f64,
    options: &MassBalanceOptions,
) -> Vec<SurfaceType> {
    let upper = accumulation_surface(options);
    geometry
        .area_km2
        .iter()
        .zip(geometry.elevation_bins.iter())
        .map(|(area, z)| {
            if *area <= 0.0 {
                SurfaceType::None
            } else if *z > reference_elevation {
                upper
            } else {
                SurfaceType::Ice
            }
        })
        .collect()
}

/// Reclassify the surface type after year `year`.
///
/// The running mean covers the last `options.surface_type_window` years of
/// `massbalclim_annual` (fewer at the start of the run). Debris is never reclassified and
/// bins that no longer hold glacier become [`SurfaceType::None`].
pub fn update_surface_type(
    surface_type: &mut [SurfaceType],
    massbalclim_annual: &Array2<f64>,
    year: usize,
    area: &[f64],
    options: &MassBalanceOptions,
) {
    let window = options.surface_type_window.max(1);
    let first = (year + 1).saturating_sub(window);
    let upper = accumulation_surface(options);

    for (i, surface) in surface_type.iter_mut().enumerate() {
        if area[i] <= 0.0 {
            *surface = SurfaceType::None;
            continue;
        }
        if *surface == SurfaceType::Debris {
            continue;
        }
        let running_mean = massbalclim_annual
            .slice(s![i, first..=year])
            .mean()
            .unwrap_or(0.0);
        *surface = if running_mean > 0.0 {
            upper
        } else {
            SurfaceType::Ice
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn geometry() -> GlacierGeometry {
        GlacierGeometry::new(
            array![100.0, 200.0, 300.0, 400.0],
            array![0.0, 1.0, 1.0, 1.0],
            array![0.0, 50.0, 50.0, 50.0],
            array![0.0, 1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn initial_classification() {
        let options = MassBalanceOptions::default();
        let surface = initial_surface_type(&geometry(), 300.0, &options);
        assert_eq!(
            surface,
            vec![
                SurfaceType::None,
                SurfaceType::Ice,
                SurfaceType::Ice,
                SurfaceType::Firn
            ]
        );
        let lowered = initial_surface_type(&geometry(), 299.0, &options);
        assert_eq!(lowered[2], SurfaceType::Firn);

        let options = MassBalanceOptions {
            firn_above_median: false,
            ..Default::default()
        };
        let surface = initial_surface_type(&geometry(), 300.0, &options);
        assert_eq!(surface[3], SurfaceType::Snow);
    }

    #[test]
    fn degree_day_factors() {
        assert_eq!(SurfaceType::Firn.degree_day_factor(2.0, 4.0, FirnDdf::MeanSnowIce), 3.0);
        assert_eq!(SurfaceType::Firn.degree_day_factor(2.0, 4.0, FirnDdf::Snow), 2.0);
        assert_eq!(SurfaceType::Debris.degree_day_factor(2.0, 4.0, FirnDdf::Snow), 4.0);
        assert_eq!(SurfaceType::None.degree_day_factor(2.0, 4.0, FirnDdf::Snow), 0.0);
        assert_eq!(SurfaceType::Firn.code(), 3);
    }

    #[test]
    fn running_mean_reclassification() {
        let options = MassBalanceOptions {
            surface_type_window: 2,
            ..Default::default()
        };
        // Bin 1 positive then negative, bin 2 strongly positive then slightly negative
        let mb = array![
            [0.0, 0.0, 0.0],
            [0.5, -1.0, 0.0],
            [2.0, -0.5, 0.0],
            [-1.0, -1.0, 0.0]
        ];
        let area = [0.0, 1.0, 1.0, 1.0];
        let mut surface = vec![
            SurfaceType::None,
            SurfaceType::Ice,
            SurfaceType::Ice,
            SurfaceType::Debris,
        ];

        update_surface_type(&mut surface, &mb, 0, &area, &options);
        assert_eq!(surface[1], SurfaceType::Firn);
        assert_eq!(surface[2], SurfaceType::Firn);

        update_surface_type(&mut surface, &mb, 1, &area, &options);
        // Mean of 0.5 and -1.0
        assert_eq!(surface[1], SurfaceType::Ice);
        // Mean of 2.0 and -0.5
        assert_eq!(surface[2], SurfaceType::Firn);
        assert_eq!(surface[3], SurfaceType::Debris);
        assert_eq!(surface[0], SurfaceType::None);
    }

    #[test]
    fn five_year_running_mean() {
        let options = MassBalanceOptions::default();
        assert_eq!(options.surface_type_window, 5);
        let mb = array![
            [1.0, 1.0, 1.0, -0.5, -0.5, -3.0, 2.0],
            [-1.0, -1.0, -1.0, -1.0, 3.5, 1.0, 1.0],
            [-1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0]
        ];
        let area = [1.0, 1.0, 1.0];
        let mut surface = vec![SurfaceType::Firn, SurfaceType::Ice, SurfaceType::Debris];

        let mut history = Vec::new();
        for year in 0..7 {
            update_surface_type(&mut surface, &mb, year, &area, &options);
            history.push(surface.clone());
        }

        use SurfaceType::{Debris, Firn, Ice};
        // Bin 0 stays firn while the mean of the last five years is positive
        let bin0: Vec<SurfaceType> = history.iter().map(|s| s[0]).collect();
        assert_eq!(bin0, vec![Firn, Firn, Firn, Firn, Firn, Ice, Ice]);
        // Bin 1 turns to firn once the five-year mean rises above zero
        let bin1: Vec<SurfaceType> = history.iter().map(|s| s[1]).collect();
        assert_eq!(bin1, vec![Ice, Ice, Ice, Ice, Ice, Firn, Firn]);
        assert!(history.iter().all(|s| s[2] == Debris));
    }

    #[test]
    fn lost_bins_have_no_surface() {
        let options = MassBalanceOptions::default();
        let mb = array![[1.0], [1.0]];
        let mut surface = vec![SurfaceType::Firn, SurfaceType::Debris];
        update_surface_type(&mut surface, &mb, 0, &[0.0, 0.0], &options);
        assert_eq!(surface, vec![SurfaceType::None, SurfaceType::None]);
    }
}
