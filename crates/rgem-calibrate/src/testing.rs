//! Shared fixtures for unit tests.

use crate::model_runner::GlacierRunner;
use crate::observations::{MassBalanceObservation, ObservationType};
use ndarray::{array, Array1};
use rgem_core::climate::GlacierClimate;
use rgem_core::dates::{DatesTable, YearType};
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use rgem_core::parameters::{MassBalanceOptions, ModelParameters};

pub(crate) fn glacier() -> GlacierAttributes {
    GlacierAttributes {
        rgi_id: "RGI60-15.00001".to_string(),
        o1_region: 15,
        o2_region: 1,
        glacier_number: "00001".to_string(),
        cen_lat: 28.0,
        cen_lon: 86.0,
        area_km2: 2.0,
        zmin: 5000.0,
        zmed: 5200.0,
        zmax: 5400.0,
        slope: 10.0,
        aspect: 90.0,
        term_type: 0,
        volume_km3: 0.0,
        zmean: 0.0,
    }
}

pub(crate) fn geometry() -> GlacierGeometry {
    GlacierGeometry::new(
        array![5000.0, 5200.0, 5400.0],
        array![0.8, 0.7, 0.5],
        array![60.0, 50.0, 30.0],
        array![0.4, 0.35, 0.25],
    )
    .unwrap()
}

pub(crate) fn dates() -> DatesTable {
    DatesTable::model_run(2000, 2003, 0, YearType::Calendar).unwrap()
}

/// Warm summers and cold winters with constant precipitation.
pub(crate) fn climate(dates: &DatesTable) -> GlacierClimate {
    let n = dates.len();
    GlacierClimate {
        temp: Array1::from_iter(dates.steps().iter().map(|s| {
            if (5..=9).contains(&s.month) {
                3.0
            } else {
                -8.0
            }
        })),
        prec: Array1::from_elem(n, 0.08),
        lapse_rate: Array1::from_elem(n, -0.0065),
        elevation: 5000.0,
    }
}

/// Geodetic observation of -0.25 m w.e. a^-1 over the whole run.
pub(crate) fn observation() -> MassBalanceObservation {
    MassBalanceObservation {
        rgi_id: "RGI60-15.00001".to_string(),
        glacier_number: "00001".to_string(),
        obs_type: ObservationType::Geodetic,
        mb_mwe: -1.0,
        mb_mwe_err: 0.4,
        t1: 2000.0,
        t2: 2004.0,
        t1_idx: 0,
        t2_idx: 48,
        z1_idx: 0,
        z2_idx: 3,
    }
}

pub(crate) fn glacier_runner() -> GlacierRunner {
    let dates = dates();
    GlacierRunner::new(
        ModelParameters::default(),
        glacier(),
        geometry(),
        climate(&dates),
        dates,
        MassBalanceOptions::default(),
        observation(),
    )
}
