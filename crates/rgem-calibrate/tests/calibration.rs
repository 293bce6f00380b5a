//! End-to-end calibration of a glacier from an observation file.
//!
//! Observations are loaded from CSV and mapped onto the model run, then the glacier is
//! calibrated with both the ensemble sampler and the optimiser.

use approx::assert_relative_eq;
use ndarray::{array, Array1};
use rgem_calibrate::{
    calibrate_glacier, load_observations, optimise_glacier, GlacierProblem, GlacierRunner,
    McmcSettings, ObservationType, OptimisationSettings,
};
use rgem_core::climate::GlacierClimate;
use rgem_core::dates::{DatesTable, YearType};
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use rgem_core::parameters::{MassBalanceOptions, ModelParameters};
use std::io::Write;
use std::path::PathBuf;

fn glacier(number: &str) -> GlacierAttributes {
    GlacierAttributes {
        rgi_id: format!("RGI60-15.{}", number),
        o1_region: 15,
        o2_region: 3,
        glacier_number: number.to_string(),
        cen_lat: 28.2,
        cen_lon: 86.5,
        area_km2: 2.5,
        zmin: 5100.0,
        zmed: 5400.0,
        zmax: 5700.0,
        slope: 12.0,
        aspect: 200.0,
        term_type: 0,
        volume_km3: 0.0,
        zmean: 0.0,
    }
}

fn geometry() -> GlacierGeometry {
    GlacierGeometry::new(
        array![5000.0, 5100.0, 5300.0, 5500.0, 5700.0],
        array![0.0, 0.6, 0.9, 0.7, 0.3],
        array![0.0, 70.0, 90.0, 60.0, 30.0],
        array![0.0, 0.4, 0.5, 0.4, 0.2],
    )
    .unwrap()
}

/// Sinusoidal temperature with summer precipitation.
fn climate(dates: &DatesTable) -> GlacierClimate {
    let temp = Array1::from_iter(dates.steps().iter().map(|step| {
        let phase = (step.month as f64 - 1.0) / 12.0 * 2.0 * std::f64::consts::PI;
        -3.0 - 8.0 * phase.cos()
    }));
    let prec = Array1::from_iter(
        dates
            .steps()
            .iter()
            .map(|step| if (6..=9).contains(&step.month) { 0.15 } else { 0.03 }),
    );
    GlacierClimate {
        temp,
        prec,
        lapse_rate: Array1::from_elem(dates.len(), -0.0065),
        elevation: 5000.0,
    }
}

fn observation_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("rgem_calibration_{}.csv", name));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "RGIId,mb_mwea,mb_mwea_sigma,t1,t2,obs_type").unwrap();
    // Selected glacier over the post-spinup period
    writeln!(file, "RGI60-15.00412,-0.3,0.08,2000.0,2005.0,geodetic").unwrap();
    // Starts during spinup
    writeln!(file, "RGI60-15.00412,-0.1,0.1,1998.0,2003.0,geodetic").unwrap();
    // Glacier not selected
    writeln!(file, "RGI60-15.09999,-0.5,0.1,2000.0,2005.0,geodetic").unwrap();
    path
}

#[test]
fn calibrate_from_observation_file() {
    let dates = DatesTable::model_run(2000, 2004, 2, YearType::Calendar).unwrap();
    let glaciers = vec![glacier("00412")];
    let geometries = vec![geometry()];
    let climate = climate(&dates);

    let path = observation_file("mcmc");
    let observations = load_observations(&path, &glaciers, &geometries, &dates).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(observations.len(), 1);
    let obs = &observations[0];
    assert_eq!(obs.obs_type, ObservationType::Geodetic);
    assert_eq!((obs.t1_idx, obs.t2_idx), (24, 84));
    assert_eq!((obs.z1_idx, obs.z2_idx), (1, 5));
    assert_relative_eq!(obs.mb_mwe, -1.5, epsilon = 1e-12);

    let runner = GlacierRunner::new(
        ModelParameters::default(),
        glaciers[0].clone(),
        geometries[0].clone(),
        climate,
        dates,
        MassBalanceOptions::default(),
        obs.clone(),
    );
    let settings = McmcSettings {
        iterations: 100,
        burn: 40,
        n_walkers: 16,
        ensemble_size: 20,
        seed: Some(42),
        ..McmcSettings::default()
    };

    let ensemble = calibrate_glacier(runner.clone(), &settings).unwrap();
    assert_eq!(ensemble.glacier_number, "00412");
    assert_eq!(ensemble.len(), 20);
    assert!(ensemble.ensemble_std >= 0.0);
    assert!((ensemble.ensemble_mean - ensemble.observed).abs() < 0.5);

    // Same seed, same ensemble
    let again = calibrate_glacier(runner, &settings).unwrap();
    assert_eq!(ensemble, again);
}

#[test]
fn optimise_from_observation_file() {
    let dates = DatesTable::model_run(2000, 2004, 2, YearType::Calendar).unwrap();
    let glaciers = vec![glacier("00412")];
    let geometries = vec![geometry()];
    let climate = climate(&dates);

    let path = observation_file("optimise");
    let observations = load_observations(&path, &glaciers, &geometries, &dates).unwrap();
    std::fs::remove_file(&path).ok();

    let options = MassBalanceOptions::default();
    let problem = GlacierProblem {
        base: ModelParameters::default(),
        glacier: &glaciers[0],
        geometry: &geometries[0],
        climate: &climate,
        dates: &dates,
        options: &options,
        observations: &observations,
    };
    let settings = OptimisationSettings::default();
    let result = optimise_glacier(&problem, &settings).unwrap();

    assert_eq!(result.rgi_id, "RGI60-15.00412");
    assert!((1..=3).contains(&result.rounds));
    assert_eq!(result.comparisons.len(), 1);

    let row = &result.comparisons[0];
    assert_eq!(row.calround, result.rounds);
    assert_relative_eq!(row.uncertainty, 0.5, epsilon = 1e-12);
    assert_relative_eq!(row.zscore, (row.model - row.obs) / row.uncertainty, epsilon = 1e-12);
    assert_relative_eq!(result.objective, row.zscore.abs(), epsilon = 1e-12);

    // Re-running the optimum reproduces the comparison
    let rerun = problem.compare(&result.parameters, &settings).unwrap();
    assert_relative_eq!(rerun[0].model, row.model, epsilon = 1e-12);
}
