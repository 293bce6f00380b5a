//! Monthly glacier mass balance model.
//!
//! The mass balance of every elevation bin is computed on a monthly timestep from the
//! glacier's climate forcing:
//!
//! 1. Temperature is lapsed from the climate data to the glacier reference elevation and
//!    from there to each bin, then shifted by `tempchange`.
//! 2. Precipitation is scaled by `precfactor`, increases with elevation through
//!    `precgrad`, and optionally decays exponentially over the upper quarter of the glacier.
//! 3. Precipitation is split into snow and rain around `tempsnow`.
//! 4. Positive degree days melt the snowpack first (`ddfsnow`) and then the underlying
//!    surface with the degree-day factor of its surface type.
//! 5. Meltwater and rain refreeze up to an annual potential derived from the mean annual
//!    temperature (Woodward et al., 1997).
//!
//! At the end of each year the surface type is reclassified and, in
//! [`MassBalanceMode::Dynamic`], the annual volume change is redistributed over the
//! glacier (see [`mass_redistribution`]).
//!
//! The initial thickness comes from an inversion that assumes steady state, so a dynamic
//! run undergoes an adjustment in its first years.

mod output;
mod redistribution;
mod surface;

pub use output::MassBalanceOutput;
pub use redistribution::{mass_redistribution, HussCurve};
pub use surface::{initial_surface_type, update_surface_type, SurfaceType};

use crate::climate::GlacierClimate;
use crate::dates::DatesTable;
use crate::errors::{GemError, GemResult};
use crate::geometry::{hypsometry_stats, GlacierGeometry};
use crate::glacier::GlacierAttributes;
use crate::parameters::{
    AccumulationScheme, ElevationReference, InitialSurfaceType, MassBalanceOptions,
    ModelParameters, RefreezeScheme,
};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether the glacier geometry evolves during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassBalanceMode {
    /// Area, thickness and width stay at their initial values
    AreaConstant,
    /// Annual volume change is redistributed over the glacier
    Dynamic,
}

/// Reference elevation of the glacier used for lapse rates and precipitation gradients.
fn reference_elevation(glacier: &GlacierAttributes, options: &MassBalanceOptions) -> f64 {
    match options.elevation_reference {
        ElevationReference::Median => glacier.zmed,
        ElevationReference::Min => glacier.zmin,
        ElevationReference::Max => glacier.zmax,
    }
}

/// Fraction of precipitation falling as snow.
fn snow_fraction(temp: f64, tempsnow: f64, scheme: AccumulationScheme) -> f64 {
    match scheme {
        AccumulationScheme::Threshold => {
            if temp < tempsnow {
                1.0
            } else {
                0.0
            }
        }
        AccumulationScheme::LinearTransition => {
            if temp <= tempsnow - 1.0 {
                1.0
            } else if temp >= tempsnow + 1.0 {
                0.0
            } else {
                0.5 - (temp - tempsnow) / 2.0
            }
        }
    }
}

/// Annual refreeze potential (m w.e.) for a mean annual temperature (degC).
fn woodward_refreeze_potential(mean_annual_temp: f64) -> f64 {
    (-0.0069 * mean_annual_temp + 0.000096).max(0.0)
}

/// Equilibrium line altitude from the annual mass balance of the glacier bins.
///
/// Scans upward for the first bin pair where the mass balance changes from non-positive
/// to positive and interpolates linearly between the bin centres.
pub fn equilibrium_line_altitude(elevation: &[f64], massbal: &[f64]) -> f64 {
    let (Some(first), Some(last)) = (massbal.first(), massbal.last()) else {
        return f64::NAN;
    };
    if *first > 0.0 {
        return elevation[0];
    }
    for i in 0..massbal.len() - 1 {
        let (b0, b1) = (massbal[i], massbal[i + 1]);
        if b0 <= 0.0 && b1 > 0.0 {
            return elevation[i] + (0.0 - b0) * (elevation[i + 1] - elevation[i]) / (b1 - b0);
        }
    }
    if *last <= 0.0 {
        elevation[elevation.len() - 1]
    } else {
        elevation[0]
    }
}

/// Precipitation (m) of each bin before splitting into snow and rain.
fn bin_precipitation(
    prec_gcm: f64,
    params: &ModelParameters,
    elevation: &Array1<f64>,
    glacier_bins: &[usize],
    z_ref: f64,
    limit: bool,
    out: &mut [f64],
) {
    for &i in glacier_bins {
        out[i] = (prec_gcm * params.precfactor * (1.0 + params.precgrad * (elevation[i] - z_ref)))
            .max(0.0);
    }

    if !limit {
        return;
    }
    let (Some(&low), Some(&high)) = (glacier_bins.first(), glacier_bins.last()) else {
        return;
    };
    let zmin = elevation[low];
    let zmax = elevation[high];
    let z75 = zmin + 0.75 * (zmax - zmin);
    let Some(&i75) = glacier_bins.iter().find(|&&i| elevation[i] >= z75) else {
        return;
    };
    let z75 = elevation[i75];
    if zmax <= z75 {
        return;
    }
    let p75 = out[i75];
    for &i in glacier_bins.iter().filter(|&&i| elevation[i] > z75) {
        out[i] = p75 * (-(elevation[i] - z75) / (zmax - z75)).exp();
    }
}

fn check_inputs(
    geometry: &GlacierGeometry,
    climate: &GlacierClimate,
    dates: &DatesTable,
) -> GemResult<()> {
    if dates.is_empty() || dates.len() % 12 != 0 {
        return Err(GemError::DimensionMismatch {
            name: "dates".to_string(),
            expected: dates.n_years() * 12,
            actual: dates.len(),
        });
    }
    for (name, len) in [
        ("temperature", climate.temp.len()),
        ("precipitation", climate.prec.len()),
        ("lapse rate", climate.lapse_rate.len()),
    ] {
        if len != dates.len() {
            return Err(GemError::DimensionMismatch {
                name: name.to_string(),
                expected: dates.len(),
                actual: len,
            });
        }
    }
    let n = geometry.n_bins();
    for (name, len) in [
        ("area", geometry.area_km2.len()),
        ("thickness", geometry.thickness_m.len()),
        ("width", geometry.width_km.len()),
    ] {
        if len != n {
            return Err(GemError::DimensionMismatch {
                name: name.to_string(),
                expected: n,
                actual: len,
            });
        }
    }
    Ok(())
}

/// Run the mass balance model for a single glacier.
///
/// # Arguments
///
/// * `params` - Model parameters
/// * `glacier` - Inventory attributes (reference elevations and terminus type)
/// * `geometry` - Initial glacier geometry
/// * `climate` - Climate forcing aligned to `dates`
/// * `dates` - Monthly time axis, a whole number of years
/// * `options` - Physics switches
/// * `mode` - Whether the geometry evolves
pub fn run_mass_balance(
    params: &ModelParameters,
    glacier: &GlacierAttributes,
    geometry: &GlacierGeometry,
    climate: &GlacierClimate,
    dates: &DatesTable,
    options: &MassBalanceOptions,
    mode: MassBalanceMode,
) -> GemResult<MassBalanceOutput> {
    check_inputs(geometry, climate, dates)?;

    if glacier.is_water_terminating() {
        debug!(
            "{} is water-terminating (term_type {}); frontal ablation is not modelled",
            glacier.rgi_id, glacier.term_type
        );
    }

    let n_bins = geometry.n_bins();
    let n_years = dates.n_years();
    let mut output = MassBalanceOutput::zeros(n_bins, dates.len());

    let elevation = &geometry.elevation_bins;
    let z_ref = reference_elevation(glacier, options);
    let initial_reference = match options.surface_type_initial {
        InitialSurfaceType::MedianElevation => glacier.zmed,
        InitialSurfaceType::MeanElevation => hypsometry_stats(geometry).1,
    };

    let mut geom = geometry.clone();
    let mut surface_type = initial_surface_type(&geom, initial_reference, options);
    let mut snowpack = vec![0.0; n_bins];
    let mut refreeze_potential = vec![0.0; n_bins];
    let mut prec_bins = vec![0.0; n_bins];

    for year in 0..n_years {
        let months = year * 12..(year + 1) * 12;
        let glacier_bins = geom.glacier_bins();

        output.area_annual.column_mut(year).assign(&geom.area_km2);
        output.thickness_annual.column_mut(year).assign(&geom.thickness_m);
        output.width_annual.column_mut(year).assign(&geom.width_km);
        output.area[year] = geom.total_area();
        output.volume[year] = hypsometry_stats(&geom).0;
        for (i, surface) in surface_type.iter().enumerate() {
            output.surfacetype_annual[[i, year]] = surface.code();
        }

        // Temperature of the whole year is needed up front for the refreeze potential
        for t in months.clone() {
            let (lr_gcm, lr_glac) = if options.lapse_rate_from_climate {
                (climate.lapse_rate[t], climate.lapse_rate[t])
            } else {
                (params.lrgcm, params.lrglac)
            };
            let t_ref = climate.temp[t] + lr_gcm * (z_ref - climate.elevation);
            for &i in &glacier_bins {
                output.temp[[i, t]] = t_ref + lr_glac * (elevation[i] - z_ref) + params.tempchange;
            }
        }
        for &i in &glacier_bins {
            refreeze_potential[i] = match options.refreezing {
                RefreezeScheme::Woodward => {
                    let mean = output.temp.slice(s![i, months.clone()]).mean().unwrap_or(0.0);
                    woodward_refreeze_potential(mean)
                }
                RefreezeScheme::None => 0.0,
            };
        }

        for t in months.clone() {
            let days = dates.steps()[t].days_in_month as f64;
            bin_precipitation(
                climate.prec[t],
                params,
                elevation,
                &glacier_bins,
                z_ref,
                options.precipitation_limit,
                &mut prec_bins,
            );

            let mut area_sum = 0.0;
            let mut mb_sum = 0.0;
            let mut runoff = 0.0;
            let mut snow_sum = 0.0;
            for &i in &glacier_bins {
                let area = geom.area_km2[i];
                let temp = output.temp[[i, t]];
                let snow =
                    prec_bins[i] * snow_fraction(temp, params.tempsnow, options.accumulation);
                let rain = prec_bins[i] - snow;

                snowpack[i] += snow;
                let mut degree_days = temp.max(0.0) * days;
                let snow_melt = (params.ddfsnow * degree_days).min(snowpack[i]);
                snowpack[i] -= snow_melt;
                if params.ddfsnow > 0.0 {
                    degree_days -= snow_melt / params.ddfsnow;
                }
                let surface_melt = if snowpack[i] <= 0.0 {
                    surface_type[i]
                        .degree_day_factor(params.ddfsnow, params.ddfice, options.ddf_firn)
                        * degree_days.max(0.0)
                } else {
                    0.0
                };
                let melt = snow_melt + surface_melt;

                let refreeze = (snow_melt + rain).min(refreeze_potential[i]).max(0.0);
                refreeze_potential[i] -= refreeze;

                let mb = snow + refreeze - melt;

                output.prec[[i, t]] = rain;
                output.acc[[i, t]] = snow;
                output.melt[[i, t]] = melt;
                output.refreeze[[i, t]] = refreeze;
                output.snowpack[[i, t]] = snowpack[i];
                output.massbalclim[[i, t]] = mb;

                area_sum += area;
                mb_sum += mb * area;
                runoff += (rain + melt - refreeze) * area;
                snow_sum += snowpack[i] * area;
            }

            if area_sum > 0.0 {
                output.massbaltotal[t] = mb_sum / area_sum;
            }
            output.runoff[t] = runoff * 1e6;
            output.snowpack_total[t] = snow_sum / 1000.0;
            output.snowline[t] = glacier_bins
                .iter()
                .find(|&&i| snowpack[i] > 0.0)
                .map(|&i| elevation[i])
                .unwrap_or(f64::NAN);
        }

        let annual = output
            .massbalclim
            .slice(s![.., months.clone()])
            .sum_axis(Axis(1));
        output.massbalclim_annual.column_mut(year).assign(&annual);

        let glacier_elevation: Vec<f64> = glacier_bins.iter().map(|&i| elevation[i]).collect();
        let glacier_mb: Vec<f64> = glacier_bins.iter().map(|&i| annual[i]).collect();
        output.ela[year] = equilibrium_line_altitude(&glacier_elevation, &glacier_mb);

        if mode == MassBalanceMode::Dynamic {
            let volume_change = (&annual * &geom.area_km2).sum() / 1000.0 * options.density_water
                / options.density_ice;
            mass_redistribution(&mut geom, volume_change);
            for i in 0..n_bins {
                if geom.area_km2[i] <= 0.0 {
                    snowpack[i] = 0.0;
                }
            }
        }

        let area: Vec<f64> = geom.area_km2.to_vec();
        update_surface_type(
            &mut surface_type,
            &output.massbalclim_annual,
            year,
            &area,
            options,
        );
    }

    output.area_annual.column_mut(n_years).assign(&geom.area_km2);
    output.thickness_annual.column_mut(n_years).assign(&geom.thickness_m);
    output.width_annual.column_mut(n_years).assign(&geom.width_km);
    output.area[n_years] = geom.total_area();
    output.volume[n_years] = hypsometry_stats(&geom).0;

    Ok(output)
}

/// Glacier-wide mass balance of an area-constant run.
///
/// Convenience for calibration, where only the glacier-wide series is needed.
pub fn glacier_wide_mass_balance(
    params: &ModelParameters,
    glacier: &GlacierAttributes,
    geometry: &GlacierGeometry,
    climate: &GlacierClimate,
    dates: &DatesTable,
    options: &MassBalanceOptions,
) -> GemResult<Array1<f64>> {
    run_mass_balance(
        params,
        glacier,
        geometry,
        climate,
        dates,
        options,
        MassBalanceMode::AreaConstant,
    )
    .map(|output| output.massbaltotal)
}

/// Area-weighted mass balance over a range of bins and months (m w.e.).
///
/// The area of the year containing `t1_idx` is used as the weight.
pub fn area_weighted_mass_balance(
    output: &MassBalanceOutput,
    bins: (usize, usize),
    t1_idx: usize,
    t2_idx: usize,
) -> f64 {
    let t2_idx = t2_idx.min(output.n_months());
    let end = bins.1.min(output.massbalclim.nrows());
    let bins = (bins.0.min(end), end);
    if t1_idx >= t2_idx {
        return f64::NAN;
    }
    let year = (t1_idx / 12).min(output.area_annual.ncols().saturating_sub(1));
    let area = output.area_annual.slice(s![bins.0..bins.1, year]);
    let mb: Array2<f64> = output.massbalclim.slice(s![bins.0..bins.1, t1_idx..t2_idx]).to_owned();
    let total_area = area.sum();
    if total_area <= 0.0 {
        return f64::NAN;
    }
    (mb.sum_axis(Axis(1)) * area).sum() / total_area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::YearType;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn glacier() -> GlacierAttributes {
        GlacierAttributes {
            rgi_id: "RGI60-15.00001".to_string(),
            o1_region: 15,
            o2_region: 1,
            glacier_number: "00001".to_string(),
            cen_lat: 28.0,
            cen_lon: 86.0,
            area_km2: 3.0,
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

    fn geometry() -> GlacierGeometry {
        GlacierGeometry::new(
            array![4900.0, 5000.0, 5100.0, 5200.0],
            array![0.0, 1.0, 1.0, 1.0],
            array![0.0, 100.0, 150.0, 100.0],
            array![0.0, 1.0, 1.0, 1.0],
        )
        .unwrap()
    }

    fn climate(n: usize, temp: f64, prec: f64) -> GlacierClimate {
        GlacierClimate {
            temp: Array1::from_elem(n, temp),
            prec: Array1::from_elem(n, prec),
            lapse_rate: Array1::from_elem(n, -0.0065),
            elevation: 5100.0,
        }
    }

    #[test]
    fn snow_fractions() {
        let linear = AccumulationScheme::LinearTransition;
        assert_eq!(snow_fraction(-0.5, 1.0, linear), 1.0);
        assert_eq!(snow_fraction(2.5, 1.0, linear), 0.0);
        assert_relative_eq!(snow_fraction(1.0, 1.0, linear), 0.5);
        assert_relative_eq!(snow_fraction(1.5, 1.0, linear), 0.25);
        assert_eq!(snow_fraction(0.99, 1.0, AccumulationScheme::Threshold), 1.0);
        assert_eq!(snow_fraction(1.0, 1.0, AccumulationScheme::Threshold), 0.0);
    }

    #[test]
    fn refreeze_potential() {
        assert_relative_eq!(woodward_refreeze_potential(-10.0), 0.069096);
        assert_eq!(woodward_refreeze_potential(5.0), 0.0);
    }

    #[test]
    fn ela_interpolation() {
        let z = [100.0, 200.0, 300.0];
        assert_relative_eq!(equilibrium_line_altitude(&z, &[-1.0, -0.5, 0.5]), 250.0);
        assert_eq!(equilibrium_line_altitude(&z, &[1.0, 2.0, 3.0]), 100.0);
        assert_eq!(equilibrium_line_altitude(&z, &[-1.0, -2.0, -3.0]), 300.0);
        assert!(equilibrium_line_altitude(&[], &[]).is_nan());
    }

    #[test]
    fn precipitation_limit_decays_over_upper_quarter() {
        let params = ModelParameters {
            precgrad: 0.0,
            ..Default::default()
        };
        let elevation = array![1000.0, 1100.0, 1200.0, 1300.0, 1400.0];
        let bins = [0, 1, 2, 3, 4];
        let mut out = vec![0.0; 5];

        bin_precipitation(1.0, &params, &elevation, &bins, 1200.0, true, &mut out);
        // z75 = 1300, so only the top bin decays
        assert_eq!(out[3], 1.0);
        assert_relative_eq!(out[4], (-1.0f64).exp());

        bin_precipitation(1.0, &params, &elevation, &bins, 1200.0, false, &mut out);
        assert_eq!(out[4], 1.0);
    }

    #[test]
    fn rejects_partial_years() {
        let dates = DatesTable::model_run(2000, 2000, 0, YearType::Calendar).unwrap();
        let result = run_mass_balance(
            &ModelParameters::default(),
            &glacier(),
            &geometry(),
            &climate(11, 0.0, 0.1),
            &dates,
            &MassBalanceOptions::default(),
            MassBalanceMode::AreaConstant,
        );
        assert!(matches!(result, Err(GemError::DimensionMismatch { .. })));
    }

    #[test]
    fn cold_climate_accumulates() {
        let dates = DatesTable::model_run(2000, 2001, 0, YearType::Calendar).unwrap();
        let output = run_mass_balance(
            &ModelParameters::default(),
            &glacier(),
            &geometry(),
            &climate(24, -20.0, 0.1),
            &dates,
            &MassBalanceOptions::default(),
            MassBalanceMode::AreaConstant,
        )
        .unwrap();

        assert!(output.melt.iter().all(|m| *m == 0.0));
        assert!(output.massbaltotal.iter().all(|mb| *mb > 0.0));
        // Off-glacier bin stays zero
        assert!(output.acc.row(0).iter().all(|v| *v == 0.0));
        // Snow line at the lowest glacier bin
        assert_eq!(output.snowline[5], 5000.0);
        assert_eq!(output.ela[0], 5000.0);
        // Everything above the median becomes firn, below stays ice until reclassified
        assert_eq!(output.surfacetype_annual[[1, 0]], SurfaceType::Ice.code());
        assert_eq!(output.surfacetype_annual[[3, 0]], SurfaceType::Firn.code());
        assert_eq!(output.surfacetype_annual[[1, 1]], SurfaceType::Firn.code());
        assert_eq!(output.surfacetype_annual[[0, 1]], SurfaceType::None.code());
    }

    #[test]
    fn warm_climate_melts_and_thins() {
        let dates = DatesTable::model_run(2000, 2004, 0, YearType::Calendar).unwrap();
        let output = run_mass_balance(
            &ModelParameters::default(),
            &glacier(),
            &geometry(),
            &climate(60, 5.0, 0.01),
            &dates,
            &MassBalanceOptions::default(),
            MassBalanceMode::Dynamic,
        )
        .unwrap();

        assert!(output.massbaltotal.iter().all(|mb| *mb < 0.0));
        assert!(output.volume[5] < output.volume[0]);
        assert!(output.area[5] <= output.area[0]);
        assert!(output.area_annual.iter().all(|a| *a >= 0.0));
        assert!(output.thickness_annual.iter().all(|h| *h >= 0.0));
        assert!(output.runoff.iter().all(|r| *r > 0.0));
        assert!(output.snowline.iter().all(|z| z.is_nan()));
        // No positive bins
        assert_eq!(output.ela[0], 5200.0);
    }

    #[test]
    fn area_constant_keeps_geometry() {
        let dates = DatesTable::model_run(2000, 2002, 0, YearType::Calendar).unwrap();
        let output = run_mass_balance(
            &ModelParameters::default(),
            &glacier(),
            &geometry(),
            &climate(36, 3.0, 0.05),
            &dates,
            &MassBalanceOptions::default(),
            MassBalanceMode::AreaConstant,
        )
        .unwrap();

        for y in 0..4 {
            assert_eq!(output.area_annual.column(y), geometry().area_km2);
            assert_eq!(output.thickness_annual.column(y), geometry().thickness_m);
        }
        assert_relative_eq!(output.volume[0], output.volume[3]);
    }

    #[test]
    fn area_weighted_balance_over_bins() {
        let dates = DatesTable::model_run(2000, 2000, 0, YearType::Calendar).unwrap();
        let output = run_mass_balance(
            &ModelParameters::default(),
            &glacier(),
            &geometry(),
            &climate(12, 0.0, 0.1),
            &dates,
            &MassBalanceOptions::default(),
            MassBalanceMode::AreaConstant,
        )
        .unwrap();

        let whole = area_weighted_mass_balance(&output, (1, 4), 0, 12);
        assert_relative_eq!(whole, output.massbaltotal.sum(), epsilon = 1e-12);
        assert!(area_weighted_mass_balance(&output, (0, 1), 0, 12).is_nan());
    }
}
