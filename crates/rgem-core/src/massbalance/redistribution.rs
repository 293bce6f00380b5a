//! Annual geometry change.
//!
//! Volume loss is distributed over the glacier with the empirical thickness change curves
//! of Huss et al. (2010), which concentrate thinning near the terminus. Volume gain
//! thickens every bin uniformly. Width follows a parabolic cross-section, so
//! `w1 = w0 * sqrt(h1 / h0)`, and area scales with width at constant bin length.

use crate::geometry::GlacierGeometry;
use serde::{Deserialize, Serialize};

/// Unmet volume loss below which redistribution stops (km^3)
const VOLUME_TOLERANCE: f64 = 1e-12;

/// Normalised thickness change curve `dh = (h + a)^gamma + b (h + a) + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HussCurve {
    pub gamma: i32,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl HussCurve {
    /// Curve for the size class of a glacier with the given area (km^2).
    pub fn for_area(area_km2: f64) -> Self {
        if area_km2 > 20.0 {
            Self {
                gamma: 6,
                a: -0.02,
                b: 0.12,
                c: 0.0,
            }
        } else if area_km2 > 5.0 {
            Self {
                gamma: 4,
                a: -0.05,
                b: 0.19,
                c: 0.01,
            }
        } else {
            Self {
                gamma: 2,
                a: -0.30,
                b: 0.60,
                c: 0.09,
            }
        }
    }

    /// Normalised thickness change at normalised elevation `h` (1 at the terminus),
    /// clipped to `[0, 1]`.
    pub fn delta_h(&self, h: f64) -> f64 {
        let x = h + self.a;
        (x.powi(self.gamma) + self.b * x + self.c).clamp(0.0, 1.0)
    }
}

/// Bins that still hold ice.
fn ice_bins(geometry: &GlacierGeometry) -> Vec<usize> {
    (0..geometry.n_bins())
        .filter(|&i| geometry.area_km2[i] > 0.0 && geometry.thickness_m[i] > 0.0)
        .collect()
}

/// Thin the glacier by `loss_km3` of ice, removing bins that melt away completely.
///
/// Returns the part of the loss that could not be met because no ice remains.
fn thin(geometry: &mut GlacierGeometry, loss_km3: f64) -> f64 {
    let curve = HussCurve::for_area(geometry.total_area());
    let mut remaining = loss_km3;

    while remaining > VOLUME_TOLERANCE {
        let bins = ice_bins(geometry);
        let (Some(&low), Some(&high)) = (bins.first(), bins.last()) else {
            break;
        };
        let zmin = geometry.elevation_bins[low];
        let zmax = geometry.elevation_bins[high];

        let mut dh: Vec<f64> = bins
            .iter()
            .map(|&i| {
                if zmax > zmin {
                    curve.delta_h((zmax - geometry.elevation_bins[i]) / (zmax - zmin))
                } else {
                    1.0
                }
            })
            .collect();
        let mut weight: f64 = bins
            .iter()
            .zip(&dh)
            .map(|(&i, d)| d * geometry.area_km2[i])
            .sum();
        if weight <= 0.0 {
            dh.iter_mut().for_each(|d| *d = 1.0);
            weight = bins.iter().map(|&i| geometry.area_km2[i]).sum();
        }

        // Scaling factor (m) so the thinning matches the remaining loss
        let fs = remaining * 1000.0 / weight;
        remaining = 0.0;
        for (&i, d) in bins.iter().zip(&dh) {
            let change = fs * d;
            let thickness = geometry.thickness_m[i];
            if change >= thickness {
                remaining += (change - thickness) * geometry.area_km2[i] / 1000.0;
                geometry.thickness_m[i] = 0.0;
            } else {
                geometry.thickness_m[i] = thickness - change;
            }
        }
    }
    remaining.max(0.0)
}

fn thicken(geometry: &mut GlacierGeometry, gain_km3: f64) {
    let bins = ice_bins(geometry);
    let area: f64 = bins.iter().map(|&i| geometry.area_km2[i]).sum();
    if area <= 0.0 {
        return;
    }
    let dh = gain_km3 * 1000.0 / area;
    for i in bins {
        geometry.thickness_m[i] += dh;
    }
}

/// Apply an annual ice volume change (km^3) to the glacier geometry.
///
/// # Returns
///
/// Volume loss (km^3) that exceeded the ice available.
pub fn mass_redistribution(geometry: &mut GlacierGeometry, volume_change_km3: f64) -> f64 {
    let initial_thickness = geometry.thickness_m.clone();

    let unmet = if volume_change_km3 < 0.0 {
        thin(geometry, -volume_change_km3)
    } else {
        if volume_change_km3 > 0.0 {
            thicken(geometry, volume_change_km3);
        }
        0.0
    };

    for i in 0..geometry.n_bins() {
        let h0 = initial_thickness[i];
        let h1 = geometry.thickness_m[i];
        if geometry.area_km2[i] <= 0.0 || h1 <= 0.0 {
            geometry.area_km2[i] = 0.0;
            geometry.width_km[i] = 0.0;
            geometry.thickness_m[i] = 0.0;
        } else if h0 > 0.0 {
            let ratio = (h1 / h0).sqrt();
            geometry.width_km[i] *= ratio;
            geometry.area_km2[i] *= ratio;
        }
    }
    unmet
}
