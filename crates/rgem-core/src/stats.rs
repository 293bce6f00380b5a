//! Summary statistics across an ensemble of model runs.

use ndarray::{Array1, ArrayView2, Axis};
use num::Float;
use serde::{Deserialize, Serialize};

/// Names of the statistics, in the order returned by [`EnsembleStats::columns`].
pub const STAT_NAMES: [&str; 7] = ["mean", "std", "2.5%", "25%", "median", "75%", "97.5%"];

/// Percentile of sorted, finite values with linear interpolation between closest ranks.
///
/// `q` is in percent. Returns NaN for an empty slice.
pub fn percentile<T: Float>(sorted: &[T], q: T) -> T {
    match sorted.len() {
        0 => T::nan(),
        1 => sorted[0],
        n => {
            let hundred = T::from(100.0).unwrap_or_else(T::one);
            let rank = (q / hundred) * T::from(n - 1).unwrap_or_else(T::zero);
            let lower = rank.floor();
            let frac = rank - lower;
            let i = lower.to_usize().unwrap_or(0).min(n - 1);
            let j = (i + 1).min(n - 1);
            sorted[i] + (sorted[j] - sorted[i]) * frac
        }
    }
}

/// Statistics of every time step across ensemble members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStats {
    pub mean: Array1<f64>,
    /// Population standard deviation
    pub std: Array1<f64>,
    pub p2_5: Array1<f64>,
    pub p25: Array1<f64>,
    pub median: Array1<f64>,
    pub p75: Array1<f64>,
    pub p97_5: Array1<f64>,
}

impl EnsembleStats {
    /// Compute the statistics of `members` (one row per member, one column per time step).
    ///
    /// NaN values are ignored and a column without finite values gives NaN statistics.
    pub fn from_members(members: ArrayView2<f64>) -> Self {
        let n = members.ncols();
        let mut stats = Self {
            mean: Array1::from_elem(n, f64::NAN),
            std: Array1::from_elem(n, f64::NAN),
            p2_5: Array1::from_elem(n, f64::NAN),
            p25: Array1::from_elem(n, f64::NAN),
            median: Array1::from_elem(n, f64::NAN),
            p75: Array1::from_elem(n, f64::NAN),
            p97_5: Array1::from_elem(n, f64::NAN),
        };

        for (t, column) in members.axis_iter(Axis(1)).enumerate() {
            let mut values: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if values.is_empty() {
                continue;
            }
            values.sort_by(|a, b| a.total_cmp(b));

            let count = values.len() as f64;
            let mean = values.iter().sum::<f64>() / count;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

            stats.mean[t] = mean;
            stats.std[t] = variance.sqrt();
            stats.p2_5[t] = percentile(&values, 2.5);
            stats.p25[t] = percentile(&values, 25.0);
            stats.median[t] = percentile(&values, 50.0);
            stats.p75[t] = percentile(&values, 75.0);
            stats.p97_5[t] = percentile(&values, 97.5);
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Statistics in [`STAT_NAMES`] order.
    pub fn columns(&self) -> [&Array1<f64>; 7] {
        [
            &self.mean,
            &self.std,
            &self.p2_5,
            &self.p25,
            &self.median,
            &self.p75,
            &self.p97_5,
        ]
    }
}
