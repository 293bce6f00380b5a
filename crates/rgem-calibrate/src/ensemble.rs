//! Stratified selection of an ensemble from posterior draws.

use crate::{Error, Result};
use indexmap::IndexMap;
use ndarray::Array1;
use rand::Rng;

/// Select `n` draws spread evenly over the distribution of one trace.
///
/// The draws are sorted by the `sort_by` trace and split into `n` strata of (nearly) equal
/// size; one draw is picked uniformly from each stratum.
///
/// # Arguments
///
/// * `traces` - Traces of equal length, one per variable
/// * `sort_by` - Name of the trace to stratify on
/// * `n` - Number of draws to select
/// * `rng` - Random number generator
///
/// # Returns
///
/// The selected draws of every trace, in increasing order of `sort_by`.
pub fn stratified_sample<R: Rng>(
    traces: &IndexMap<String, Array1<f64>>,
    sort_by: &str,
    n: usize,
    rng: &mut R,
) -> Result<IndexMap<String, Array1<f64>>> {
    let key = traces.get(sort_by).ok_or_else(|| {
        Error::InvalidParameter(format!("No trace named {} to stratify on", sort_by))
    })?;
    let n_draws = key.len();
    if let Some((name, trace)) = traces.iter().find(|(_, t)| t.len() != n_draws) {
        return Err(Error::InvalidParameter(format!(
            "Trace {} has {} draws, expected {}",
            name,
            trace.len(),
            n_draws
        )));
    }
    if n == 0 || n > n_draws {
        return Err(Error::InvalidParameter(format!(
            "Cannot select {} of {} draws",
            n, n_draws
        )));
    }

    let mut order: Vec<usize> = (0..n_draws).collect();
    order.sort_by(|&a, &b| key[a].total_cmp(&key[b]));

    let selected: Vec<usize> = (0..n)
        .map(|stratum| {
            let start = stratum * n_draws / n;
            let end = (stratum + 1) * n_draws / n;
            order[rng.gen_range(start..end)]
        })
        .collect();

    Ok(traces
        .iter()
        .map(|(name, trace)| {
            let values: Array1<f64> = selected.iter().map(|&i| trace[i]).collect();
            (name.clone(), values)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn traces() -> IndexMap<String, Array1<f64>> {
        // massbal decreases with tempchange
        let tempchange: Array1<f64> = (0..100).map(|i| ((i * 37) % 100) as f64 / 10.0).collect();
        let massbal = tempchange.mapv(|t| 1.0 - 0.5 * t);
        let mut traces = IndexMap::new();
        traces.insert("tempchange".to_string(), tempchange);
        traces.insert("massbal".to_string(), massbal);
        traces
    }

    #[test]
    fn one_draw_per_stratum() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sample = stratified_sample(&traces(), "massbal", 10, &mut rng).unwrap();

        let massbal = &sample["massbal"];
        assert_eq!(massbal.len(), 10);
        // Strata of 10 sorted draws: the k-th pick lies in the k-th tenth of the range
        for (k, value) in massbal.iter().enumerate() {
            let low = 1.0 - 0.5 * 9.9 + 0.5 * (k as f64);
            assert!(*value >= low - 1e-12 && *value <= low + 0.45 + 1e-12);
        }
        assert!(massbal.windows(2).into_iter().all(|w| w[0] <= w[1]));

        // Rows stay aligned across traces
        for (t, m) in sample["tempchange"].iter().zip(massbal) {
            assert_eq!(*m, 1.0 - 0.5 * t);
        }
    }

    #[test]
    fn select_all_draws() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let sample = stratified_sample(&traces(), "tempchange", 100, &mut rng).unwrap();
        let expected: Array1<f64> = (0..100).map(|i| i as f64 / 10.0).collect();
        assert_eq!(sample["tempchange"], expected);
    }

    #[test]
    fn invalid_requests() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let traces = traces();
        assert!(stratified_sample(&traces, "massbal", 0, &mut rng).is_err());
        assert!(stratified_sample(&traces, "massbal", 101, &mut rng).is_err());
        assert!(stratified_sample(&traces, "ddfsnow", 10, &mut rng).is_err());

        let mut ragged = traces.clone();
        ragged.insert("ddfsnow".to_string(), Array1::zeros(3));
        assert!(stratified_sample(&ragged, "massbal", 10, &mut rng).is_err());
    }
}
