//! Ordered collection of named prior distributions.

use crate::distribution::Distribution;
use crate::{Error, Result};
use indexmap::IndexMap;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Free parameters of a calibration and their priors.
///
/// The insertion order defines the order of values in every parameter vector
/// passed to a [`ModelRunner`](crate::ModelRunner).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: IndexMap<String, Box<dyn Distribution>>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any existing prior with the same name.
    pub fn add(&mut self, name: impl Into<String>, prior: Box<dyn Distribution>) -> &mut Self {
        self.parameters.insert(name.into(), prior);
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.parameters.keys().map(|k| k.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Distribution> {
        self.parameters.get(name).map(|d| d.as_ref())
    }

    /// Support of every parameter, in order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.values().map(|d| d.bounds()).collect()
    }

    /// Joint log prior density of a parameter vector.
    ///
    /// Returns negative infinity when any value lies outside its prior's support.
    pub fn log_prior(&self, values: &[f64]) -> Result<f64> {
        if values.len() != self.len() {
            return Err(Error::InvalidParameter(format!(
                "Expected {} parameter values, got {}",
                self.len(),
                values.len()
            )));
        }

        let mut total = 0.0;
        for (prior, &value) in self.parameters.values().zip(values) {
            let lp = prior.ln_pdf(value);
            if !lp.is_finite() {
                return Ok(f64::NEG_INFINITY);
            }
            total += lp;
        }
        Ok(total)
    }

    /// Draw `n` independent parameter vectors from the priors.
    ///
    /// Returns an array of shape `(n, n_params)`.
    pub fn sample_random_with_rng<R: Rng>(&self, n: usize, rng: &mut R) -> Array2<f64> {
        let mut samples = Array2::zeros((n, self.len()));
        for mut row in samples.rows_mut() {
            for (value, prior) in row.iter_mut().zip(self.parameters.values()) {
                *value = prior.sample(rng);
            }
        }
        samples
    }
}
