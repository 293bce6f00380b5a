//! Model output and likelihood functions.

use crate::target::Target;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tolerance when matching model times to observation times.
const TIME_TOLERANCE: f64 = 1e-6;

/// Time series of one model variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableOutput {
    pub name: String,
    /// `(time, value)` pairs in insertion order
    pub values: Vec<(f64, f64)>,
}

impl VariableOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn add(&mut self, time: f64, value: f64) -> &mut Self {
        self.values.push((time, value));
        self
    }

    /// Value at `time`, matched within a small tolerance.
    pub fn at(&self, time: f64) -> Option<f64> {
        self.values
            .iter()
            .find(|(t, _)| (t - time).abs() < TIME_TOLERANCE)
            .map(|&(_, v)| v)
    }
}

/// Output of one model evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub variables: IndexMap<String, VariableOutput>,
}

impl ModelOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, variable: VariableOutput) -> &mut Self {
        self.variables.insert(variable.name.clone(), variable);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VariableOutput> {
        self.variables.get(name)
    }
}

/// Log-likelihood of model output given observations.
pub trait LikelihoodFn: Send + Sync {
    fn ln_likelihood(&self, output: &ModelOutput, target: &Target) -> Result<f64>;
}

/// Independent Gaussian errors on every observation.
///
/// ln L = Σ [ -½ ((m - o) / σ)² - ln(σ √(2π)) ]
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianLikelihood;

impl GaussianLikelihood {
    pub fn new() -> Self {
        Self
    }
}

impl LikelihoodFn for GaussianLikelihood {
    fn ln_likelihood(&self, output: &ModelOutput, target: &Target) -> Result<f64> {
        let norm = (2.0 * PI).sqrt();
        let mut total = 0.0;

        for variable in target.variables() {
            let modelled = output.get(&variable.name).ok_or_else(|| {
                Error::InvalidTarget(format!("Model output has no variable {}", variable.name))
            })?;

            for obs in &variable.observations {
                let value = modelled.at(obs.time).ok_or_else(|| {
                    Error::InvalidTarget(format!(
                        "Model output for {} has no value at time {}",
                        variable.name, obs.time
                    ))
                })?;
                let z = (value - obs.value) / obs.uncertainty;
                total += -0.5 * z * z - (obs.uncertainty * norm).ln();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn output(value: f64) -> ModelOutput {
        let mut output = ModelOutput::new();
        let mut var = VariableOutput::new("massbal");
        var.add(2000.0, 0.0).add(2010.0, value);
        output.add_variable(var);
        output
    }

    #[test]
    fn gaussian_at_observation() {
        let mut target = Target::new();
        target.add_variable("massbal").add(2010.0, -0.5, 0.2).unwrap();

        let likelihood = GaussianLikelihood::new();
        let exact = likelihood.ln_likelihood(&output(-0.5), &target).unwrap();
        assert_relative_eq!(exact, -(0.2 * (2.0 * PI).sqrt()).ln());

        let off = likelihood.ln_likelihood(&output(-0.1), &target).unwrap();
        assert_relative_eq!(off, exact - 0.5 * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn time_matched_within_tolerance() {
        let var = output(1.0).get("massbal").cloned().unwrap();
        assert_eq!(var.at(2010.0 + 1e-9), Some(1.0));
        assert_eq!(var.at(2010.5), None);
    }

    #[test]
    fn missing_variable_or_time() {
        let likelihood = GaussianLikelihood::new();

        let mut target = Target::new();
        target.add_variable("area").add(2010.0, 1.0, 0.1).unwrap();
        assert!(likelihood.ln_likelihood(&output(0.0), &target).is_err());

        let mut target = Target::new();
        target.add_variable("massbal").add(2005.0, 1.0, 0.1).unwrap();
        assert!(likelihood.ln_likelihood(&output(0.0), &target).is_err());
    }
}
