//! Observations a calibration is fitted against.

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single observed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub value: f64,
    /// One standard deviation, always positive
    pub uncertainty: f64,
}

/// Observations of one model variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableTarget {
    pub name: String,
    pub observations: Vec<Observation>,
}

impl VariableTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            observations: Vec::new(),
        }
    }

    /// Add an observation.
    ///
    /// # Arguments
    ///
    /// * `time` - Model time the observation applies to
    /// * `value` - Observed value
    /// * `uncertainty` - Standard deviation of the observation, must be positive
    pub fn add(&mut self, time: f64, value: f64, uncertainty: f64) -> Result<&mut Self> {
        if !(uncertainty > 0.0) || !uncertainty.is_finite() {
            return Err(Error::InvalidTarget(format!(
                "Uncertainty of {} at time {} must be positive, got {}",
                self.name, time, uncertainty
            )));
        }
        if !value.is_finite() {
            return Err(Error::InvalidTarget(format!(
                "Observed {} at time {} is not finite",
                self.name, time
            )));
        }
        self.observations.push(Observation {
            time,
            value,
            uncertainty,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Observed values for a set of variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    variables: IndexMap<String, VariableTarget>,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the observations of a variable, creating it if needed.
    pub fn add_variable(&mut self, name: impl Into<String>) -> &mut VariableTarget {
        let name = name.into();
        self.variables
            .entry(name.clone())
            .or_insert_with(|| VariableTarget::new(name))
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableTarget> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableTarget> {
        self.variables.values()
    }

    /// Total number of observations across all variables.
    pub fn n_observations(&self) -> usize {
        self.variables.values().map(|v| v.len()).sum()
    }
}
