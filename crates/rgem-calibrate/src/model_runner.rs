//! Evaluation of the model for sampled parameter vectors.

use crate::likelihood::{ModelOutput, VariableOutput};
use crate::observations::MassBalanceObservation;
use crate::priors::{transform_precfactor, CALIBRATED_PARAMETERS};
use crate::{Error, Result};
use rayon::prelude::*;
use rgem_core::climate::GlacierClimate;
use rgem_core::dates::DatesTable;
use rgem_core::geometry::GlacierGeometry;
use rgem_core::glacier::GlacierAttributes;
use rgem_core::massbalance::glacier_wide_mass_balance;
use rgem_core::parameters::{MassBalanceOptions, ModelParameters};
use tracing::warn;

/// Runs a model for a vector of free parameters.
pub trait ModelRunner: Send + Sync {
    /// Names of the free parameters, in the order of the vectors passed to [`run`](Self::run).
    fn param_names(&self) -> &[String];

    fn run(&self, params: &[f64]) -> Result<ModelOutput>;

    /// Run several parameter vectors in parallel.
    fn run_batch(&self, param_sets: &[Vec<f64>]) -> Vec<Result<ModelOutput>> {
        param_sets.par_iter().map(|p| self.run(p)).collect()
    }

    /// Derived scalar stored alongside every sample of a chain.
    fn blob(&self, _output: &ModelOutput) -> f64 {
        f64::NAN
    }
}

/// Name of the output variable holding the modelled mass balance rate.
pub const MASS_BALANCE_VARIABLE: &str = "massbal";

/// Runs the area-constant mass balance of one glacier for one observation.
///
/// The free parameters are the raw precipitation factor, the temperature bias and the
/// degree-day factor of snow. The output variable [`MASS_BALANCE_VARIABLE`] holds the
/// glacier-wide mass balance rate (m w.e. a^-1) over the observed period, at time `t2`.
#[derive(Debug, Clone)]
pub struct GlacierRunner {
    param_names: Vec<String>,
    base: ModelParameters,
    glacier: GlacierAttributes,
    geometry: GlacierGeometry,
    climate: GlacierClimate,
    dates: DatesTable,
    options: MassBalanceOptions,
    observation: MassBalanceObservation,
}

impl GlacierRunner {
    /// # Arguments
    ///
    /// * `base` - Values of the parameters that are not calibrated
    /// * `observation` - Observation defining the period the mass balance is computed over
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: ModelParameters,
        glacier: GlacierAttributes,
        geometry: GlacierGeometry,
        climate: GlacierClimate,
        dates: DatesTable,
        options: MassBalanceOptions,
        observation: MassBalanceObservation,
    ) -> Self {
        if glacier.is_water_terminating() {
            warn!(
                "{} is water-terminating; calibrating without frontal ablation",
                glacier.rgi_id
            );
        }
        Self {
            param_names: CALIBRATED_PARAMETERS.iter().map(|s| s.to_string()).collect(),
            base,
            glacier,
            geometry,
            climate,
            dates,
            options,
            observation,
        }
    }

    pub fn observation(&self) -> &MassBalanceObservation {
        &self.observation
    }

    /// Full model parameters for a vector of free parameters.
    pub fn model_parameters(&self, params: &[f64]) -> Result<ModelParameters> {
        let [precfactor_raw, tempchange, ddfsnow] = params else {
            return Err(Error::InvalidParameter(format!(
                "Expected {} parameters, got {}",
                CALIBRATED_PARAMETERS.len(),
                params.len()
            )));
        };
        Ok(ModelParameters {
            precfactor: transform_precfactor(*precfactor_raw),
            tempchange: *tempchange,
            ddfsnow: *ddfsnow,
            ..self.base
        })
    }

    /// Modelled mass balance rate over the observed period (m w.e. a^-1).
    pub fn mass_balance_rate(&self, params: &[f64]) -> Result<f64> {
        let model_params = self.model_parameters(params)?;
        let massbaltotal = glacier_wide_mass_balance(
            &model_params,
            &self.glacier,
            &self.geometry,
            &self.climate,
            &self.dates,
            &self.options,
        )?;

        let obs = &self.observation;
        let t2_idx = obs.t2_idx.min(massbaltotal.len());
        if obs.t1_idx >= t2_idx {
            return Err(Error::InvalidTarget(format!(
                "Observation of {} is outside the model run",
                obs.rgi_id
            )));
        }
        let total: f64 = massbaltotal
            .slice(ndarray::s![obs.t1_idx..t2_idx])
            .sum();
        Ok(total / obs.years())
    }
}

impl ModelRunner for GlacierRunner {
    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    fn run(&self, params: &[f64]) -> Result<ModelOutput> {
        let rate = self.mass_balance_rate(params)?;

        let mut output = ModelOutput::new();
        let mut variable = VariableOutput::new(MASS_BALANCE_VARIABLE);
        variable.add(self.observation.t2, rate);
        output.add_variable(variable);
        Ok(output)
    }

    fn blob(&self, output: &ModelOutput) -> f64 {
        output
            .get(MASS_BALANCE_VARIABLE)
            .and_then(|v| v.at(self.observation.t2))
            .unwrap_or(f64::NAN)
    }
}
