//! Prior distributions of the calibrated mass balance parameters.
//!
//! The precipitation factor is sampled in a raw space centred on zero and mapped onto a
//! multiplicative factor with [`transform_precfactor`], so that raw values of -2 and 2
//! correspond to factors of 1/3 and 3.

use crate::distribution::{TruncatedNormal, Uniform};
use crate::{ParameterSet, Result};
use serde::{Deserialize, Serialize};

/// Names of the calibrated parameters, in sampling order.
pub const CALIBRATED_PARAMETERS: [&str; 3] = ["precfactor", "tempchange", "ddfsnow"];

/// Map a raw precipitation factor onto a multiplicative factor.
///
/// `x + 1` for `x >= 0`, `1 / (1 - x)` otherwise.
pub fn transform_precfactor(raw: f64) -> f64 {
    if raw >= 0.0 {
        raw + 1.0
    } else {
        1.0 / (1.0 - raw)
    }
}

/// Family of the prior distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorType {
    TruncNormal,
    Uniform,
}

/// Location, scale and bounds of one prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorSpec {
    pub mu: f64,
    pub sigma: f64,
    pub low: f64,
    pub high: f64,
}

impl PriorSpec {
    fn distribution(&self, prior_type: PriorType) -> Result<Box<dyn crate::Distribution>> {
        Ok(match prior_type {
            PriorType::TruncNormal => Box::new(TruncatedNormal::new(
                self.mu, self.sigma, self.low, self.high,
            )?),
            PriorType::Uniform => Box::new(Uniform::new(self.low, self.high)?),
        })
    }
}

/// Priors of the Markov chain Monte Carlo calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Distribution family of the first chain
    /// default: truncnormal
    pub distribution: PriorType,
    /// Distribution family of the chain rerun with shifted priors
    /// default: uniform
    pub shifted_distribution: PriorType,
    /// Raw precipitation factor
    /// default: mu 0, sigma 1, bounds [-2, 2]
    pub precfactor: PriorSpec,
    /// Temperature bias
    /// unit: K
    /// default: mu 0, sigma 4, bounds [-10, 10]
    pub tempchange: PriorSpec,
    /// Degree-day factor of snow
    /// unit: m w.e. d^-1 degC^-1
    /// default: mu 0.0041, sigma 0.0015, bounds mu ± 1.96 sigma
    pub ddfsnow: PriorSpec,
}

impl Default for PriorConfig {
    fn default() -> Self {
        let ddfsnow_mu = 0.0041;
        let ddfsnow_sigma = 0.0015;
        Self {
            distribution: PriorType::TruncNormal,
            shifted_distribution: PriorType::Uniform,
            precfactor: PriorSpec {
                mu: 0.0,
                sigma: 1.0,
                low: -2.0,
                high: 2.0,
            },
            tempchange: PriorSpec {
                mu: 0.0,
                sigma: 4.0,
                low: -10.0,
                high: 10.0,
            },
            ddfsnow: PriorSpec {
                mu: ddfsnow_mu,
                sigma: ddfsnow_sigma,
                low: ddfsnow_mu - 1.96 * ddfsnow_sigma,
                high: ddfsnow_mu + 1.96 * ddfsnow_sigma,
            },
        }
    }
}

impl PriorConfig {
    /// Priors of the calibrated parameters in [`CALIBRATED_PARAMETERS`] order.
    pub fn parameter_set(&self) -> Result<ParameterSet> {
        let mut params = ParameterSet::new();
        params
            .add("precfactor", self.precfactor.distribution(self.distribution)?)
            .add("tempchange", self.tempchange.distribution(self.distribution)?)
            .add("ddfsnow", self.ddfsnow.distribution(self.distribution)?);
        Ok(params)
    }

    /// Priors shifted towards an observation the first chain missed.
    ///
    /// A modelled mass balance that is too positive needs less precipitation and more
    /// melt, so the precipitation factor is restricted to `[low, 0]` and the temperature
    /// bias to `[0, high]`; too negative restricts them the other way. The prior means
    /// become the means of the first chain.
    ///
    /// # Arguments
    ///
    /// * `too_positive` - Whether the modelled mass balance exceeded the observation
    /// * `precfactor_mean` - Mean raw precipitation factor of the first chain
    /// * `tempchange_mean` - Mean temperature bias of the first chain
    pub fn shifted(&self, too_positive: bool, precfactor_mean: f64, tempchange_mean: f64) -> Self {
        let mut shifted = *self;
        shifted.distribution = self.shifted_distribution;
        shifted.precfactor.mu = precfactor_mean;
        shifted.tempchange.mu = tempchange_mean;
        if too_positive {
            shifted.precfactor.high = 0.0;
            shifted.tempchange.low = 0.0;
        } else {
            shifted.precfactor.low = 0.0;
            shifted.tempchange.high = 0.0;
        }
        shifted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn precfactor_transform() {
        assert_eq!(transform_precfactor(0.0), 1.0);
        assert_eq!(transform_precfactor(2.0), 3.0);
        assert!(is_close!(transform_precfactor(-2.0), 1.0 / 3.0));
        assert!(is_close!(transform_precfactor(-0.5), 2.0 / 3.0));
    }

    #[test]
    fn default_priors() {
        let config = PriorConfig::default();
        let params = config.parameter_set().unwrap();
        assert_eq!(params.param_names(), CALIBRATED_PARAMETERS.to_vec());

        let (low, high) = params.get("ddfsnow").unwrap().bounds();
        assert!(is_close!(low, 0.00116));
        assert!(is_close!(high, 0.00704));
        assert!(params.log_prior(&[0.0, 0.0, 0.0041]).unwrap().is_finite());
        assert_eq!(
            params.log_prior(&[2.5, 0.0, 0.0041]).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn shift_towards_observation() {
        let config = PriorConfig::default();

        let too_positive = config.shifted(true, -0.3, 1.2);
        assert_eq!(too_positive.distribution, PriorType::Uniform);
        assert_eq!((too_positive.precfactor.low, too_positive.precfactor.high), (-2.0, 0.0));
        assert_eq!((too_positive.tempchange.low, too_positive.tempchange.high), (0.0, 10.0));
        assert_eq!(too_positive.precfactor.mu, -0.3);
        assert_eq!(too_positive.tempchange.mu, 1.2);

        let too_negative = config.shifted(false, 0.3, -1.2);
        assert_eq!((too_negative.precfactor.low, too_negative.precfactor.high), (0.0, 2.0));
        assert_eq!((too_negative.tempchange.low, too_negative.tempchange.high), (-10.0, 0.0));

        let params = too_negative.parameter_set().unwrap();
        assert_eq!(params.get("precfactor").unwrap().bounds(), (0.0, 2.0));
    }

    #[test]
    fn from_toml_like_json() {
        let config: PriorConfig =
            serde_json::from_str(r#"{"distribution": "uniform"}"#).unwrap();
        assert_eq!(config.distribution, PriorType::Uniform);
        assert_eq!(config.tempchange.sigma, 4.0);
    }
}
