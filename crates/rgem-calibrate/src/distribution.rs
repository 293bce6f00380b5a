//! Prior distributions for calibrated parameters.
//!
//! Distributions are stored as `Box<dyn Distribution>` and serialised with `typetag`, so a
//! [`ParameterSet`](crate::ParameterSet) can be written to and read from disk.

use crate::{Error, Result};
use rand::{Rng, RngCore};
use rand_distr::Distribution as _;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};
use std::fmt::Debug;

/// A univariate probability distribution.
#[typetag::serde(tag = "type")]
pub trait Distribution: Debug + Send + Sync {
    /// Draw a random value.
    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    /// Natural log of the probability density at `x`, negative infinity outside the support.
    fn ln_pdf(&self, x: f64) -> f64;

    /// Support of the distribution as `(low, high)`; unbounded sides are infinite.
    fn bounds(&self) -> (f64, f64);

    fn mean(&self) -> f64;

    fn clone_box(&self) -> Box<dyn Distribution>;
}

impl Clone for Box<dyn Distribution> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Complementary error function.
///
/// Chebyshev approximation with fractional error below 1.2e-7 everywhere.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let r = t * (-z * z - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

/// Cumulative distribution function of the standard normal distribution.
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Quantile function of the standard normal distribution.
///
/// Rational approximation (Acklam) refined with one Halley step.
pub fn standard_normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let e = standard_normal_cdf(x) - p;
    let u = e * (2.0 * PI).sqrt() * (x * x / 2.0).exp();
    x - u / (1.0 + x * u / 2.0)
}

fn normal_ln_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * z * z - sigma.ln() - 0.5 * (2.0 * PI).ln()
}

/// Uniform distribution on `[low, high]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uniform {
    low: f64,
    high: f64,
}

impl Uniform {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(low < high) {
            return Err(Error::InvalidParameter(format!(
                "Uniform bounds must satisfy low < high, got [{}, {}]",
                low, high
            )));
        }
        Ok(Self { low, high })
    }
}

#[typetag::serde]
impl Distribution for Uniform {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.gen_range(self.low..=self.high)
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        if x >= self.low && x <= self.high {
            -(self.high - self.low).ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    fn mean(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

/// Normal distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Normal standard deviation must be positive, got {}",
                sigma
            )));
        }
        Ok(Self { mu, sigma })
    }
}

#[typetag::serde]
impl Distribution for Normal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match rand_distr::Normal::new(self.mu, self.sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mu,
        }
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        normal_ln_pdf(x, self.mu, self.sigma)
    }

    fn bounds(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, f64::INFINITY)
    }

    fn mean(&self) -> f64 {
        self.mu
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

/// Normal distribution truncated to `[low, high]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncatedNormal {
    mu: f64,
    sigma: f64,
    low: f64,
    high: f64,
}

impl TruncatedNormal {
    pub fn new(mu: f64, sigma: f64, low: f64, high: f64) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Truncated normal standard deviation must be positive, got {}",
                sigma
            )));
        }
        if !(low < high) {
            return Err(Error::InvalidParameter(format!(
                "Truncated normal bounds must satisfy low < high, got [{}, {}]",
                low, high
            )));
        }
        Ok(Self {
            mu,
            sigma,
            low,
            high,
        })
    }

    /// Probability mass of the untruncated normal inside the bounds.
    fn mass(&self) -> (f64, f64) {
        let a = standard_normal_cdf((self.low - self.mu) / self.sigma);
        let b = standard_normal_cdf((self.high - self.mu) / self.sigma);
        (a, b)
    }
}

#[typetag::serde]
impl Distribution for TruncatedNormal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        let (a, b) = self.mass();
        let u: f64 = rng.gen();
        let x = self.mu + self.sigma * standard_normal_quantile(a + u * (b - a));
        x.clamp(self.low, self.high)
    }

    fn ln_pdf(&self, x: f64) -> f64 {
        if x < self.low || x > self.high {
            return f64::NEG_INFINITY;
        }
        let (a, b) = self.mass();
        if b - a <= 0.0 {
            return f64::NEG_INFINITY;
        }
        normal_ln_pdf(x, self.mu, self.sigma) - (b - a).ln()
    }

    fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    fn mean(&self) -> f64 {
        let alpha = (self.low - self.mu) / self.sigma;
        let beta = (self.high - self.mu) / self.sigma;
        let phi = |z: f64| (-0.5 * z * z).exp() / (2.0 * PI).sqrt();
        let (a, b) = self.mass();
        if b - a <= 0.0 {
            // Bounds far out in a tail
            return 0.5 * (self.low + self.high);
        }
        self.mu + self.sigma * (phi(alpha) - phi(beta)) / (b - a)
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn normal_cdf_and_quantile() {
        assert_relative_eq!(standard_normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(standard_normal_cdf(1.96), 0.9750021, epsilon = 1e-6);
        assert_relative_eq!(standard_normal_cdf(-1.0), 0.1586553, epsilon = 1e-6);

        for p in [0.001, 0.025, 0.3, 0.5, 0.9, 0.999] {
            assert_relative_eq!(
                standard_normal_cdf(standard_normal_quantile(p)),
                p,
                epsilon = 1e-6
            );
        }
        assert_relative_eq!(standard_normal_quantile(0.975), 1.959964, epsilon = 1e-5);
        assert_eq!(standard_normal_quantile(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn uniform() {
        let dist = Uniform::new(0.0, 4.0).unwrap();
        assert_relative_eq!(dist.ln_pdf(1.0), -(4.0f64).ln());
        assert_eq!(dist.ln_pdf(5.0), f64::NEG_INFINITY);
        assert_eq!(dist.mean(), 2.0);
        assert!(Uniform::new(1.0, 1.0).is_err());
    }

    #[test]
    fn normal() {
        let dist = Normal::new(1.0, 2.0).unwrap();
        assert_relative_eq!(
            dist.ln_pdf(1.0),
            -(2.0f64).ln() - 0.5 * (2.0 * PI).ln()
        );
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
    }

    #[test]
    fn truncated_normal_stays_in_bounds() {
        let dist = TruncatedNormal::new(0.0, 1.0, -2.0, 2.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let samples: Vec<f64> = (0..5000).map(|_| dist.sample(&mut rng)).collect();
        assert!(samples.iter().all(|x| (-2.0..=2.0).contains(x)));
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05);

        assert_eq!(dist.ln_pdf(2.5), f64::NEG_INFINITY);
        // Density is raised by the truncated mass
        let normal = Normal::new(0.0, 1.0).unwrap();
        assert!(dist.ln_pdf(0.0) > normal.ln_pdf(0.0));
        assert!(TruncatedNormal::new(0.0, 1.0, 2.0, -2.0).is_err());
    }

    #[test]
    fn truncated_normal_mean() {
        let symmetric = TruncatedNormal::new(0.0, 4.0, -10.0, 10.0).unwrap();
        assert_relative_eq!(symmetric.mean(), 0.0, epsilon = 1e-9);

        let one_sided = TruncatedNormal::new(0.0, 1.0, 0.0, 50.0).unwrap();
        assert_relative_eq!(one_sided.mean(), (2.0 / PI).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn truncated_normal_without_mass() {
        let dist = TruncatedNormal::new(0.0, 1.0, 60.0, 70.0).unwrap();
        assert_eq!(dist.ln_pdf(65.0), f64::NEG_INFINITY);
        assert_eq!(dist.ln_pdf(0.0), f64::NEG_INFINITY);
        assert_relative_eq!(dist.mean(), 65.0);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!((60.0..=70.0).contains(&dist.sample(&mut rng)));
    }

    #[test]
    fn serialise_boxed() {
        let dist: Box<dyn Distribution> =
            Box::new(TruncatedNormal::new(0.0, 1.0, -2.0, 2.0).unwrap());
        let json = serde_json::to_string(&dist).unwrap();
        assert!(json.contains("TruncatedNormal"));

        let restored: Box<dyn Distribution> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.bounds(), (-2.0, 2.0));
    }
}
