//! Glacier evolution model.
//!
//! Computes the monthly climatic mass balance of glaciers on elevation bins and evolves
//! their geometry from year to year. The modules build on each other:
//!
//! - [`dates`]: monthly model time axis
//! - [`glacier`]: glacier inventory attributes
//! - [`geometry`]: glacier hypsometry on elevation bins
//! - [`climate`]: climate forcing, bias adjustment and synthetic climates
//! - [`parameters`]: model parameters and physics options
//! - [`massbalance`]: the mass balance and geometry change model
//! - [`stats`]: statistics across ensembles of runs

pub mod climate;
pub mod dates;
pub mod errors;
pub mod geometry;
pub mod glacier;
pub mod massbalance;
pub mod parameters;
pub mod stats;
