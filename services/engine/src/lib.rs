//! VPC Peering Engine Library
//!
//! Reconciles VPC peering connections and routes from tag-declared
//! dependencies across accounts and regions.

pub mod agents;
pub mod config;
pub mod error;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agents::auto_peering::{AutoPeeringAgent, ReconcileReport};
pub use config::{ConfigArgs, PeeringConfig};
pub use error::{PeeringError, Result};
