//! Agent modules for the VPC peering engine
//!
//! - `auto_peering`: dependency-driven VPC peering and route reconciliation

pub mod auto_peering;

pub use auto_peering::AutoPeeringAgent;
