//! Provider Tools
//!
//! Minimal AWS clients the agents talk through. Credentials are handed in by
//! the caller; tools never read them from disk.

pub mod ec2;
pub mod query;
pub mod sigv4;
pub mod sts;

pub use ec2::{Ec2QueryClient, QueryApiConnector};
pub use sts::StsClient;
