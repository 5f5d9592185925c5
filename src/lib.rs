//! Proof-of-Work Difficulty Retargeting
//!
//! Consensus-grade difficulty adjustment for proof-of-work chains:
//! - Compact 256-bit target encoding (the packed "bits" wire format)
//! - Periodic, damped, bounded retargeting over median-smoothed timestamps
//! - Proof-of-work hash validation against declared targets
//! - Per-network parameter sets with a minimum-difficulty escape valve
//!
//! All consensus operations are pure functions over an immutable chain
//! snapshot, exposed through the [`chain::ChainAncestry`] trait.

pub mod chain;
pub mod compact;
pub mod error;
pub mod params;
pub mod retarget;
pub mod types;

pub use chain::{ChainAncestry, ChainIndex, NodeId};
pub use error::{Error, Result};
pub use params::{Deployment, DeploymentSchedule, Network, Params};
pub use retarget::{
    calculate_next_work, check_proof_of_work, is_valid_proof_of_work, required_work,
};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "pow-retarget";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
