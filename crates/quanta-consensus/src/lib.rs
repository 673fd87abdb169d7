//! Consensus - stake-weighted producer selection.
//!
//! Addresses lock balance as stake to become block producers. The eligible
//! set is recomputed at every epoch boundary from committed stake only, so
//! every node replaying the same chain derives the same set.

pub mod error;
pub mod tracker;
pub mod validator;

pub use error::ConsensusError;
pub use tracker::StakeValidatorsTracker;
pub use validator::{StakeValidator, ValidatorStatus};
