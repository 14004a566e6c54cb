//! Game domain types and the trait engine.
//!
//! Everything here is pure: genome → base stats, breeding, the quadratic share formula and
//! ecosystem ("weather") multipliers. Clients use these to preview outcomes before a
//! transaction is signed; the contract remains authoritative.

mod constants;
mod creature;
pub mod economy;
mod genome;

pub use constants::*;
pub use creature::*;
pub use economy::{
    breeding_risk, dominance_percent, project_payout, raw_power, shares, spin_cost,
    EcosystemMetrics, Multiplier, RankTier, RewardInfo, TotalBiomass, Weather,
};
pub use genome::*;
