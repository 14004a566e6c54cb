use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

use super::{
    economy, Gene, Genome, MAX_BASE, MAX_SUBSTRATE, MAX_VOLATILE, MIN_VOLATILE,
    SUBSTRATE_LEVEL_NAMES,
};
use crate::Amount;

/// One of the three tradeable stats. Also the spin "trait target".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Cap,
    Stem,
    Spores,
}

impl Stat {
    pub const ALL: [Stat; 3] = [Stat::Cap, Stat::Stem, Stat::Spores];

    /// The single-stat gene that boosts this stat.
    pub fn gene(self) -> Gene {
        match self {
            Stat::Cap => Gene::Cap,
            Stat::Stem => Gene::Stem,
            Stat::Spores => Gene::Spores,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stat::Cap => "cap",
            Stat::Stem => "stem",
            Stat::Spores => "spores",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("unknown stat: {0:?}")]
pub struct UnknownStat(pub String);

impl FromStr for Stat {
    type Err = UnknownStat;

    /// Case-insensitive; the contract emits `Cap`, the frontend sends `cap`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cap" => Ok(Stat::Cap),
            "stem" => Ok(Stat::Stem),
            "spores" => Ok(Stat::Spores),
            _ => Err(UnknownStat(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub cap: u8,
    pub stem: u8,
    pub spores: u8,
}

impl BaseStats {
    pub fn get(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Cap => self.cap,
            Stat::Stem => self.stem,
            Stat::Spores => self.spores,
        }
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum CreatureInvariantError {
    #[error("volatile {stat} out of range (got={got})")]
    VolatileOutOfRange { stat: Stat, got: i8 },
    #[error("base {stat} out of range (got={got}, max={max})", max = MAX_BASE)]
    BaseOutOfRange { stat: Stat, got: u8 },
    #[error("substrate out of range (got={got}, max={max})", max = MAX_SUBSTRATE)]
    SubstrateOutOfRange { got: u8 },
}

/// A mushroom token as read from the NFT contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creature {
    pub token_id: String,
    pub cap: i8,
    pub stem: i8,
    pub spores: i8,
    pub substrate: u8,
    pub base_cap: u8,
    pub base_stem: u8,
    pub base_spores: u8,
    pub genome: Genome,
}

impl Creature {
    /// A freshly minted creature whose base stats follow from its genome.
    pub fn from_genome(token_id: impl Into<String>, genome: Genome) -> Self {
        let base = genome.base_stats();
        Self {
            token_id: token_id.into(),
            cap: 0,
            stem: 0,
            spores: 0,
            substrate: 0,
            base_cap: base.cap,
            base_stem: base.stem,
            base_spores: base.spores,
            genome,
        }
    }

    pub fn validate_invariants(&self) -> Result<(), CreatureInvariantError> {
        for stat in Stat::ALL {
            let got = self.volatile(stat);
            if !(MIN_VOLATILE..=MAX_VOLATILE).contains(&got) {
                return Err(CreatureInvariantError::VolatileOutOfRange { stat, got });
            }
            let got = self.base(stat);
            if got > MAX_BASE {
                return Err(CreatureInvariantError::BaseOutOfRange { stat, got });
            }
        }
        if self.substrate > MAX_SUBSTRATE {
            return Err(CreatureInvariantError::SubstrateOutOfRange {
                got: self.substrate,
            });
        }
        Ok(())
    }

    pub fn volatile(&self, stat: Stat) -> i8 {
        match stat {
            Stat::Cap => self.cap,
            Stat::Stem => self.stem,
            Stat::Spores => self.spores,
        }
    }

    pub fn set_volatile(&mut self, stat: Stat, value: i8) {
        let value = value.clamp(MIN_VOLATILE, MAX_VOLATILE);
        match stat {
            Stat::Cap => self.cap = value,
            Stat::Stem => self.stem = value,
            Stat::Spores => self.spores = value,
        }
    }

    pub fn base(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Cap => self.base_cap,
            Stat::Stem => self.base_stem,
            Stat::Spores => self.base_spores,
        }
    }

    pub fn base_stats(&self) -> BaseStats {
        BaseStats {
            cap: self.base_cap,
            stem: self.base_stem,
            spores: self.base_spores,
        }
    }

    /// Volatile plus base value of `stat`.
    pub fn total(&self, stat: Stat) -> i32 {
        i32::from(self.volatile(stat)) + i32::from(self.base(stat))
    }

    pub fn raw_power(&self) -> u32 {
        economy::raw_power(
            self.total(Stat::Cap),
            self.total(Stat::Stem),
            self.total(Stat::Spores),
        )
    }

    pub fn shares(&self) -> u128 {
        economy::shares(self.raw_power(), self.substrate)
    }

    /// Stat(s) with the highest total; ties return every tied stat.
    pub fn dominant_stats(&self) -> Vec<Stat> {
        let best = Stat::ALL
            .iter()
            .map(|stat| self.total(*stat))
            .max()
            .unwrap_or_default();
        Stat::ALL
            .into_iter()
            .filter(|stat| self.total(*stat) == best)
            .collect()
    }

    /// Ascension requires every volatile trait at +3 and room to climb.
    pub fn can_ascend(&self) -> bool {
        Stat::ALL
            .iter()
            .all(|stat| self.volatile(*stat) == MAX_VOLATILE)
            && self.substrate < MAX_SUBSTRATE
    }

    pub fn substrate_name(&self) -> &'static str {
        SUBSTRATE_LEVEL_NAMES
            .get(usize::from(self.substrate))
            .copied()
            .unwrap_or("Unknown")
    }

    /// Payment required to spin this creature.
    pub fn spin_cost(&self, base_cost: Amount) -> Amount {
        economy::spin_cost(base_cost, self.substrate)
    }
}
