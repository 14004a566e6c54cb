use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error as ThisError;

use super::{
    BaseStats, Stat, BASE_BONUS_BY_MATCHES, GENOME_LENGTH, MUTATION_CHANCE_BPS,
    PRIMORDIAL_MUTATION_BPS, STABLE_BREED_PCT, VOLATILE_BREED_PCT,
};

const ROLL_DENOMINATOR: u32 = 10_000;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum GenomeError {
    #[error("invalid gene id {id} at slot {slot}")]
    InvalidGene { slot: usize, id: i64 },
    #[error("genome too long (len={len}, max=8)")]
    TooLong { len: usize },
    #[error("malformed genome: {0:?}")]
    Malformed(String),
}

/// A single genome slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gene {
    /// Null gene; contributes nothing.
    #[default]
    Rot = 0,
    Cap = 1,
    Stem = 2,
    Spores = 3,
    /// Counts toward every stat.
    Primordial = 4,
}

impl Gene {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Whether this gene counts as a match for `stat`.
    pub fn matches(self, stat: Stat) -> bool {
        self == Gene::Primordial || self == stat.gene()
    }
}

impl TryFrom<u8> for Gene {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Gene::Rot),
            1 => Ok(Gene::Cap),
            2 => Ok(Gene::Stem),
            3 => Ok(Gene::Spores),
            4 => Ok(Gene::Primordial),
            other => Err(other),
        }
    }
}

/// Eight gene slots. Shorter inputs are padded with [`Gene::Rot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Genome([Gene; GENOME_LENGTH]);

impl Genome {
    pub fn new(slots: [Gene; GENOME_LENGTH]) -> Self {
        Self(slots)
    }

    /// Build a genome from raw gene ids, padding missing slots with Rot.
    pub fn from_ids(ids: &[i64]) -> Result<Self, GenomeError> {
        if ids.len() > GENOME_LENGTH {
            return Err(GenomeError::TooLong { len: ids.len() });
        }
        let mut slots = [Gene::Rot; GENOME_LENGTH];
        for (slot, &id) in ids.iter().enumerate() {
            slots[slot] = u8::try_from(id)
                .ok()
                .and_then(|id| Gene::try_from(id).ok())
                .ok_or(GenomeError::InvalidGene { slot, id })?;
        }
        Ok(Self(slots))
    }

    /// Parse the NFT attribute form, e.g. `"[1, 2, 3, 0, 0, 4, 1, 1]"`.
    pub fn parse(raw: &str) -> Result<Self, GenomeError> {
        let ids: Vec<i64> = serde_json::from_str(raw.trim())
            .map_err(|_| GenomeError::Malformed(raw.to_string()))?;
        Self::from_ids(&ids)
    }

    pub fn slots(&self) -> &[Gene; GENOME_LENGTH] {
        &self.0
    }

    pub fn ids(&self) -> [u8; GENOME_LENGTH] {
        self.0.map(Gene::id)
    }

    /// Number of slots counting toward `stat` (Primordial counts for all three).
    pub fn matches(&self, stat: Stat) -> usize {
        self.0.iter().filter(|gene| gene.matches(stat)).count()
    }

    pub fn primordial_count(&self) -> usize {
        self.0.iter().filter(|gene| **gene == Gene::Primordial).count()
    }

    /// Base stats implied by this genome.
    pub fn base_stats(&self) -> BaseStats {
        BaseStats {
            cap: base_bonus(self.matches(Stat::Cap)),
            stem: base_bonus(self.matches(Stat::Stem)),
            spores: base_bonus(self.matches(Stat::Spores)),
        }
    }
}

/// Map a matching-slot count to its base-stat bonus.
pub fn base_bonus(matches: usize) -> u8 {
    BASE_BONUS_BY_MATCHES[matches.min(GENOME_LENGTH)]
}

impl Serialize for Genome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ids().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Genome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<i64>::deserialize(deserializer)?;
        Genome::from_ids(&ids).map_err(serde::de::Error::custom)
    }
}

/// Where a child slot came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOrigin {
    ParentA,
    ParentB,
    MutatedRot,
    MutatedPrimordial,
}

impl SlotOrigin {
    pub fn is_mutation(self) -> bool {
        matches!(self, SlotOrigin::MutatedRot | SlotOrigin::MutatedPrimordial)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreedingOutcome {
    pub genome: Genome,
    pub origins: [SlotOrigin; GENOME_LENGTH],
    pub base_stats: BaseStats,
}

impl BreedingOutcome {
    pub fn mutations(&self) -> usize {
        self.origins.iter().filter(|o| o.is_mutation()).count()
    }
}

/// Combine two parent genomes slot by slot.
///
/// Each slot mutates with 5% probability (90% of mutations become Rot, 10% Primordial);
/// otherwise the gene is inherited from either parent with equal probability.
pub fn breed<R: Rng + ?Sized>(a: &Genome, b: &Genome, rng: &mut R) -> BreedingOutcome {
    let mut slots = [Gene::Rot; GENOME_LENGTH];
    let mut origins = [SlotOrigin::ParentA; GENOME_LENGTH];
    for slot in 0..GENOME_LENGTH {
        let (gene, origin) = if rng.gen_range(0..ROLL_DENOMINATOR) < MUTATION_CHANCE_BPS {
            if rng.gen_range(0..ROLL_DENOMINATOR) < PRIMORDIAL_MUTATION_BPS {
                (Gene::Primordial, SlotOrigin::MutatedPrimordial)
            } else {
                (Gene::Rot, SlotOrigin::MutatedRot)
            }
        } else if rng.gen_bool(0.5) {
            (a.0[slot], SlotOrigin::ParentA)
        } else {
            (b.0[slot], SlotOrigin::ParentB)
        };
        slots[slot] = gene;
        origins[slot] = origin;
    }
    let genome = Genome(slots);
    BreedingOutcome {
        genome,
        origins,
        base_stats: genome.base_stats(),
    }
}

/// One stochastic draw for a live "projected outcome" view.
pub fn preview_breed(a: &Genome, b: &Genome) -> BreedingOutcome {
    breed(a, b, &mut rand::thread_rng())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreedStability {
    Stable,
    Volatile,
    Chaotic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StabilityReport {
    pub agreeing_slots: usize,
    pub percent: u32,
    pub stability: BreedStability,
}

/// How predictable a pairing is: the share of slots where both parents carry the same gene.
pub fn breed_stability(a: &Genome, b: &Genome) -> StabilityReport {
    let agreeing_slots = a.0.iter().zip(b.0.iter()).filter(|(x, y)| x == y).count();
    // Round half up.
    let percent = ((agreeing_slots * 100 + GENOME_LENGTH / 2) / GENOME_LENGTH) as u32;
    let stability = if percent > STABLE_BREED_PCT {
        BreedStability::Stable
    } else if percent > VOLATILE_BREED_PCT {
        BreedStability::Volatile
    } else {
        BreedStability::Chaotic
    };
    StabilityReport {
        agreeing_slots,
        percent,
        stability,
    }
}
