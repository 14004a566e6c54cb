use ethers::types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{
    Creature, Stat, FULL_PAYOUT_THRESHOLD, MAX_SUBSTRATE, RANK_A_SHARES, RANK_B_SHARES,
    RANK_C_SHARES, RANK_D_SHARES, RANK_S_SHARES, SHADOW_ZONE_THRESHOLD, SPIN_COST_MULTIPLIERS,
};
use crate::{amount::BASIS_POINTS, Amount};

/// `max(1, cap_total + stem_total + spores_total)`.
pub fn raw_power(cap_total: i32, stem_total: i32, spores_total: i32) -> u32 {
    let sum = cap_total
        .saturating_add(stem_total)
        .saturating_add(spores_total);
    sum.max(1) as u32
}

/// `raw_power^2 * (1 + substrate)`. Quadratic so concentrated power outweighs spread.
pub fn shares(raw_power: u32, substrate: u8) -> u128 {
    let raw = u128::from(raw_power);
    raw * raw * (1 + u128::from(substrate))
}

/// Share of the global pool held, as a percentage. An empty pool reports 100%.
pub fn dominance_percent(my_shares: Amount, global_total_shares: Amount) -> f64 {
    if global_total_shares.is_zero() {
        return 100.0;
    }
    // Scaled by 1e5 so three decimals survive the integer division.
    let scaled = my_shares.0.saturating_mul(U256::from(10_000_000u64)) / global_total_shares.0;
    let scaled = scaled.min(U256::from(u64::MAX)).low_u64();
    scaled as f64 / 100_000.0
}

/// Spin payment for a substrate tier; tiers above the table clamp to the top multiplier.
pub fn spin_cost(base_cost: Amount, substrate: u8) -> Amount {
    let tier = usize::from(substrate.min(MAX_SUBSTRATE));
    base_cost.saturating_mul(SPIN_COST_MULTIPLIERS[tier])
}

/// Ecosystem multiplier decoded from a contract decimal string such as `"0.75"`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Multiplier(f64);

impl Multiplier {
    pub const NEUTRAL: Multiplier = Multiplier(1.0);

    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn weather(self) -> Weather {
        Weather::classify(self.0)
    }

    pub fn as_bps(self) -> u64 {
        (self.0 * BASIS_POINTS as f64).round() as u64
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }
        let value = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid multiplier: {text:?}")))?,
            Raw::Number(value) => value,
        };
        Multiplier::new(value)
            .ok_or_else(|| de::Error::custom(format!("multiplier out of range: {value}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Weather {
    /// Multiplier >= 1.0.
    Clear,
    /// Multiplier in [0.8, 1.0): payout reduced but non-zero.
    Reduced,
    /// Multiplier < 0.8: payout forced to zero.
    ShadowZone,
}

impl Weather {
    pub fn classify(multiplier: f64) -> Weather {
        if multiplier.is_nan() || multiplier < SHADOW_ZONE_THRESHOLD {
            Weather::ShadowZone
        } else if multiplier < FULL_PAYOUT_THRESHOLD {
            Weather::Reduced
        } else {
            Weather::Clear
        }
    }
}

/// Post-weather payout as the client projects it.
pub fn project_payout(accumulated: Amount, multiplier: Multiplier) -> Amount {
    match multiplier.weather() {
        Weather::ShadowZone => Amount::ZERO,
        Weather::Reduced | Weather::Clear => accumulated.mul_bps(multiplier.as_bps()),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalBiomass {
    pub total_base_cap: Amount,
    pub total_base_stem: Amount,
    pub total_base_spores: Amount,
}

/// Per-stat "weather" read from the game controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EcosystemMetrics {
    #[serde(default)]
    pub total_biomass: TotalBiomass,
    pub cap_multiplier: Multiplier,
    pub stem_multiplier: Multiplier,
    pub spores_multiplier: Multiplier,
}

impl EcosystemMetrics {
    pub fn multiplier(&self, stat: Stat) -> Multiplier {
        match stat {
            Stat::Cap => self.cap_multiplier,
            Stat::Stem => self.stem_multiplier,
            Stat::Spores => self.spores_multiplier,
        }
    }

    pub fn weather(&self, stat: Stat) -> Weather {
        self.multiplier(stat).weather()
    }

    /// Lowest multiplier across the creature's dominant stat(s).
    pub fn effective_multiplier(&self, creature: &Creature) -> Multiplier {
        creature
            .dominant_stats()
            .into_iter()
            .map(|stat| self.multiplier(stat))
            .fold(None, |lowest: Option<Multiplier>, m| match lowest {
                Some(low) if low.value() <= m.value() => Some(low),
                _ => Some(m),
            })
            .unwrap_or_default()
    }

    pub fn creature_weather(&self, creature: &Creature) -> Weather {
        self.effective_multiplier(creature).weather()
    }
}

/// Accumulated (pre-weather) and payout (post-weather) rewards for one token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardInfo {
    pub accumulated: Amount,
    pub multiplier: Multiplier,
    pub payout: Amount,
}

impl RewardInfo {
    /// Payout is forced to zero in the Shadow Zone whatever the estimate says.
    pub fn new(accumulated: Amount, multiplier: Multiplier, payout: Amount) -> Self {
        let payout = match multiplier.weather() {
            Weather::ShadowZone => Amount::ZERO,
            _ => payout,
        };
        Self {
            accumulated,
            multiplier,
            payout,
        }
    }

    /// Rewards that match the client-side projection rather than a contract estimate.
    pub fn projected(accumulated: Amount, multiplier: Multiplier) -> Self {
        Self::new(
            accumulated,
            multiplier,
            project_payout(accumulated, multiplier),
        )
    }

    pub fn empty() -> Self {
        Self::new(Amount::ZERO, Multiplier::NEUTRAL, Amount::ZERO)
    }

    pub fn weather(&self) -> Weather {
        self.multiplier.weather()
    }

    pub fn is_shadow_zone(&self) -> bool {
        self.weather() == Weather::ShadowZone
    }

    /// `accumulated - payout`, never negative.
    pub fn forfeit(&self) -> Amount {
        self.accumulated.saturating_sub(self.payout)
    }
}

/// Accumulated rewards that splicing two parents would discard.
pub fn breeding_risk(parent_a: &RewardInfo, parent_b: Option<&RewardInfo>) -> Amount {
    let b = parent_b.map(|info| info.accumulated).unwrap_or(Amount::ZERO);
    parent_a.accumulated + b
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankTier {
    F,
    D,
    C,
    B,
    A,
    S,
}

impl RankTier {
    pub fn from_shares(shares: u128) -> Self {
        if shares > RANK_S_SHARES {
            RankTier::S
        } else if shares > RANK_A_SHARES {
            RankTier::A
        } else if shares > RANK_B_SHARES {
            RankTier::B
        } else if shares > RANK_C_SHARES {
            RankTier::C
        } else if shares > RANK_D_SHARES {
            RankTier::D
        } else {
            RankTier::F
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RankTier::S => "Apex",
            RankTier::A => "Warlord",
            RankTier::B => "Mystic",
            RankTier::C => "Hunter",
            RankTier::D => "Forager",
            RankTier::F => "Sporeling",
        }
    }
}
