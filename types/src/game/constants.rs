/// Number of gene slots in every genome.
pub const GENOME_LENGTH: usize = 8;

/// Highest valid gene id (Primordial).
pub const MAX_GENE_ID: u8 = 4;

/// Volatile traits live in `[-3, +3]`.
pub const MIN_VOLATILE: i8 = -3;
pub const MAX_VOLATILE: i8 = 3;

/// Base traits live in `[0, 10]`.
pub const MAX_BASE: u8 = 10;

/// Substrate (prestige) tiers live in `[0, 4]`.
pub const MAX_SUBSTRATE: u8 = 4;

/// Per-slot mutation chance during breeding, in basis points (5%).
pub const MUTATION_CHANCE_BPS: u32 = 500;

/// Share of mutations that become Primordial rather than Rot, in basis points (10%).
pub const PRIMORDIAL_MUTATION_BPS: u32 = 1_000;

/// Base-stat bonus indexed by the number of matching genome slots (0..=8).
pub const BASE_BONUS_BY_MATCHES: [u8; GENOME_LENGTH + 1] = [0, 0, 0, 1, 1, 3, 3, 6, 10];

/// Spin payment multiplier indexed by substrate tier.
pub const SPIN_COST_MULTIPLIERS: [u64; MAX_SUBSTRATE as usize + 1] = [1, 2, 3, 5, 10];

/// Display names indexed by substrate tier.
pub const SUBSTRATE_LEVEL_NAMES: [&str; MAX_SUBSTRATE as usize + 1] =
    ["None", "Novice", "Adept", "Expert", "Master"];

/// Multipliers strictly below this value place a stat in the Shadow Zone.
pub const SHADOW_ZONE_THRESHOLD: f64 = 0.8;

/// Multipliers at or above this value apply no penalty.
pub const FULL_PAYOUT_THRESHOLD: f64 = 1.0;

/// Breeding stability bands (percentage of agreeing parent slots).
pub const STABLE_BREED_PCT: u32 = 70;
pub const VOLATILE_BREED_PCT: u32 = 30;

/// Share thresholds for rank tiers (strictly greater than).
pub const RANK_S_SHARES: u128 = 700;
pub const RANK_A_SHARES: u128 = 500;
pub const RANK_B_SHARES: u128 = 300;
pub const RANK_C_SHARES: u128 = 150;
pub const RANK_D_SHARES: u128 = 50;
