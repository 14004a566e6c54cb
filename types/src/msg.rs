//! JSON shapes exchanged with the game controller, NFT and oracle contracts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

use crate::{
    game::{
        Creature, CreatureInvariantError, Genome, GenomeError, Multiplier,
        RewardInfo, Stat, TotalBiomass,
    },
    Amount,
};

/// Messages accepted by the game controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    Mint {},
    Spin { token_id: String, trait_target: Stat },
    ResolveSpin { token_id: String },
    Harvest { token_id: String },
    Ascend { token_id: String },
    Splice {
        parent_1_id: String,
        parent_2_id: String,
    },
}

/// Messages accepted by the randomness oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleExecuteMsg {
    AddBeacon {
        round: u64,
        /// Hex-encoded BLS signature.
        signature: String,
        /// Hex-encoded randomness.
        randomness: String,
    },
}

/// Messages accepted by the NFT contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cw721ExecuteMsg {
    ApproveAll {
        operator: String,
        /// Always serialized; `null` means the approval never expires.
        expires: Option<Value>,
    },
}

/// Queries answered by the game controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    GlobalState {},
    TokenInfo {
        token_id: String,
    },
    GetEcosystemMetrics {},
    GetPendingRewards {
        token_id: String,
    },
    GetPendingSpin {
        token_id: String,
    },
    GetPlayerProfile {
        address: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_after: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    GetCurrentPrice {},
    GetGameStats {},
}

/// Queries answered by the NFT contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cw721QueryMsg {
    NftInfo {
        token_id: String,
    },
    Tokens {
        owner: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_after: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    Operator {
        owner: String,
        operator: String,
        include_expired: bool,
    },
}

/// A native coin attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// A contract invocation ready for signing: `MsgExecuteContract` in chain terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteContract {
    pub sender: String,
    pub contract: String,
    pub msg: Value,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

impl ExecuteContract {
    pub fn new<M: Serialize>(
        sender: impl Into<String>,
        contract: impl Into<String>,
        msg: &M,
        funds: Vec<Coin>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            sender: sender.into(),
            contract: contract.into(),
            msg: serde_json::to_value(msg)?,
            funds,
        })
    }

    /// Name of the invoked entry point, e.g. `"spin"`.
    pub fn action(&self) -> Option<&str> {
        self.msg.as_object()?.keys().next().map(String::as_str)
    }
}

/// One page of a player's aggregate profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfilePage {
    pub total_mushrooms: u64,
    pub total_shares: Amount,
    pub total_pending_rewards: Amount,
    #[serde(default)]
    pub best_mushroom_id: Option<String>,
    /// Cursor for the next page; `None` on the last page.
    #[serde(default)]
    pub next_start_after: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStateResponse {
    pub total_shares: Amount,
    /// Fixed-point decimal kept as the contract renders it.
    pub global_reward_index: String,
    pub spin_nonce: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingRewardsResponse {
    pub accumulated_rewards: Amount,
    pub canopy_multiplier: Multiplier,
    pub estimated_payout: Amount,
}

impl From<PendingRewardsResponse> for RewardInfo {
    fn from(value: PendingRewardsResponse) -> Self {
        RewardInfo::new(
            value.accumulated_rewards,
            value.canopy_multiplier,
            value.estimated_payout,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSpinResponse {
    pub is_pending: bool,
    #[serde(default)]
    pub target_round: Option<u64>,
    #[serde(default)]
    pub trait_target: Option<Stat>,
}

impl PendingSpinResponse {
    /// The round a pending spin waits on. A pending spin without a round is unusable.
    pub fn pending_round(&self) -> Option<u64> {
        if self.is_pending {
            self.target_round
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPriceResponse {
    pub price: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    pub total_minted: u64,
    pub total_burned: u64,
    pub current_supply: u64,
    pub total_spins: u64,
    pub total_rewards_distributed: Amount,
    pub total_biomass: TotalBiomass,
}

/// Per-token reward bookkeeping held by the game controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGameInfo {
    pub current_shares: Amount,
    pub reward_debt: Amount,
    pub pending_rewards: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensResponse {
    pub tokens: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub spender: String,
    #[serde(default)]
    pub expires: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorResponse {
    #[serde(default)]
    pub approval: Option<Approval>,
}

impl OperatorResponse {
    pub fn is_approved(&self) -> bool {
        self.approval.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftExtension {
    #[serde(default)]
    pub attributes: Vec<NftAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftInfoResponse {
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub extension: NftExtension,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum CreatureDecodeError {
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("invalid attribute {key}: {value}")]
    InvalidAttribute { key: &'static str, value: String },
    #[error("invalid genome: {0}")]
    Genome(#[from] GenomeError),
    #[error("invariant violated: {0}")]
    Invariant(#[from] CreatureInvariantError),
}

impl NftInfoResponse {
    fn attribute(&self, key: &'static str) -> Option<String> {
        self.extension
            .attributes
            .iter()
            .find(|attr| attr.trait_type == key)
            .map(|attr| match &attr.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    fn required<T: std::str::FromStr>(&self, key: &'static str) -> Result<T, CreatureDecodeError> {
        let raw = self
            .attribute(key)
            .ok_or(CreatureDecodeError::MissingAttribute(key))?;
        raw.trim()
            .parse()
            .map_err(|_| CreatureDecodeError::InvalidAttribute { key, value: raw })
    }

    /// Decode the trait attributes into a [`Creature`].
    ///
    /// Every trait is required. Tokens minted before genetics carry no `genome` attribute and
    /// decode with an all-Rot genome.
    pub fn into_creature(self, token_id: impl Into<String>) -> Result<Creature, CreatureDecodeError> {
        let genome = match self.attribute("genome") {
            Some(raw) => Genome::parse(&raw)?,
            None => Genome::default(),
        };
        let creature = Creature {
            token_id: token_id.into(),
            cap: self.required("cap")?,
            stem: self.required("stem")?,
            spores: self.required("spores")?,
            substrate: self.required("substrate")?,
            base_cap: self.required("base_cap")?,
            base_stem: self.required("base_stem")?,
            base_spores: self.required("base_spores")?,
            genome,
        };
        creature.validate_invariants()?;
        Ok(creature)
    }
}
