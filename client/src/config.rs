use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use spore_types::{authz::ContractGrant, msg::Coin, Amount};
use std::time::Duration;

/// drand quicknet, the chain the oracle contract verifies against.
pub const DEFAULT_BEACON_URL: &str = "https://api.drand.sh";
pub const DEFAULT_BEACON_CHAIN_HASH: &str =
    "52db9ba70e0cc0f6eaf7803dd07447a1f5477735fd3f661792ba94600c84e971";
pub const DEFAULT_BEACON_GENESIS_TIME: u64 = 1_692_803_367;
pub const DEFAULT_BEACON_PERIOD_SECS: u64 = 3;

pub const DEFAULT_PROFILE_PAGE_SIZE: u32 = 50;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 10_000;

/// Randomness beacon endpoint and schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default = "default_beacon_url")]
    pub url: String,
    #[serde(default = "default_chain_hash")]
    pub chain_hash: String,
    #[serde(default = "default_genesis_time")]
    pub genesis_time: u64,
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            url: default_beacon_url(),
            chain_hash: default_chain_hash(),
            genesis_time: DEFAULT_BEACON_GENESIS_TIME,
            period_secs: DEFAULT_BEACON_PERIOD_SECS,
        }
    }
}

fn default_beacon_url() -> String {
    DEFAULT_BEACON_URL.to_string()
}

fn default_chain_hash() -> String {
    DEFAULT_BEACON_CHAIN_HASH.to_string()
}

fn default_genesis_time() -> u64 {
    DEFAULT_BEACON_GENESIS_TIME
}

fn default_period_secs() -> u64 {
    DEFAULT_BEACON_PERIOD_SECS
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PROFILE_PAGE_SIZE
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

/// Deployment settings shared by every component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Chain REST (LCD) endpoint used for smart queries.
    pub chain_rest_url: String,
    /// Network name forwarded to the relay (`mainnet` or `testnet`).
    #[serde(default = "default_network")]
    pub network: String,
    pub game_controller: String,
    pub nft_contract: String,
    pub oracle_contract: String,
    pub payment_denom: String,
    /// Mint price in base units, used when the price query is unavailable.
    pub mint_cost: Amount,
    /// Spin cost for substrate 0, in base units.
    pub spin_cost: Amount,
    pub delegate_address: String,
    pub auth_url: String,
    pub relay_url: String,
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default = "default_page_size")]
    pub profile_page_size: u32,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
}

impl GameConfig {
    /// Default delegated-signing scope, with ceilings in the payment denom.
    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy::for_denom(&self.payment_denom)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("chain_rest_url", &self.chain_rest_url),
            ("game_controller", &self.game_controller),
            ("nft_contract", &self.nft_contract),
            ("oracle_contract", &self.oracle_contract),
            ("payment_denom", &self.payment_denom),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{name} is empty")));
            }
        }
        if self.profile_page_size == 0 {
            return Err(Error::InvalidConfig("profile_page_size must be > 0".into()));
        }
        if self.beacon.period_secs == 0 {
            return Err(Error::InvalidConfig("beacon.period_secs must be > 0".into()));
        }
        if self.polling_interval_ms == 0 {
            return Err(Error::InvalidConfig("polling_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Bounded polling schedule for beacon rounds.
#[derive(Clone, Debug)]
pub struct BeaconPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BeaconPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Limits for one contract in the delegated grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractLimit {
    pub calls: u64,
    pub denom: String,
    pub amount: Amount,
    pub accepted_messages: Vec<String>,
}

impl ContractLimit {
    pub fn to_grant(&self, contract: &str) -> ContractGrant {
        ContractGrant {
            contract: contract.to_string(),
            calls_remaining: self.calls,
            amounts: vec![Coin::new(self.denom.clone(), self.amount)],
            accepted_messages: self.accepted_messages.clone(),
        }
    }
}

/// Lifetimes and scope of a delegated signing session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthPolicy {
    pub grant_lifetime: Duration,
    pub token_lifetime: Duration,
    pub game_limit: ContractLimit,
    pub oracle_limit: ContractLimit,
}

impl AuthPolicy {
    /// 15 minute grant, 24 hour token, spend ceilings denominated in `denom`.
    pub fn for_denom(denom: &str) -> Self {
        Self {
            grant_lifetime: Duration::from_secs(15 * 60),
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            game_limit: ContractLimit {
                calls: 100_000,
                denom: denom.to_string(),
                // 50 whole tokens at 18 decimals
                amount: Amount::new(50_000_000_000_000_000_000),
                accepted_messages: vec![
                    "spin".to_string(),
                    "resolve_spin".to_string(),
                    "harvest".to_string(),
                ],
            },
            oracle_limit: ContractLimit {
                calls: 100_000,
                denom: denom.to_string(),
                amount: Amount::new(1_000),
                accepted_messages: vec!["add_beacon".to_string()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config: GameConfig = serde_json::from_value(serde_json::json!({
            "chain_rest_url": "https://testnet.lcd.injective.network",
            "game_controller": "inj1game",
            "nft_contract": "inj1nft",
            "oracle_contract": "inj1oracle",
            "payment_denom": "inj",
            "mint_cost": "1000000000000000000",
            "spin_cost": "100000000000000000",
            "delegate_address": "inj1delegate",
            "auth_url": "https://spore.example/api/auth",
            "relay_url": "https://spore.example/api/auto-sign"
        }))
        .unwrap();
        assert_eq!(config.network, "testnet");
        assert_eq!(config.beacon, BeaconConfig::default());
        assert_eq!(config.profile_page_size, 50);
        assert_eq!(config.polling_interval(), Duration::from_secs(10));
        assert_eq!(config.spin_cost, Amount::new(100_000_000_000_000_000));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_contract() {
        let mut config: GameConfig = serde_json::from_value(serde_json::json!({
            "chain_rest_url": "http://localhost:1317",
            "game_controller": "",
            "nft_contract": "inj1nft",
            "oracle_contract": "inj1oracle",
            "payment_denom": "inj",
            "mint_cost": "1",
            "spin_cost": "1",
            "delegate_address": "inj1delegate",
            "auth_url": "http://localhost/auth",
            "relay_url": "http://localhost/relay"
        }))
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.game_controller = "inj1game".into();
        config.profile_page_size = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_default_auth_policy_scope() {
        let policy = AuthPolicy::for_denom("inj");
        assert_eq!(policy.grant_lifetime, Duration::from_secs(900));
        assert_eq!(policy.token_lifetime, Duration::from_secs(86_400));
        let grant = policy.game_limit.to_grant("inj1game");
        assert_eq!(grant.contract, "inj1game");
        assert_eq!(grant.calls_remaining, 100_000);
        assert_eq!(
            grant.accepted_messages,
            vec!["spin", "resolve_spin", "harvest"]
        );
        assert_eq!(
            grant.amounts[0].amount.to_string(),
            "50000000000000000000"
        );
    }

    #[test]
    fn test_auth_policy_follows_payment_denom() {
        let config: GameConfig = serde_json::from_value(serde_json::json!({
            "chain_rest_url": "http://localhost:1317",
            "game_controller": "inj1game",
            "nft_contract": "inj1nft",
            "oracle_contract": "inj1oracle",
            "payment_denom": "peggy0xdAC17F958D2ee523a2206206994597C13D831ec7",
            "mint_cost": "1",
            "spin_cost": "1",
            "delegate_address": "inj1delegate",
            "auth_url": "http://localhost/auth",
            "relay_url": "http://localhost/relay"
        }))
        .unwrap();
        let policy = config.auth_policy();
        for limit in [&policy.game_limit, &policy.oracle_limit] {
            let grant = limit.to_grant("inj1game");
            assert_eq!(grant.amounts[0].denom, config.payment_denom);
        }
    }
}
