use crate::{beacon::Beacon, config::GameConfig, Client, Error, Result};
use futures::future::try_join_all;
use serde::{de::DeserializeOwned, Serialize};
use spore_types::{
    game::{Creature, EcosystemMetrics, RewardInfo, Stat},
    msg::{
        Coin, Cw721ExecuteMsg, Cw721QueryMsg, ExecuteContract, ExecuteMsg, GameStats,
        GlobalStateResponse, MintPriceResponse, NftInfoResponse, OperatorResponse,
        OracleExecuteMsg, PendingRewardsResponse, PendingSpinResponse, PlayerProfilePage,
        QueryMsg, TokenGameInfo, TokensResponse,
    },
    Amount, Msg,
};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Page size for owned-token listings.
pub const TOKENS_PAGE_LIMIT: u32 = 30;

/// Upper bound on owned-token pages walked by [`ContractGateway::all_owned_tokens`].
pub const MAX_TOKEN_PAGES: usize = 100;

/// Concurrent reads issued by [`ContractGateway::creatures`].
const CREATURE_BATCH_SIZE: usize = 10;

/// Stateless accessor for the game controller, NFT and oracle contracts.
///
/// Reads go through the chain REST gateway. Writes are only constructed here; signing and
/// broadcasting belong to a [`crate::Wallet`].
#[derive(Clone)]
pub struct ContractGateway {
    client: Client,
    config: Arc<GameConfig>,
}

impl ContractGateway {
    pub fn new(config: Arc<GameConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: Client::new(&config.chain_rest_url)?,
            config,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    async fn query_game<R: DeserializeOwned>(&self, query: &QueryMsg) -> Result<R> {
        self.client
            .query_smart(&self.config.game_controller, query)
            .await
    }

    async fn query_nft<R: DeserializeOwned>(&self, query: &Cw721QueryMsg) -> Result<R> {
        self.client.query_smart(&self.config.nft_contract, query).await
    }

    /// Current traits of `token_id`.
    pub async fn creature(&self, token_id: &str) -> Result<Creature> {
        let info: NftInfoResponse = self
            .query_nft(&Cw721QueryMsg::NftInfo {
                token_id: token_id.to_string(),
            })
            .await?;
        Ok(info.into_creature(token_id)?)
    }

    /// Traits of every token in `token_ids`, in order, read a batch at a time.
    pub async fn creatures(&self, token_ids: &[String]) -> Result<Vec<Creature>> {
        let mut creatures = Vec::with_capacity(token_ids.len());
        for chunk in token_ids.chunks(CREATURE_BATCH_SIZE) {
            let batch = try_join_all(chunk.iter().map(|id| self.creature(id))).await?;
            creatures.extend(batch);
        }
        Ok(creatures)
    }

    pub async fn ecosystem_metrics(&self) -> Result<EcosystemMetrics> {
        self.query_game(&QueryMsg::GetEcosystemMetrics {}).await
    }

    pub async fn pending_rewards(&self, token_id: &str) -> Result<RewardInfo> {
        let response: PendingRewardsResponse = self
            .query_game(&QueryMsg::GetPendingRewards {
                token_id: token_id.to_string(),
            })
            .await?;
        Ok(response.into())
    }

    pub async fn global_state(&self) -> Result<GlobalStateResponse> {
        self.query_game(&QueryMsg::GlobalState {}).await
    }

    pub async fn pending_spin(&self, token_id: &str) -> Result<PendingSpinResponse> {
        self.query_game(&QueryMsg::GetPendingSpin {
            token_id: token_id.to_string(),
        })
        .await
    }

    pub async fn player_profile_page(
        &self,
        address: &str,
        start_after: Option<String>,
        limit: u32,
    ) -> Result<PlayerProfilePage> {
        self.query_game(&QueryMsg::GetPlayerProfile {
            address: address.to_string(),
            start_after,
            limit: Some(limit),
        })
        .await
    }

    /// Current bonding-curve mint price.
    pub async fn mint_price(&self) -> Result<Amount> {
        let response: MintPriceResponse = self.query_game(&QueryMsg::GetCurrentPrice {}).await?;
        Ok(response.price)
    }

    pub async fn game_stats(&self) -> Result<GameStats> {
        self.query_game(&QueryMsg::GetGameStats {}).await
    }

    /// Reward bookkeeping for `token_id`; `None` until the token has interacted with the game.
    pub async fn token_game_info(&self, token_id: &str) -> Result<Option<TokenGameInfo>> {
        self.query_game(&QueryMsg::TokenInfo {
            token_id: token_id.to_string(),
        })
        .await
    }

    /// One page of tokens held by `owner`.
    pub async fn owned_tokens(
        &self,
        owner: &str,
        start_after: Option<String>,
        limit: u32,
    ) -> Result<Vec<String>> {
        let response: TokensResponse = self
            .query_nft(&Cw721QueryMsg::Tokens {
                owner: owner.to_string(),
                start_after,
                limit: Some(limit),
            })
            .await?;
        Ok(response.tokens)
    }

    /// Every token held by `owner`, walking pages until a short page or a repeated cursor.
    pub async fn all_owned_tokens(&self, owner: &str) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        let mut seen = HashSet::new();
        let mut start_after = None;
        for page in 0..MAX_TOKEN_PAGES {
            let batch = self
                .owned_tokens(owner, start_after.clone(), TOKENS_PAGE_LIMIT)
                .await?;
            let full = batch.len() as u32 >= TOKENS_PAGE_LIMIT;
            let last = batch.last().cloned();
            tokens.extend(batch.into_iter().filter(|id| seen.insert(id.clone())));
            match last {
                Some(cursor) if full && start_after.as_ref() != Some(&cursor) => {
                    start_after = Some(cursor);
                }
                _ => {
                    debug!(owner, page, count = tokens.len(), "listed owned tokens");
                    return Ok(tokens);
                }
            }
        }
        Ok(tokens)
    }

    /// Whether `operator` may move every token held by `owner`.
    pub async fn is_approved_for_all(&self, owner: &str, operator: &str) -> Result<bool> {
        let response: Option<OperatorResponse> = self
            .query_nft(&Cw721QueryMsg::Operator {
                owner: owner.to_string(),
                operator: operator.to_string(),
                include_expired: false,
            })
            .await?;
        Ok(response.is_some_and(|r| r.is_approved()))
    }

    fn execute<M: Serialize>(
        &self,
        sender: &str,
        contract: &str,
        msg: &M,
        funds: Vec<Coin>,
    ) -> Result<Msg> {
        Ok(ExecuteContract::new(sender, contract, msg, funds)?.into())
    }

    fn payment(&self, amount: Amount) -> Vec<Coin> {
        vec![Coin::new(self.config.payment_denom.clone(), amount)]
    }

    pub fn mint_msg(&self, sender: &str, price: Amount) -> Result<Msg> {
        self.execute(
            sender,
            &self.config.game_controller,
            &ExecuteMsg::Mint {},
            self.payment(price),
        )
    }

    /// `count` mint messages, each paying `price`.
    pub fn batch_mint_msgs(&self, sender: &str, count: usize, price: Amount) -> Result<Vec<Msg>> {
        (0..count).map(|_| self.mint_msg(sender, price)).collect()
    }

    /// Batch mint priced from the bonding curve, falling back to the configured mint cost
    /// when the price query is not supported.
    pub async fn priced_batch_mint_msgs(&self, sender: &str, count: usize) -> Result<Vec<Msg>> {
        let price = match self.mint_price().await {
            Ok(price) => price,
            Err(Error::ContractRejected(message)) => {
                debug!(%message, "mint price unavailable; using configured cost");
                self.config.mint_cost
            }
            Err(err) => return Err(err),
        };
        self.batch_mint_msgs(sender, count, price)
    }

    /// Spin request paying the cost for `substrate`.
    pub fn spin_msg(
        &self,
        sender: &str,
        token_id: &str,
        target: Stat,
        substrate: u8,
    ) -> Result<Msg> {
        let cost = spore_types::game::spin_cost(self.config.spin_cost, substrate);
        self.execute(
            sender,
            &self.config.game_controller,
            &ExecuteMsg::Spin {
                token_id: token_id.to_string(),
                trait_target: target,
            },
            self.payment(cost),
        )
    }

    /// The reveal batch: publish the beacon to the oracle, then resolve the spin. The order is
    /// load-bearing because resolution reads the oracle.
    pub fn resolve_msgs(&self, sender: &str, token_id: &str, beacon: &Beacon) -> Result<Vec<Msg>> {
        Ok(vec![
            self.execute(
                sender,
                &self.config.oracle_contract,
                &OracleExecuteMsg::AddBeacon {
                    round: beacon.round,
                    signature: beacon.signature.clone(),
                    randomness: beacon.randomness.clone(),
                },
                vec![],
            )?,
            self.execute(
                sender,
                &self.config.game_controller,
                &ExecuteMsg::ResolveSpin {
                    token_id: token_id.to_string(),
                },
                vec![],
            )?,
        ])
    }

    pub fn harvest_msg(&self, sender: &str, token_id: &str) -> Result<Msg> {
        self.execute(
            sender,
            &self.config.game_controller,
            &ExecuteMsg::Harvest {
                token_id: token_id.to_string(),
            },
            vec![],
        )
    }

    pub fn ascend_msg(&self, sender: &str, token_id: &str) -> Result<Msg> {
        self.execute(
            sender,
            &self.config.game_controller,
            &ExecuteMsg::Ascend {
                token_id: token_id.to_string(),
            },
            vec![],
        )
    }

    pub fn splice_msg(&self, sender: &str, parent_1_id: &str, parent_2_id: &str) -> Result<Msg> {
        self.execute(
            sender,
            &self.config.game_controller,
            &ExecuteMsg::Splice {
                parent_1_id: parent_1_id.to_string(),
                parent_2_id: parent_2_id.to_string(),
            },
            vec![],
        )
    }

    /// Approve `operator` (normally the game controller) for every token of `sender`.
    pub fn approve_all_msg(&self, sender: &str, operator: &str) -> Result<Msg> {
        self.execute(
            sender,
            &self.config.nft_contract,
            &Cw721ExecuteMsg::ApproveAll {
                operator: operator.to_string(),
                expires: None,
            },
            vec![],
        )
    }
}
