use crate::{ContractGateway, Result};
use spore_types::{game::dominance_percent, Amount};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Default cap on pages read for one profile.
pub const DEFAULT_MAX_PAGES: usize = 200;

/// How the aggregate picks its best token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BestToken {
    /// Take the best id from the first page that reports one. Cheap, but only correct when
    /// the contract places the global best on that page.
    #[default]
    FirstReported,
    /// Look up each page's best token and keep the one with the most shares.
    CompareAcrossPages,
}

/// A player's whole-collection view, rebuilt from paginated contract reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerProfile {
    pub total_mushrooms: u64,
    pub total_shares: Amount,
    pub total_pending_rewards: Amount,
    pub best_mushroom_id: Option<String>,
    pub pages_read: usize,
    /// Set when the walk stopped on the page cap or a repeated cursor.
    pub truncated: bool,
}

impl PlayerProfile {
    pub fn dominance(&self, global_total_shares: Amount) -> f64 {
        dominance_percent(self.total_shares, global_total_shares)
    }
}

pub struct ProfileAggregator {
    gateway: ContractGateway,
    page_size: u32,
    max_pages: usize,
    best: BestToken,
}

impl ProfileAggregator {
    pub fn new(gateway: ContractGateway) -> Self {
        let page_size = gateway.config().profile_page_size;
        Self {
            gateway,
            page_size,
            max_pages: DEFAULT_MAX_PAGES,
            best: BestToken::default(),
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_best_token(mut self, best: BestToken) -> Self {
        self.best = best;
        self
    }

    async fn shares_of(&self, token_id: &str) -> Result<Amount> {
        Ok(self
            .gateway
            .token_game_info(token_id)
            .await?
            .map(|info| info.current_shares)
            .unwrap_or(Amount::ZERO))
    }

    /// Walk every profile page for `address` and sum the results.
    pub async fn aggregate(&self, address: &str) -> Result<PlayerProfile> {
        let mut profile = PlayerProfile::default();
        let mut best_shares = Amount::ZERO;
        let mut cursors = HashSet::new();
        let mut start_after: Option<String> = None;

        loop {
            if profile.pages_read >= self.max_pages {
                warn!(address, pages = profile.pages_read, "profile page cap reached");
                profile.truncated = true;
                break;
            }
            let page = self
                .gateway
                .player_profile_page(address, start_after.take(), self.page_size)
                .await?;
            profile.pages_read += 1;
            if page.total_mushrooms == 0 {
                break;
            }

            profile.total_mushrooms = profile.total_mushrooms.saturating_add(page.total_mushrooms);
            profile.total_shares = profile.total_shares + page.total_shares;
            profile.total_pending_rewards =
                profile.total_pending_rewards + page.total_pending_rewards;

            if let Some(candidate) = page.best_mushroom_id {
                match self.best {
                    BestToken::FirstReported => {
                        profile.best_mushroom_id.get_or_insert(candidate);
                    }
                    BestToken::CompareAcrossPages => {
                        let shares = self.shares_of(&candidate).await?;
                        if profile.best_mushroom_id.is_none() || shares > best_shares {
                            best_shares = shares;
                            profile.best_mushroom_id = Some(candidate);
                        }
                    }
                }
            }

            match page.next_start_after {
                None => break,
                Some(next) if !cursors.insert(next.clone()) => {
                    warn!(address, cursor = next, "profile cursor repeated");
                    profile.truncated = true;
                    break;
                }
                Some(next) => start_after = Some(next),
            }
        }

        debug!(
            address,
            pages = profile.pages_read,
            mushrooms = profile.total_mushrooms,
            "aggregated profile"
        );
        Ok(profile)
    }
}
