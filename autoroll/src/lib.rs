//! Auto-mutator: spin one trait of one token through the delegated relay until the trait
//! reaches a target value or the attempt budget runs out.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use spore_client::{
    AppContext, AuthSession, ContractGateway, GameConfig, RandomnessClient, RelayWallet,
    SpinOrchestrator, SpinStage, Wallet,
};
use spore_types::{
    events::SpinOutcome,
    game::{Stat, MAX_VOLATILE, MIN_VOLATILE},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Delegated session obtained beforehand through the auth flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub address: String,
    pub bearer_token: String,
    /// Unix seconds.
    pub token_expiry: u64,
    /// Unix seconds.
    pub grant_expiry: u64,
}

/// Configuration for an autoroll run (from config file)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub game: GameConfig,
    pub session: SessionConfig,
    pub token_id: String,
    pub target: Stat,
    pub stop_at: i8,
    pub max_attempts: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_VOLATILE..=MAX_VOLATILE).contains(&self.stop_at) {
            bail!(
                "stop_at must be within {MIN_VOLATILE}..={MAX_VOLATILE}, got {}",
                self.stop_at
            );
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be > 0");
        }
        self.game.validate().context("invalid game config")?;
        Ok(())
    }
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The target trait meets the stop value.
    Reached,
    /// The attempt budget is spent.
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Spin,
    Stop(StopReason),
}

/// Next step given the trait's current value and the attempts made so far.
pub fn decide(current: i8, stop_at: i8, attempts: u32, max_attempts: u32) -> Decision {
    if current >= stop_at {
        Decision::Stop(StopReason::Reached)
    } else if attempts >= max_attempts {
        Decision::Stop(StopReason::Exhausted)
    } else {
        Decision::Spin
    }
}

/// Log label for a resolved spin.
pub fn outcome_label(outcome: SpinOutcome) -> &'static str {
    match outcome {
        SpinOutcome::Improved => "SUCCESS",
        SpinOutcome::Worsened => "FAILED",
        SpinOutcome::Unchanged => "NEUTRAL",
    }
}

/// Totals for a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub reason: StopReason,
    pub attempts: u32,
    pub improved: u32,
    pub worsened: u32,
    pub unchanged: u32,
    pub final_value: i8,
}

/// Options for the spin loop, split from [`Config`] so tests can run it against any wallet.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub token_id: String,
    pub target: Stat,
    pub stop_at: i8,
    pub max_attempts: u32,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            token_id: config.token_id.clone(),
            target: config.target,
            stop_at: config.stop_at,
            max_attempts: config.max_attempts,
        }
    }
}

pub struct Engine<W: Wallet> {
    config: EngineConfig,
    context: Arc<AppContext>,
    orchestrator: SpinOrchestrator<W>,
}

impl Engine<RelayWallet> {
    /// Wire the relay wallet, gateway and beacon client from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let context = Arc::new(AppContext::new());
        context.set_wallet(config.session.address.clone());
        context.session_store().set(AuthSession {
            enabled: true,
            token: Some(config.session.bearer_token.clone()),
            token_expiry: config.session.token_expiry,
            grant_expiry: config.session.grant_expiry,
        });

        let game = Arc::new(config.game.clone());
        let wallet = RelayWallet::new(
            &game.relay_url,
            config.session.address.clone(),
            game.network.clone(),
            context.session_store().clone(),
        )
        .context("failed to create relay wallet")?;
        let gateway = ContractGateway::new(game.clone()).context("failed to create gateway")?;
        let randomness =
            RandomnessClient::new(&game.beacon).context("failed to create beacon client")?;
        let orchestrator =
            SpinOrchestrator::new(wallet, gateway, randomness).with_context(context.clone());
        Ok(Self::new(config.into(), context, orchestrator))
    }
}

impl<W: Wallet> Engine<W> {
    pub fn new(
        config: EngineConfig,
        context: Arc<AppContext>,
        orchestrator: SpinOrchestrator<W>,
    ) -> Self {
        Self {
            config,
            context,
            orchestrator,
        }
    }

    /// Finish a spin left pending by an earlier run.
    async fn settle_pending(&self) -> Result<()> {
        let token_id = &self.config.token_id;
        let stage = self
            .orchestrator
            .resume(token_id)
            .await
            .context("failed to read pending spin")?;
        if stage == SpinStage::Idle {
            return Ok(());
        }
        info!(token_id, %stage, "revealing spin left by a previous run");
        let resolved = self
            .orchestrator
            .reveal(token_id)
            .await
            .context("failed to reveal pending spin")?;
        info!(
            token_id,
            old = resolved.old_volatile,
            new = resolved.new_volatile,
            "settled pending spin"
        );
        Ok(())
    }

    pub async fn run(&self) -> Result<Summary> {
        let EngineConfig {
            token_id,
            target,
            stop_at,
            max_attempts,
        } = &self.config;
        if !self.context.session().is_active(spore_client::unix_now()) {
            bail!("delegated session is not active; enable auto-sign first");
        }
        info!(token_id, trait_target = %target, stop_at, max_attempts, "Starting autoroll");
        self.settle_pending().await?;

        let mut summary = Summary {
            reason: StopReason::Exhausted,
            attempts: 0,
            improved: 0,
            worsened: 0,
            unchanged: 0,
            final_value: 0,
        };
        loop {
            let creature = self
                .orchestrator
                .gateway()
                .creature(token_id)
                .await
                .context("failed to read token")?;
            let current = creature.volatile(*target);
            summary.final_value = current;
            match decide(current, *stop_at, summary.attempts, *max_attempts) {
                Decision::Stop(reason) => {
                    summary.reason = reason;
                    break;
                }
                Decision::Spin => {}
            }

            summary.attempts += 1;
            let attempt = summary.attempts;
            match self
                .orchestrator
                .spin(token_id, *target, creature.substrate)
                .await
            {
                Ok(resolved) => {
                    let outcome = resolved.outcome();
                    match outcome {
                        SpinOutcome::Improved => summary.improved += 1,
                        SpinOutcome::Worsened => summary.worsened += 1,
                        SpinOutcome::Unchanged => summary.unchanged += 1,
                    }
                    info!(
                        attempt,
                        old = resolved.old_volatile,
                        new = resolved.new_volatile,
                        "{}",
                        outcome_label(outcome)
                    );
                }
                Err(err) if err.is_transient() => {
                    warn!(attempt, ?err, "spin failed; retrying");
                    self.settle_pending().await?;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("spin attempt {attempt} failed"));
                }
            }
        }

        info!(
            reason = ?summary.reason,
            attempts = summary.attempts,
            value = summary.final_value,
            "Autoroll finished"
        );
        Ok(summary)
    }
}
