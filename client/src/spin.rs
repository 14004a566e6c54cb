//! Commit/reveal spin protocol.
//!
//! A spin is committed on-chain with payment and bound to a future beacon round. Once that
//! round is published, the beacon is pushed to the oracle and the spin is resolved in one
//! atomic batch. Sessions live in memory only; [`SpinOrchestrator::resume`] rebuilds them
//! from the contract's pending-spin status after a restart.

use crate::{
    beacon::Beacon, wallet::check_tx, AppContext, ContractGateway, Error, RandomnessClient, Result,
    Wallet,
};
use spore_types::{
    events::{ContractEvent, SpinRequested, SpinResolved},
    game::Stat,
};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpinStage {
    Idle,
    Requesting,
    WaitingBeacon,
    ReadyToReveal,
    Resolving,
}

impl SpinStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SpinStage::Idle => "idle",
            SpinStage::Requesting => "requesting",
            SpinStage::WaitingBeacon => "waiting_beacon",
            SpinStage::ReadyToReveal => "ready_to_reveal",
            SpinStage::Resolving => "resolving",
        }
    }
}

impl fmt::Display for SpinStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight spin for one token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinSession {
    pub token_id: String,
    /// Unknown when the session was rebuilt from a contract that does not report it.
    pub target: Option<Stat>,
    /// Unknown only while the request is being submitted.
    pub round: Option<u64>,
    pub stage: SpinStage,
    pub beacon: Option<Beacon>,
}

impl SpinSession {
    fn requesting(token_id: &str, target: Stat) -> Self {
        Self {
            token_id: token_id.to_string(),
            target: Some(target),
            round: None,
            stage: SpinStage::Requesting,
            beacon: None,
        }
    }

    fn waiting(token_id: &str, target: Option<Stat>, round: u64) -> Self {
        Self {
            token_id: token_id.to_string(),
            target,
            round: Some(round),
            stage: SpinStage::WaitingBeacon,
            beacon: None,
        }
    }
}

/// Drives spins for any number of tokens; at most one session per token.
pub struct SpinOrchestrator<W: Wallet> {
    wallet: W,
    gateway: ContractGateway,
    randomness: RandomnessClient,
    sessions: Mutex<HashMap<String, SpinSession>>,
    context: Option<Arc<AppContext>>,
}

impl<W: Wallet> SpinOrchestrator<W> {
    pub fn new(wallet: W, gateway: ContractGateway, randomness: RandomnessClient) -> Self {
        Self {
            wallet,
            gateway,
            randomness,
            sessions: Mutex::new(HashMap::new()),
            context: None,
        }
    }

    /// Fire `context`'s refresh signal after every committed request and resolved spin.
    pub fn with_context(mut self, context: Arc<AppContext>) -> Self {
        self.context = Some(context);
        self
    }

    fn refreshed(&self) {
        if let Some(context) = &self.context {
            context.trigger_refresh();
        }
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SpinSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self, token_id: &str) -> Option<SpinSession> {
        self.sessions().get(token_id).cloned()
    }

    pub fn stage(&self, token_id: &str) -> SpinStage {
        self.sessions()
            .get(token_id)
            .map(|session| session.stage)
            .unwrap_or(SpinStage::Idle)
    }

    /// Drop the local session. Cancels nothing on-chain.
    pub fn abandon(&self, token_id: &str) {
        if self.sessions().remove(token_id).is_some() {
            debug!(token_id, "spin session abandoned");
        }
    }

    fn fail<T>(&self, token_id: &str, stage: SpinStage, err: Error) -> Result<T> {
        self.sessions().remove(token_id);
        warn!(token_id, %stage, kind = ?err.kind(), ?err, "spin aborted");
        Err(err)
    }

    /// Commit a spin for `token_id`, paying the cost for `substrate`.
    ///
    /// Rejected without broadcasting when the token already has a session.
    pub async fn request_spin(
        &self,
        token_id: &str,
        target: Stat,
        substrate: u8,
    ) -> Result<SpinRequested> {
        {
            let mut sessions = self.sessions();
            if let Some(existing) = sessions.get(token_id) {
                return Err(Error::SpinInProgress {
                    token_id: token_id.to_string(),
                    stage: existing.stage,
                });
            }
            sessions.insert(token_id.to_string(), SpinSession::requesting(token_id, target));
        }
        let stage = SpinStage::Requesting;

        let msg = match self
            .gateway
            .spin_msg(self.wallet.address(), token_id, target, substrate)
        {
            Ok(msg) => msg,
            Err(err) => return self.fail(token_id, stage, err),
        };
        let tx = match self.wallet.broadcast(vec![msg]).await.and_then(check_tx) {
            Ok(tx) => tx,
            Err(err) => return self.fail(token_id, stage, err),
        };
        let requested = match SpinRequested::find(&tx) {
            Ok(event) if event.token_id == token_id => event,
            Ok(event) => {
                let err = Error::UnexpectedResponse(format!(
                    "spin requested for token {} instead of {token_id}",
                    event.token_id
                ));
                return self.fail(token_id, stage, err);
            }
            Err(err) => {
                error!(token_id, txhash = tx.txhash, ?err, "undecodable spin request");
                return self.fail(token_id, stage, err.into());
            }
        };

        self.sessions().insert(
            token_id.to_string(),
            SpinSession::waiting(token_id, Some(requested.trait_target), requested.target_round),
        );
        info!(
            token_id,
            round = requested.target_round,
            trait_target = %requested.trait_target,
            txhash = tx.txhash,
            expected_at = self.randomness.expected_emission(requested.target_round),
            "spin requested"
        );
        self.refreshed();
        Ok(requested)
    }

    /// Wait (bounded) for the session's beacon and move to `ready_to_reveal`.
    pub async fn await_beacon(&self, token_id: &str) -> Result<Beacon> {
        let round = {
            let sessions = self.sessions();
            let session = sessions
                .get(token_id)
                .ok_or_else(|| Error::NoPendingSpin(token_id.to_string()))?;
            match (session.stage, &session.beacon, session.round) {
                (SpinStage::ReadyToReveal, Some(beacon), _) => return Ok(beacon.clone()),
                (SpinStage::WaitingBeacon, _, Some(round)) => round,
                (stage, _, _) => {
                    return Err(Error::SpinInProgress {
                        token_id: token_id.to_string(),
                        stage,
                    })
                }
            }
        };

        let beacon = match self.randomness.wait_for_round(round).await {
            Ok(beacon) => beacon,
            Err(err) => return self.fail(token_id, SpinStage::WaitingBeacon, err),
        };
        if let Some(session) = self.sessions().get_mut(token_id) {
            if session.stage == SpinStage::WaitingBeacon && session.round == Some(round) {
                session.stage = SpinStage::ReadyToReveal;
                session.beacon = Some(beacon.clone());
            }
        }
        debug!(token_id, round, "ready to reveal");
        Ok(beacon)
    }

    /// Rebuild a session from the contract when none is held locally.
    async fn adopt_pending(&self, token_id: &str) -> Result<()> {
        if self.sessions().contains_key(token_id) {
            return Ok(());
        }
        let status = self.gateway.pending_spin(token_id).await?;
        let round = status
            .pending_round()
            .ok_or_else(|| Error::NoPendingSpin(token_id.to_string()))?;
        self.sessions()
            .entry(token_id.to_string())
            .or_insert_with(|| SpinSession::waiting(token_id, status.trait_target, round));
        debug!(token_id, round, "adopted pending spin");
        Ok(())
    }

    /// Publish the beacon and resolve the spin in one batch, oracle first.
    ///
    /// Safe to call again after a failure: without a local session the pending spin is
    /// re-read from the contract.
    pub async fn reveal(&self, token_id: &str) -> Result<SpinResolved> {
        self.adopt_pending(token_id).await?;
        self.await_beacon(token_id).await?;

        let beacon = {
            let mut sessions = self.sessions();
            let session = sessions
                .get_mut(token_id)
                .ok_or_else(|| Error::NoPendingSpin(token_id.to_string()))?;
            match (session.stage, session.beacon.clone()) {
                (SpinStage::ReadyToReveal, Some(beacon)) => {
                    session.stage = SpinStage::Resolving;
                    beacon
                }
                (stage, _) => {
                    return Err(Error::SpinInProgress {
                        token_id: token_id.to_string(),
                        stage,
                    })
                }
            }
        };
        let stage = SpinStage::Resolving;

        let msgs = match self
            .gateway
            .resolve_msgs(self.wallet.address(), token_id, &beacon)
        {
            Ok(msgs) => msgs,
            Err(err) => return self.fail(token_id, stage, err),
        };
        let tx = match self.wallet.broadcast(msgs).await.and_then(check_tx) {
            Ok(tx) => tx,
            Err(err) => return self.fail(token_id, stage, err),
        };
        self.sessions().remove(token_id);
        self.refreshed();

        let resolved = SpinResolved::find(&tx).map_err(|err| {
            error!(token_id, txhash = tx.txhash, ?err, "undecodable spin result");
            Error::from(err)
        })?;
        info!(
            token_id,
            round = beacon.round,
            trait_target = %resolved.trait_target,
            success = resolved.success,
            old = resolved.old_volatile,
            new = resolved.new_volatile,
            "spin resolved"
        );
        Ok(resolved)
    }

    /// Rebuild local state for `token_id` from the contract, e.g. after a restart.
    pub async fn resume(&self, token_id: &str) -> Result<SpinStage> {
        if let Some(session) = self.session(token_id) {
            return Ok(session.stage);
        }
        let status = self.gateway.pending_spin(token_id).await?;
        let Some(round) = status.pending_round() else {
            return Ok(SpinStage::Idle);
        };
        let mut session = SpinSession::waiting(token_id, status.trait_target, round);
        match self.randomness.fetch(round).await {
            Ok(Some(beacon)) => {
                session.stage = SpinStage::ReadyToReveal;
                session.beacon = Some(beacon);
            }
            Ok(None) => {}
            Err(err) if err.is_transient() => {
                warn!(token_id, round, ?err, "beacon check failed during resume");
            }
            Err(err) => return Err(err),
        }
        let stage = session.stage;
        self.sessions()
            .entry(token_id.to_string())
            .or_insert(session);
        info!(token_id, round, %stage, "resumed pending spin");
        Ok(stage)
    }

    /// Request, wait and reveal in sequence.
    pub async fn spin(&self, token_id: &str, target: Stat, substrate: u8) -> Result<SpinResolved> {
        self.request_spin(token_id, target, substrate).await?;
        self.await_beacon(token_id).await?;
        self.reveal(token_id).await
    }
}
