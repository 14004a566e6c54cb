use crate::{
    backoff::{exponential, jittered_backoff},
    config::{BeaconConfig, BeaconPolicy},
    Client, Error, Result,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Length of the randomness digest published with each round.
pub const RANDOMNESS_LENGTH: usize = 32;

/// A public randomness beacon for one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub round: u64,
    /// Hex-encoded.
    pub randomness: String,
    /// Hex-encoded.
    pub signature: String,
}

impl Beacon {
    fn validate(&self, round: u64) -> Result<()> {
        let invalid = |reason: String| Error::InvalidBeacon { round, reason };
        if self.round != round {
            return Err(invalid(format!("got round {}", self.round)));
        }
        let randomness =
            hex::decode(&self.randomness).map_err(|err| invalid(format!("randomness: {err}")))?;
        if randomness.len() != RANDOMNESS_LENGTH {
            return Err(invalid(format!(
                "randomness is {} bytes (expected {RANDOMNESS_LENGTH})",
                randomness.len()
            )));
        }
        let signature =
            hex::decode(&self.signature).map_err(|err| invalid(format!("signature: {err}")))?;
        if signature.is_empty() {
            return Err(invalid("empty signature".to_string()));
        }
        Ok(())
    }
}

/// Fetches beacons by round. Stateless apart from its HTTP client.
#[derive(Clone)]
pub struct RandomnessClient {
    client: Client,
    chain_hash: String,
    genesis_time: u64,
    period_secs: u64,
    policy: BeaconPolicy,
}

impl RandomnessClient {
    pub fn new(config: &BeaconConfig) -> Result<Self> {
        if config.period_secs == 0 {
            return Err(Error::InvalidConfig("beacon period must be > 0".into()));
        }
        Ok(Self {
            client: Client::new(&config.url)?,
            chain_hash: config.chain_hash.clone(),
            genesis_time: config.genesis_time,
            period_secs: config.period_secs,
            policy: BeaconPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: BeaconPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Unix time at which `round` is scheduled to be emitted.
    pub fn expected_emission(&self, round: u64) -> u64 {
        self.genesis_time
            .saturating_add(round.saturating_sub(1).saturating_mul(self.period_secs))
    }

    /// Time left until `round` is emitted, zero if it should already exist.
    pub fn time_until(&self, round: u64, now: u64) -> Duration {
        Duration::from_secs(self.expected_emission(round).saturating_sub(now))
    }

    /// Latest round emitted at `now`.
    pub fn round_at(&self, now: u64) -> u64 {
        if now < self.genesis_time {
            return 0;
        }
        (now - self.genesis_time) / self.period_secs + 1
    }

    /// Fetch `round`. `Ok(None)` means the round has not been emitted yet.
    pub async fn fetch(&self, round: u64) -> Result<Option<Beacon>> {
        let url = self
            .client
            .base_url
            .join(&format!("{}/public/{round}", self.chain_hash))?;
        let response = self.client.get_with_retry(url.clone()).await?;
        match response.status() {
            // 425 Too Early is what some relays answer for future rounds.
            StatusCode::NOT_FOUND => return Ok(None),
            status if status.as_u16() == 425 => return Ok(None),
            status if !status.is_success() => {
                Client::ensure_success("GET", &url, response).await?;
                return Err(Error::Failed(status));
            }
            _ => {}
        }
        let beacon: Beacon = response.json().await?;
        beacon.validate(round)?;
        Ok(Some(beacon))
    }

    /// Poll until `round` is available, within the policy's attempt budget.
    pub async fn wait_for_round(&self, round: u64) -> Result<Beacon> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch(round).await {
                Ok(Some(beacon)) => {
                    debug!(round, attempt, "beacon available");
                    return Ok(beacon);
                }
                Ok(None) => {
                    debug!(round, attempt, "beacon not emitted yet");
                }
                Err(err) if err.is_transient() => {
                    warn!(round, attempt, ?err, "beacon fetch failed");
                }
                Err(err) => return Err(err),
            }
            if attempt < attempts {
                let backoff = exponential(
                    self.policy.initial_backoff,
                    self.policy.max_backoff,
                    attempt,
                );
                let delay = jittered_backoff(&mut rand::thread_rng(), backoff);
                tokio::time::sleep(delay).await;
            }
        }
        Err(Error::RandomnessNotReady { round, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{beacon_json, serve_router};
    use axum::{
        extract::{Path, State as AxumState},
        http::StatusCode as AxumStatusCode,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn policy(max_attempts: usize) -> BeaconPolicy {
        BeaconPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn beacon_client(base_url: &str) -> RandomnessClient {
        RandomnessClient::new(&BeaconConfig {
            url: base_url.to_string(),
            chain_hash: "abc".to_string(),
            genesis_time: 1_000,
            period_secs: 3,
        })
        .unwrap()
    }

    /// Serves `round` once `counter` reaches `ready_after`, 404 before that.
    fn delayed_router(ready_after: usize, counter: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/abc/public/:round",
                get(
                    move |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                          Path(round): Path<u64>| async move {
                        let seen = counter.fetch_add(1, Ordering::SeqCst);
                        if seen < ready_after {
                            AxumStatusCode::NOT_FOUND.into_response()
                        } else {
                            Json(beacon_json(round)).into_response()
                        }
                    },
                ),
            )
            .with_state(counter)
    }

    #[tokio::test]
    async fn test_fetch_missing_round_is_none() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (base_url, handle) = serve_router(delayed_router(usize::MAX, counter)).await;
        let client = beacon_client(&base_url);

        assert_eq!(client.fetch(42).await.unwrap(), None);

        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_round_retries_until_emitted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (base_url, handle) = serve_router(delayed_router(2, counter.clone())).await;
        let client = beacon_client(&base_url).with_policy(policy(5));

        let beacon = client.wait_for_round(7).await.unwrap();
        assert_eq!(beacon.round, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_round_is_bounded() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (base_url, handle) = serve_router(delayed_router(usize::MAX, counter.clone())).await;
        let client = beacon_client(&base_url).with_policy(policy(4));

        let err = client.wait_for_round(7).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RandomnessNotReady {
                round: 7,
                attempts: 4
            }
        ));
        assert!(err.is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        handle.abort();
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_retried_as_missing() {
        let router = Router::new().route(
            "/abc/public/:round",
            get(|| async { AxumStatusCode::BAD_REQUEST }),
        );
        let (base_url, handle) = serve_router(router).await;
        let client = beacon_client(&base_url).with_policy(policy(4));

        let err = client.wait_for_round(7).await.unwrap_err();
        assert!(matches!(err, Error::FailedWithBody { .. }));
        assert!(!err.is_transient());

        handle.abort();
    }

    #[tokio::test]
    async fn test_mismatched_round_is_rejected() {
        let router = Router::new().route(
            "/abc/public/:round",
            get(|| async { Json(beacon_json(99)) }),
        );
        let (base_url, handle) = serve_router(router).await;
        let client = beacon_client(&base_url);

        let err = client.fetch(7).await.unwrap_err();
        assert!(matches!(err, Error::InvalidBeacon { round: 7, .. }));

        handle.abort();
    }

    #[test]
    fn test_emission_schedule() {
        let client = beacon_client("http://localhost:1");
        assert_eq!(client.expected_emission(1), 1_000);
        assert_eq!(client.expected_emission(11), 1_030);
        assert_eq!(client.round_at(999), 0);
        assert_eq!(client.round_at(1_000), 1);
        assert_eq!(client.round_at(1_031), 11);
        assert_eq!(client.time_until(11, 1_020), Duration::from_secs(10));
        assert_eq!(client.time_until(11, 2_000), Duration::ZERO);
    }
}
