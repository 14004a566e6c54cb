pub mod auth;
mod backoff;
pub mod beacon;
pub mod client;
pub mod config;
pub mod context;
pub mod gateway;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod profile;
pub mod refresh;
pub mod relay;
pub mod spin;
pub mod wallet;

pub use auth::{AuthSession, AuthSessionManager, SessionStore};
pub use beacon::{Beacon, RandomnessClient};
pub use client::Client;
pub use client::RetryPolicy;
pub use config::{AuthPolicy, BeaconConfig, BeaconPolicy, GameConfig};
pub use context::AppContext;
pub use gateway::ContractGateway;
pub use profile::{BestToken, PlayerProfile, ProfileAggregator};
pub use refresh::{RefreshReason, RefreshSubscription};
pub use relay::RelayWallet;
pub use spin::{SpinOrchestrator, SpinSession, SpinStage};
pub use wallet::{ArbitrarySignature, Wallet};

use spore_types::{events::EventError, msg::CreatureDecodeError};
use thiserror::Error;

/// How a failure should be handled by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying with backoff (beacon not emitted yet, RPC hiccup).
    Transient,
    /// The user declined to sign. Abort without retrying.
    UserRejected,
    /// The contract (or a collaborator acting for it) refused the request.
    ContractRejected,
    /// A broken assumption: malformed response, missing event attribute, bad config.
    Invariant,
}

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    ContractRejected(String),
    #[error("request rejected by user: {0}")]
    UserRejected(String),
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    #[error("randomness for round {round} not ready after {attempts} attempts")]
    RandomnessNotReady { round: u64, attempts: usize },
    #[error("invalid beacon for round {round}: {reason}")]
    InvalidBeacon { round: u64, reason: String },
    #[error("spin already in progress for token {token_id} ({stage})")]
    SpinInProgress { token_id: String, stage: SpinStage },
    #[error("no pending spin for token {0}")]
    NoPendingSpin(String),
    #[error("auth exchange rejected: {0}")]
    AuthRejected(String),
    #[error("delegated session is not active")]
    SessionInactive,
    #[error("delegated grant expired or missing")]
    GrantExpired,
    #[error("message cannot be relayed: {0}")]
    NotRelayable(&'static str),
    #[error("malformed event: {0}")]
    Event(#[from] EventError),
    #[error("malformed token: {0}")]
    Creature(#[from] CreatureDecodeError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Reqwest(err) => {
                if err.is_timeout() || err.is_connect() || err.is_request() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Invariant
                }
            }
            Error::Failed(status) | Error::FailedWithBody { status, .. } => {
                if client::is_retryable_status(*status) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Invariant
                }
            }
            Error::Broadcast(_) | Error::RandomnessNotReady { .. } => ErrorKind::Transient,
            Error::UserRejected(_) | Error::SessionInactive => ErrorKind::UserRejected,
            Error::ContractRejected(_)
            | Error::SpinInProgress { .. }
            | Error::NoPendingSpin(_)
            | Error::AuthRejected(_)
            | Error::GrantExpired => ErrorKind::ContractRejected,
            Error::Json(_)
            | Error::Url(_)
            | Error::InvalidScheme(_)
            | Error::UnexpectedResponse(_)
            | Error::InvalidConfig(_)
            | Error::InvalidBeacon { .. }
            | Error::NotRelayable(_)
            | Error::Event(_)
            | Error::Creature(_) => ErrorKind::Invariant,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State as AxumState,
        http::StatusCode as AxumStatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::time::Duration;

    use crate::mocks::serve_router;

    #[test]
    fn test_client_invalid_scheme() {
        let result = Client::new("ftp://example.com");
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(matches!(err, Error::InvalidScheme(_)));
            assert_eq!(
                err.to_string(),
                "invalid URL scheme: ftp (expected http or https)"
            );
        }

        assert!(Client::new("http://localhost:8080").is_ok());
        assert!(Client::new("https://localhost:8080").is_ok());
    }

    #[test]
    fn test_error_kinds() {
        assert!(Error::RandomnessNotReady {
            round: 1,
            attempts: 3
        }
        .is_transient());
        assert!(Error::FailedWithBody {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
        .is_transient());
        assert_eq!(
            Error::FailedWithBody {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: String::new(),
            }
            .kind(),
            ErrorKind::Invariant
        );
        assert_eq!(
            Error::UserRejected("declined".into()).kind(),
            ErrorKind::UserRejected
        );
        assert_eq!(
            Error::ContractRejected("insufficient funds".into()).kind(),
            ErrorKind::ContractRejected
        );
        assert_eq!(
            Error::Event(EventError::MissingEvent("spin".into())).kind(),
            ErrorKind::Invariant
        );
    }

    #[test]
    fn test_contract_rejection_is_verbatim() {
        let err = Error::ContractRejected("Spin already pending for token 4".into());
        assert_eq!(err.to_string(), "Spin already pending for token 4");
    }

    #[tokio::test]
    async fn test_get_with_retry_retries_retryable_statuses() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky",
                get(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            AxumStatusCode::SERVICE_UNAVAILABLE
                        } else {
                            AxumStatusCode::OK
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("flaky").unwrap();
        let response = client.get_with_retry(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_post_with_retry_respects_retry_non_idempotent_default() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky-post",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                     Json(_body): Json<serde_json::Value>| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        AxumStatusCode::SERVICE_UNAVAILABLE
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: false,
            });

        let url = client.base_url.join("flaky-post").unwrap();
        let response = client
            .post_json_with_retry(url.clone(), &json!({"hi": true}), None)
            .await
            .unwrap();
        let err = Client::ensure_success("POST", &url, response)
            .await
            .expect_err("POST should not be retried by default");
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("POST"));
        assert!(body.contains(url.as_str()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_post_with_retry_retries_when_enabled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/flaky-post",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>,
                     Json(_body): Json<serde_json::Value>| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            AxumStatusCode::SERVICE_UNAVAILABLE
                        } else {
                            AxumStatusCode::OK
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = Client::new(&base_url)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                retry_non_idempotent: true,
            });

        let url = client.base_url.join("flaky-post").unwrap();
        let response = client
            .post_json_with_retry(url, &json!({"hi": true}), None)
            .await
            .expect("POST should succeed after retry");
        assert!(response.status().is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
