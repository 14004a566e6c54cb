use crate::{
    unix_now,
    wallet::{check_tx, ArbitrarySignature},
    Client, Error, Result, SessionStore, Wallet,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use spore_types::{msg::Coin, Msg, TxResponse};
use std::future::Future;
use tracing::{debug, warn};
use url::Url;

/// Relay error text meaning the on-chain grant is gone.
const MISSING_GRANT: &str = "failed to get grant";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayMsg<'a> {
    contract_address: &'a str,
    msg: &'a serde_json::Value,
    sender: &'a str,
    funds: &'a [Coin],
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    msgs: Vec<RelayMsg<'a>>,
    network: &'a str,
}

#[derive(Deserialize)]
struct RelayError {
    error: Option<String>,
}

/// Wallet that submits contract calls through the auto-sign relay, which executes them
/// under the delegate's grant.
///
/// Only contract-execute messages can be relayed. Grants and revokes must be signed by the
/// account owner.
#[derive(Clone)]
pub struct RelayWallet {
    client: Client,
    relay_url: Url,
    granter: String,
    network: String,
    store: SessionStore,
}

impl RelayWallet {
    pub fn new(
        relay_url: &str,
        granter: impl Into<String>,
        network: impl Into<String>,
        store: SessionStore,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::new(relay_url)?,
            relay_url: Url::parse(relay_url)?,
            granter: granter.into(),
            network: network.into(),
            store,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    async fn relay(&self, msgs: Vec<Msg>) -> Result<TxResponse> {
        let session = self.store.get();
        let token = session
            .bearer(unix_now())
            .ok_or(Error::SessionInactive)?
            .to_string();

        let mut relayed = Vec::with_capacity(msgs.len());
        for msg in &msgs {
            let execute = msg
                .as_execute()
                .ok_or(Error::NotRelayable("only contract calls can be relayed"))?;
            if execute.sender != self.granter {
                return Err(Error::NotRelayable("sender is not the granter"));
            }
            relayed.push(RelayMsg {
                contract_address: &execute.contract,
                msg: &execute.msg,
                sender: &execute.sender,
                funds: &execute.funds,
            });
        }
        let request = RelayRequest {
            msgs: relayed,
            network: &self.network,
        };

        let response = self
            .client
            .post_json_with_retry(self.relay_url.clone(), &request, Some(&token))
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            let tx: TxResponse = serde_json::from_str(&text)?;
            debug!(txhash = tx.txhash, count = msgs.len(), "relayed");
            return check_tx(tx);
        }

        let error = serde_json::from_str::<RelayError>(&text)
            .ok()
            .and_then(|body| body.error);
        match error {
            Some(error) if error.contains(MISSING_GRANT) => {
                warn!(%error, "delegated grant missing; disabling session");
                self.store.disable();
                Err(Error::GrantExpired)
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                self.store.disable();
                Err(Error::SessionInactive)
            }
            Some(error) if !crate::client::is_retryable_status(status) => {
                Err(Error::ContractRejected(error))
            }
            _ => Err(Error::FailedWithBody {
                status,
                body: format!("POST {}: {text}", self.relay_url),
            }),
        }
    }
}

impl Wallet for RelayWallet {
    fn address(&self) -> &str {
        &self.granter
    }

    fn broadcast(&self, msgs: Vec<Msg>) -> impl Future<Output = Result<TxResponse>> + Send {
        self.relay(msgs)
    }

    fn sign_arbitrary(
        &self,
        _message: &str,
    ) -> impl Future<Output = Result<ArbitrarySignature>> + Send {
        async { Err(Error::NotRelayable("the relay cannot sign for the account")) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::tests::gateway, mocks::serve_router, AuthSession};
    use axum::{
        extract::State as AxumState,
        http::{HeaderMap, StatusCode as AxumStatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use spore_types::{authz::MsgRevoke, game::Stat};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone)]
    struct Relay {
        calls: Arc<AtomicUsize>,
        reply: (u16, Value),
    }

    fn relay_router(relay: Relay) -> Router {
        Router::new()
            .route(
                "/relay",
                post(
                    |AxumState(relay): AxumState<Relay>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        relay.calls.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(headers["authorization"], "Bearer jwt-1");
                        assert_eq!(body["network"], "testnet");
                        let msg = &body["msgs"][0];
                        assert_eq!(msg["contractAddress"], "inj1game");
                        assert_eq!(msg["sender"], "inj1me");
                        assert_eq!(msg["msg"]["spin"]["trait_target"], "cap");
                        assert_eq!(msg["funds"][0]["denom"], "inj");
                        let (status, body) = relay.reply;
                        (AxumStatusCode::from_u16(status).unwrap(), Json(body)).into_response()
                    },
                ),
            )
            .with_state(relay)
    }

    fn active_store() -> SessionStore {
        let now = unix_now();
        let store = SessionStore::new();
        store.set(AuthSession {
            enabled: true,
            token: Some("jwt-1".into()),
            token_expiry: now + 3_600,
            grant_expiry: now + 600,
        });
        store
    }

    async fn relay_wallet(
        status: u16,
        body: Value,
    ) -> (RelayWallet, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (base_url, handle) = serve_router(relay_router(Relay {
            calls: calls.clone(),
            reply: (status, body),
        }))
        .await;
        let wallet = RelayWallet::new(
            &format!("{base_url}/relay"),
            "inj1me",
            "testnet",
            active_store(),
        )
        .unwrap();
        (wallet, calls, handle)
    }

    fn spin() -> Msg {
        gateway("http://localhost:1")
            .spin_msg("inj1me", "7", Stat::Cap, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_relay_success() {
        let (wallet, calls, handle) =
            relay_wallet(200, json!({"txHash": "ABC", "code": 0, "rawLog": ""})).await;

        let tx = wallet.broadcast(vec![spin()]).await.unwrap();
        assert_eq!(tx.txhash, "ABC");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_missing_grant_disables_session() {
        let (wallet, _calls, handle) = relay_wallet(
            500,
            json!({"error": "failed to execute message; message index: 0: failed to get grant with given granter"}),
        )
        .await;

        let err = wallet.broadcast(vec![spin()]).await.unwrap_err();
        assert!(matches!(err, Error::GrantExpired));
        assert!(!wallet.store().get().enabled);

        // No request leaves once the session is disabled.
        let err = wallet.broadcast(vec![spin()]).await.unwrap_err();
        assert!(matches!(err, Error::SessionInactive));

        handle.abort();
    }

    #[tokio::test]
    async fn test_contract_error_is_verbatim() {
        let (wallet, _calls, handle) =
            relay_wallet(500, json!({"error": "Spin already pending"})).await;

        let err = wallet.broadcast(vec![spin()]).await.unwrap_err();
        assert_eq!(err.to_string(), "Spin already pending");
        assert!(wallet.store().get().enabled);

        handle.abort();
    }

    #[tokio::test]
    async fn test_only_contract_calls_are_relayed() {
        let (wallet, calls, handle) = relay_wallet(200, json!({"txHash": "ABC"})).await;

        let revoke = Msg::Revoke(MsgRevoke::execute_contract("inj1me", "inj1delegate"));
        let err = wallet.broadcast(vec![revoke]).await.unwrap_err();
        assert!(matches!(err, Error::NotRelayable(_)));
        assert!(wallet.sign_arbitrary("hello").await.is_err());

        wallet.store().update(|session| session.grant_expiry = 0);
        let err = wallet.broadcast(vec![spin()]).await.unwrap_err();
        assert!(matches!(err, Error::SessionInactive));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle.abort();
    }
}
