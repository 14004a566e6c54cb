//! Delegated signing sessions.
//!
//! Enabling auto-sign involves two independent credentials with separate expiries: a bearer
//! token from the auth endpoint and an on-chain grant to the delegate. A session is only
//! usable while both are valid.

use crate::{
    config::{AuthPolicy, GameConfig},
    unix_now,
    wallet::{check_tx, PubKey},
    AppContext, Client, Error, Result, Wallet,
};
use serde::{Deserialize, Serialize};
use spore_types::{
    authz::{MsgGrant, MsgRevoke},
    Msg,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use url::Url;

/// Local view of the delegated session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub enabled: bool,
    pub token: Option<String>,
    /// Unix seconds after which the bearer token is rejected.
    pub token_expiry: u64,
    /// Unix seconds after which the on-chain grant is gone.
    pub grant_expiry: u64,
}

impl AuthSession {
    /// Usable only while enabled and both expiries lie in the future.
    pub fn is_active(&self, now: u64) -> bool {
        self.enabled && self.token.is_some() && now < self.token_expiry && now < self.grant_expiry
    }

    /// Bearer token, if the session is active at `now`.
    pub fn bearer(&self, now: u64) -> Option<&str> {
        if self.is_active(now) {
            self.token.as_deref()
        } else {
            None
        }
    }
}

/// Shared handle to the session. Cloning shares the underlying state.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<AuthSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AuthSession> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> AuthSession {
        self.lock().clone()
    }

    pub fn set(&self, session: AuthSession) {
        *self.lock() = session;
    }

    pub fn update(&self, f: impl FnOnce(&mut AuthSession)) {
        f(&mut self.lock());
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.lock().is_active(now)
    }

    /// Mark the session unusable, keeping the token for diagnostics.
    pub fn disable(&self) {
        self.lock().enabled = false;
    }

    pub fn clear(&self) {
        self.set(AuthSession::default());
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    signature: &'a str,
    message: &'a str,
    address: &'a str,
    pub_key: &'a PubKey,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
    error: Option<String>,
}

/// The string the user signs to obtain a bearer token.
pub fn authorization_message(address: &str, expiry: u64) -> String {
    format!("Authorize spore-fates auto-sign for {address} until {expiry}")
}

/// Enables and disables delegated signing for the wallet's account.
pub struct AuthSessionManager<W: Wallet> {
    wallet: W,
    client: Client,
    auth_url: Url,
    config: Arc<GameConfig>,
    policy: AuthPolicy,
    store: SessionStore,
    context: Option<Arc<AppContext>>,
}

impl<W: Wallet> AuthSessionManager<W> {
    pub fn new(wallet: W, config: Arc<GameConfig>, store: SessionStore) -> Result<Self> {
        let client = Client::new(&config.auth_url)?;
        let auth_url = Url::parse(&config.auth_url)?;
        Ok(Self {
            wallet,
            client,
            auth_url,
            policy: config.auth_policy(),
            config,
            store,
            context: None,
        })
    }

    /// Use `context`'s session store and fire its refresh signal after `enable`/`disable`.
    pub fn with_context(mut self, context: Arc<AppContext>) -> Self {
        self.store = context.session_store().clone();
        self.context = Some(context);
        self
    }

    fn refreshed(&self) {
        if let Some(context) = &self.context {
            context.trigger_refresh();
        }
    }

    pub fn with_policy(mut self, policy: AuthPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The grant `enable` submits, expiring at `expiration`.
    pub fn grant_msg(&self, expiration: u64) -> MsgGrant {
        MsgGrant {
            granter: self.wallet.address().to_string(),
            grantee: self.config.delegate_address.clone(),
            expiration,
            grants: vec![
                self.policy.game_limit.to_grant(&self.config.game_controller),
                self.policy.oracle_limit.to_grant(&self.config.oracle_contract),
            ],
        }
    }

    pub fn revoke_msg(&self) -> MsgRevoke {
        MsgRevoke::execute_contract(self.wallet.address(), &self.config.delegate_address)
    }

    /// Exchange a signed authorization string for a bearer token.
    async fn authenticate(&self, now: u64) -> Result<(String, u64)> {
        let token_expiry = now + self.policy.token_lifetime.as_secs();
        let address = self.wallet.address();
        let message = authorization_message(address, token_expiry);
        let signed = self.wallet.sign_arbitrary(&message).await?;

        let request = AuthRequest {
            signature: &signed.signature,
            message: &message,
            address,
            pub_key: &signed.pub_key,
        };
        let response = self
            .client
            .post_json_with_retry(self.auth_url.clone(), &request, None)
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Option<AuthResponse> = serde_json::from_str(&text).ok();
        match body {
            Some(AuthResponse {
                token: Some(token),
                ..
            }) if status.is_success() => Ok((token, token_expiry)),
            Some(AuthResponse {
                error: Some(error), ..
            }) if status.is_client_error() => Err(Error::AuthRejected(error)),
            _ if status.is_success() => Err(Error::UnexpectedResponse(format!(
                "auth response without token: {text}"
            ))),
            _ => Err(Error::FailedWithBody {
                status,
                body: format!("POST {}: {text}", self.auth_url),
            }),
        }
    }

    /// Obtain a bearer token, then grant the delegate its scoped authority.
    ///
    /// The token is stored as soon as the exchange succeeds. The grant is submitted even when
    /// the exchange failed, but the session is only marked enabled when both succeed. The
    /// first failure is returned. A declined signature aborts before anything is submitted.
    pub async fn enable(&self) -> Result<AuthSession> {
        let now = unix_now();
        let auth = match self.authenticate(now).await {
            Ok((token, token_expiry)) => {
                self.store.update(|session| {
                    session.token = Some(token);
                    session.token_expiry = token_expiry;
                });
                Ok(())
            }
            Err(Error::UserRejected(reason)) => return Err(Error::UserRejected(reason)),
            Err(err) => {
                warn!(?err, "auth exchange failed");
                Err(err)
            }
        };

        let grant_expiry = now + self.policy.grant_lifetime.as_secs();
        let grant = Msg::Grant(self.grant_msg(grant_expiry));
        let granted = self
            .wallet
            .broadcast(vec![grant])
            .await
            .and_then(check_tx);
        let tx = match granted {
            Ok(tx) => tx,
            Err(err) => {
                warn!(?err, "grant transaction failed");
                self.store.disable();
                return Err(err);
            }
        };
        if let Err(err) = auth {
            warn!(txhash = tx.txhash, "grant landed without a bearer token");
            self.store.disable();
            return Err(err);
        }
        self.store.update(|session| {
            session.enabled = true;
            session.grant_expiry = grant_expiry;
        });
        info!(txhash = tx.txhash, grant_expiry, "delegated signing enabled");
        self.refreshed();
        Ok(self.store.get())
    }

    /// Revoke the delegate's authority. Local state is cleared whether or not the revoke
    /// lands; a revoke failure is still returned.
    pub async fn disable(&self) -> Result<()> {
        let revoke = Msg::Revoke(self.revoke_msg());
        let result = self
            .wallet
            .broadcast(vec![revoke])
            .await
            .and_then(check_tx);
        self.store.clear();
        self.refreshed();
        match result {
            Ok(tx) => {
                info!(txhash = tx.txhash, "delegated signing disabled");
                Ok(())
            }
            Err(err) => {
                warn!(?err, "revoke failed; grant may remain until expiry");
                Err(err)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.store.is_active(unix_now())
    }
}
