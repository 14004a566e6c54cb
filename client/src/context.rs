use crate::{AuthSession, SessionStore};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// Per-application state shared by the orchestrators: the connected account, its delegated
/// session and the refresh signal fired after mutating actions.
///
/// Created at startup and torn down with [`AppContext::disconnect`]. All mutation goes
/// through the setters here.
pub struct AppContext {
    wallet: RwLock<Option<String>>,
    session: SessionStore,
    refresh: watch::Sender<u64>,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext {
    pub fn new() -> Self {
        let (refresh, _) = watch::channel(0);
        Self {
            wallet: RwLock::new(None),
            session: SessionStore::new(),
            refresh,
        }
    }

    pub fn wallet_address(&self) -> Option<String> {
        self.wallet
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Connect `address`. Switching accounts drops the previous account's session.
    pub fn set_wallet(&self, address: impl Into<String>) {
        let address = address.into();
        let mut wallet = self.wallet.write().unwrap_or_else(PoisonError::into_inner);
        if wallet.as_deref() != Some(address.as_str()) {
            self.session.clear();
            debug!(address, "wallet connected");
            *wallet = Some(address);
        }
        drop(wallet);
        self.trigger_refresh();
    }

    /// Handle shared with the auth manager and relay wallet.
    pub fn session_store(&self) -> &SessionStore {
        &self.session
    }

    pub fn session(&self) -> AuthSession {
        self.session.get()
    }

    /// Signal subscribers that on-chain state changed. Returns the new counter value.
    pub fn trigger_refresh(&self) -> u64 {
        self.refresh.send_modify(|count| *count += 1);
        *self.refresh.borrow()
    }

    pub fn refresh_count(&self) -> u64 {
        *self.refresh.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.refresh.subscribe()
    }

    pub fn disconnect(&self) {
        *self.wallet.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.session.clear();
        self.trigger_refresh();
        debug!("wallet disconnected");
    }
}
