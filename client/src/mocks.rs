//! In-memory collaborators for tests.

use crate::{
    wallet::{ArbitrarySignature, PubKey, Wallet},
    Error, Result,
};
use spore_types::{Msg, TxResponse};
use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// Wallet that records every broadcast and replays queued responses.
pub struct RecordingWallet {
    address: String,
    broadcasts: Mutex<Vec<Vec<Msg>>>,
    responses: Mutex<VecDeque<Result<TxResponse>>>,
    reject_signing: AtomicBool,
}

impl RecordingWallet {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            broadcasts: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            reject_signing: AtomicBool::new(false),
        }
    }

    /// Queue the result of the next broadcast. Without a queued result, broadcasts succeed
    /// with an empty event log.
    pub fn push_response(&self, response: Result<TxResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> Vec<Vec<Msg>> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

impl Wallet for RecordingWallet {
    fn address(&self) -> &str {
        &self.address
    }

    fn broadcast(&self, msgs: Vec<Msg>) -> impl Future<Output = Result<TxResponse>> + Send {
        let result = {
            let mut broadcasts = self.broadcasts.lock().unwrap();
            broadcasts.push(msgs);
            let count = broadcasts.len();
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(TxResponse {
                        txhash: format!("MOCK{count}"),
                        ..Default::default()
                    })
                })
        };
        async move { result }
    }

    fn sign_arbitrary(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<ArbitrarySignature>> + Send {
        let result = if self.reject_signing.load(Ordering::SeqCst) {
            Err(Error::UserRejected("signature request declined".into()))
        } else {
            Ok(ArbitrarySignature {
                signature: format!("sig:{message}"),
                pub_key: PubKey {
                    key_type: "/injective.crypto.v1beta1.ethsecp256k1.PubKey".into(),
                    value: "cHVia2V5".into(),
                },
            })
        };
        async move { result }
    }
}

/// A well-formed beacon body for `round`.
#[cfg(test)]
pub(crate) fn beacon_json(round: u64) -> serde_json::Value {
    serde_json::json!({
        "round": round,
        "randomness": hex::encode([round as u8; 32]),
        "signature": hex::encode([0xab; 48]),
    })
}

/// Serve `router` on an ephemeral local port.
#[cfg(test)]
pub(crate) async fn serve_router(
    router: axum::Router,
) -> (String, tokio::task::JoinHandle<()>) {
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let actual_addr = listener.local_addr().unwrap();
    let base_url = format!("http://{actual_addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .unwrap();
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (base_url, handle)
}
