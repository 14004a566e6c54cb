use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use spore_types::{Msg, TxResponse};
use std::{future::Future, sync::Arc};

/// Public key accompanying an off-chain signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    /// Base64-encoded key bytes.
    pub value: String,
}

/// Signature over an arbitrary (non-transaction) message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrarySignature {
    /// Base64-encoded signature bytes.
    pub signature: String,
    pub pub_key: PubKey,
}

/// Signing seam. Implementations own key material and the broadcast path.
///
/// `broadcast` signs `msgs` as one transaction, so either every message applies or none do.
/// A user declining to sign is reported as [`Error::UserRejected`]; a transaction the chain
/// refuses is reported as [`Error::ContractRejected`] carrying the chain's log verbatim.
pub trait Wallet: Send + Sync {
    fn address(&self) -> &str;

    fn broadcast(&self, msgs: Vec<Msg>) -> impl Future<Output = Result<TxResponse>> + Send;

    fn sign_arbitrary(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<ArbitrarySignature>> + Send;
}

impl<W: Wallet> Wallet for Arc<W> {
    fn address(&self) -> &str {
        self.as_ref().address()
    }

    fn broadcast(&self, msgs: Vec<Msg>) -> impl Future<Output = Result<TxResponse>> + Send {
        self.as_ref().broadcast(msgs)
    }

    fn sign_arbitrary(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<ArbitrarySignature>> + Send {
        self.as_ref().sign_arbitrary(message)
    }
}

/// Map a delivered transaction with a non-zero code to [`Error::ContractRejected`].
pub fn check_tx(tx: TxResponse) -> Result<TxResponse> {
    if tx.is_success() {
        Ok(tx)
    } else {
        Err(Error::ContractRejected(tx.raw_log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tx() {
        let ok = TxResponse {
            txhash: "A".into(),
            ..Default::default()
        };
        assert!(check_tx(ok).is_ok());

        let failed = TxResponse {
            txhash: "B".into(),
            code: 5,
            raw_log: "insufficient funds: 10inj < 20inj".into(),
            events: vec![],
        };
        let err = check_tx(failed).unwrap_err();
        assert_eq!(err.to_string(), "insufficient funds: 10inj < 20inj");
    }
}
