//! Delegated-signing grants and the signed message envelope.

use serde::{Deserialize, Serialize};

use crate::msg::{Coin, ExecuteContract};

/// Message type a grant is revoked for.
pub const EXECUTE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";

/// Scope granted to the delegate for a single contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGrant {
    pub contract: String,
    /// Maximum number of calls the delegate may make.
    pub calls_remaining: u64,
    /// Spend ceiling per denom.
    pub amounts: Vec<Coin>,
    /// Allow-listed top-level message keys, e.g. `"spin"`.
    pub accepted_messages: Vec<String>,
}

impl ContractGrant {
    pub fn allows(&self, msg: &ExecuteContract) -> bool {
        self.contract == msg.contract
            && msg
                .action()
                .is_some_and(|action| self.accepted_messages.iter().any(|key| key == action))
    }
}

/// Grant of contract-execution authority to a delegate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgGrant {
    pub granter: String,
    pub grantee: String,
    /// Unix seconds.
    pub expiration: u64,
    pub grants: Vec<ContractGrant>,
}

impl MsgGrant {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiration
    }

    /// Whether the delegate could relay `msg` under this grant at `now`.
    pub fn allows(&self, msg: &ExecuteContract, now: u64) -> bool {
        !self.is_expired(now)
            && msg.sender == self.granter
            && self.grants.iter().any(|grant| grant.allows(msg))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRevoke {
    pub granter: String,
    pub grantee: String,
    pub msg_type_url: String,
}

impl MsgRevoke {
    pub fn execute_contract(granter: impl Into<String>, grantee: impl Into<String>) -> Self {
        Self {
            granter: granter.into(),
            grantee: grantee.into(),
            msg_type_url: EXECUTE_CONTRACT_TYPE_URL.to_string(),
        }
    }
}

/// Anything a wallet can sign and broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Msg {
    #[serde(rename = "/cosmwasm.wasm.v1.MsgExecuteContract")]
    Execute(ExecuteContract),
    #[serde(rename = "/cosmos.authz.v1beta1.MsgGrant")]
    Grant(MsgGrant),
    #[serde(rename = "/cosmos.authz.v1beta1.MsgRevoke")]
    Revoke(MsgRevoke),
}

impl Msg {
    pub fn as_execute(&self) -> Option<&ExecuteContract> {
        match self {
            Msg::Execute(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<ExecuteContract> for Msg {
    fn from(value: ExecuteContract) -> Self {
        Msg::Execute(value)
    }
}
