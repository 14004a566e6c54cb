//! Typed decoders for the wasm event attributes emitted by the game controller.
//!
//! Attributes are an implicit contract keyed by name. Every decoder here fails with an
//! [`EventError`] when a required attribute is absent or malformed instead of defaulting it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::{game::Stat, Amount};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl TxEvent {
    pub fn new(kind: impl Into<String>, attributes: &[(&str, &str)]) -> Self {
        Self {
            kind: kind.into(),
            attributes: attributes
                .iter()
                .map(|(key, value)| Attribute {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    pub fn is_wasm(&self) -> bool {
        self.kind == "wasm" || self.kind.starts_with("wasm-")
    }

    /// Wasm events for `action` arrive either as `wasm` with an `action` attribute or as
    /// `wasm-{action}`.
    fn is_action(&self, action: &str) -> bool {
        match self.kind.strip_prefix("wasm") {
            Some("") => self.attribute("action") == Some(action),
            Some(rest) => rest.strip_prefix('-') == Some(action),
            None => false,
        }
    }
}

/// Result of a broadcast transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    #[serde(alias = "txHash")]
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default, alias = "rawLog")]
    pub raw_log: String,
    #[serde(default)]
    pub events: Vec<TxEvent>,
}

impl TxResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Events emitted for `action`, in emission order.
    pub fn action_events<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a TxEvent> + 'a {
        self.events.iter().filter(move |event| event.is_action(action))
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum EventError {
    #[error("no {0} event in transaction")]
    MissingEvent(String),
    #[error("{action} event missing attribute {key}")]
    MissingAttribute { action: String, key: String },
    #[error("{action} event has invalid {key}: {value}")]
    InvalidAttribute {
        action: String,
        key: String,
        value: String,
    },
}

struct Fields<'a> {
    action: &'a str,
    event: &'a TxEvent,
}

impl<'a> Fields<'a> {
    /// First present key wins; older contract builds use different names.
    fn raw<'k>(&self, keys: &[&'k str]) -> Result<(&'k str, &'a str), EventError> {
        keys.iter()
            .find_map(|key| self.event.attribute(key).map(|value| (*key, value)))
            .ok_or_else(|| EventError::MissingAttribute {
                action: self.action.to_string(),
                key: keys[0].to_string(),
            })
    }

    fn string(&self, keys: &[&str]) -> Result<String, EventError> {
        self.raw(keys).map(|(_, value)| value.to_string())
    }

    fn parse<T: FromStr>(&self, keys: &[&str]) -> Result<T, EventError> {
        let (key, value) = self.raw(keys)?;
        value
            .trim()
            .parse()
            .map_err(|_| EventError::InvalidAttribute {
                action: self.action.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            })
    }
}

/// A decodable contract event.
pub trait ContractEvent: Sized {
    /// Action names the event may be emitted under.
    const ACTIONS: &'static [&'static str];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError>;

    /// Decode the first matching event in `tx`.
    fn find(tx: &TxResponse) -> Result<Self, EventError> {
        for action in Self::ACTIONS {
            if let Some(event) = tx.action_events(action).next() {
                return Self::decode(action, event);
            }
        }
        Err(EventError::MissingEvent(Self::ACTIONS[0].to_string()))
    }

    /// Decode every matching event in `tx`.
    fn find_all(tx: &TxResponse) -> Result<Vec<Self>, EventError> {
        let mut out = Vec::new();
        for action in Self::ACTIONS {
            for event in tx.action_events(action) {
                out.push(Self::decode(action, event)?);
            }
        }
        Ok(out)
    }
}

/// Emitted when a spin is committed and bound to a future beacon round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinRequested {
    pub token_id: String,
    pub trait_target: Stat,
    pub target_round: u64,
}

impl ContractEvent for SpinRequested {
    const ACTIONS: &'static [&'static str] = &["request_spin"];

    /// Some contract builds emit the commitment under the `spin` execute key, or as a bare
    /// wasm event; any wasm event carrying `target_round` is accepted after `request_spin`.
    fn find(tx: &TxResponse) -> Result<Self, EventError> {
        if let Some(event) = tx.action_events("request_spin").next() {
            return Self::decode("request_spin", event);
        }
        tx.events
            .iter()
            .find(|event| event.is_wasm() && event.attribute("target_round").is_some())
            .map(|event| Self::decode("spin", event))
            .unwrap_or_else(|| Err(EventError::MissingEvent("request_spin".to_string())))
    }

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            token_id: fields.string(&["token_id"])?,
            trait_target: fields.parse(&["trait_target"])?,
            target_round: fields.parse(&["target_round"])?,
        })
    }
}

/// Emitted when a spin is resolved against the beacon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResolved {
    pub token_id: String,
    pub trait_target: Stat,
    pub success: bool,
    pub old_volatile: i8,
    pub new_volatile: i8,
}

impl SpinResolved {
    pub fn outcome(&self) -> SpinOutcome {
        match self.new_volatile.cmp(&self.old_volatile) {
            std::cmp::Ordering::Greater => SpinOutcome::Improved,
            std::cmp::Ordering::Less => SpinOutcome::Worsened,
            std::cmp::Ordering::Equal => SpinOutcome::Unchanged,
        }
    }
}

/// Direction a resolved spin moved the targeted trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinOutcome {
    Improved,
    Worsened,
    Unchanged,
}

impl ContractEvent for SpinResolved {
    const ACTIONS: &'static [&'static str] = &["resolve_spin", "spin"];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            token_id: fields.string(&["token_id"])?,
            trait_target: fields.parse(&["trait_target"])?,
            success: fields.parse(&["success"])?,
            old_volatile: fields.parse(&["old_volatile", "old_value"])?,
            new_volatile: fields.parse(&["new_volatile", "new_value"])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minted {
    pub token_id: String,
}

impl ContractEvent for Minted {
    const ACTIONS: &'static [&'static str] = &["mint"];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            token_id: fields.string(&["token_id"])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spliced {
    pub child_id: String,
}

impl ContractEvent for Spliced {
    const ACTIONS: &'static [&'static str] = &["splice"];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            child_id: fields.string(&["child_id", "token_id"])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Harvested {
    pub token_id: String,
    pub rewards_paid: Amount,
}

impl ContractEvent for Harvested {
    const ACTIONS: &'static [&'static str] = &["harvest"];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            token_id: fields.string(&["token_id"])?,
            rewards_paid: fields.parse(&["rewards_paid", "rewards"])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ascended {
    pub token_id: String,
    pub success: bool,
    pub new_substrate: u8,
}

impl ContractEvent for Ascended {
    const ACTIONS: &'static [&'static str] = &["ascend"];

    fn decode(action: &str, event: &TxEvent) -> Result<Self, EventError> {
        let fields = Fields { action, event };
        Ok(Self {
            token_id: fields.string(&["token_id"])?,
            success: fields.parse(&["success"])?,
            new_substrate: fields.parse(&["new_substrate"])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(events: Vec<TxEvent>) -> TxResponse {
        TxResponse {
            txhash: "ABCD".into(),
            events,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_request_spin() {
        let tx = tx(vec![
            TxEvent::new("message", &[("sender", "inj1me")]),
            TxEvent::new(
                "wasm",
                &[
                    ("action", "request_spin"),
                    ("token_id", "42"),
                    ("trait_target", "Cap"),
                    ("target_round", "1234567"),
                ],
            ),
        ]);
        let event = SpinRequested::find(&tx).unwrap();
        assert_eq!(
            event,
            SpinRequested {
                token_id: "42".into(),
                trait_target: Stat::Cap,
                target_round: 1_234_567,
            }
        );
    }

    #[test]
    fn test_request_under_spin_action() {
        let spin = tx(vec![TxEvent::new(
            "wasm",
            &[
                ("action", "spin"),
                ("token_id", "7"),
                ("trait_target", "Cap"),
                ("target_round", "5"),
            ],
        )]);
        assert_eq!(SpinRequested::find(&spin).unwrap().target_round, 5);

        let renamed = tx(vec![
            TxEvent::new("wasm-spin", &[("token_id", "7"), ("trait_target", "stem")]),
            TxEvent::new(
                "wasm-spin_requested",
                &[
                    ("token_id", "7"),
                    ("trait_target", "stem"),
                    ("target_round", "9"),
                ],
            ),
        ]);
        let event = SpinRequested::find(&renamed).unwrap();
        assert_eq!(event.target_round, 9);
        assert_eq!(event.trait_target, Stat::Stem);

        // Only wasm events count.
        let no_round = tx(vec![
            TxEvent::new("message", &[("target_round", "3")]),
            TxEvent::new("wasm", &[("action", "spin"), ("token_id", "7")]),
        ]);
        assert_eq!(
            SpinRequested::find(&no_round),
            Err(EventError::MissingEvent("request_spin".into()))
        );
    }

    #[test]
    fn test_decode_prefixed_event_kind() {
        let tx = tx(vec![TxEvent::new(
            "wasm-resolve_spin",
            &[
                ("token_id", "42"),
                ("trait_target", "stem"),
                ("success", "true"),
                ("old_volatile", "-1"),
                ("new_volatile", "0"),
            ],
        )]);
        let event = SpinResolved::find(&tx).unwrap();
        assert!(event.success);
        assert_eq!(event.trait_target, Stat::Stem);
        assert_eq!(event.outcome(), SpinOutcome::Improved);
    }

    #[test]
    fn test_decode_legacy_spin_attribute_names() {
        let tx = tx(vec![TxEvent::new(
            "wasm",
            &[
                ("action", "spin"),
                ("token_id", "1"),
                ("trait_target", "Spores"),
                ("success", "false"),
                ("old_value", "2"),
                ("new_value", "1"),
            ],
        )]);
        let event = SpinResolved::find(&tx).unwrap();
        assert_eq!(event.old_volatile, 2);
        assert_eq!(event.outcome(), SpinOutcome::Worsened);
    }

    #[test]
    fn test_missing_attribute_is_an_error() {
        let tx = tx(vec![TxEvent::new(
            "wasm",
            &[("action", "request_spin"), ("token_id", "42"), ("trait_target", "cap")],
        )]);
        assert_eq!(
            SpinRequested::find(&tx),
            Err(EventError::MissingAttribute {
                action: "request_spin".into(),
                key: "target_round".into(),
            })
        );
    }

    #[test]
    fn test_malformed_attribute_is_an_error() {
        let tx = tx(vec![TxEvent::new(
            "wasm",
            &[
                ("action", "request_spin"),
                ("token_id", "42"),
                ("trait_target", "cap"),
                ("target_round", "soon"),
            ],
        )]);
        assert!(matches!(
            SpinRequested::find(&tx),
            Err(EventError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_missing_event() {
        let tx = tx(vec![TxEvent::new("wasm", &[("action", "mint")])]);
        assert_eq!(
            Ascended::find(&tx),
            Err(EventError::MissingEvent("ascend".into()))
        );
    }

    #[test]
    fn test_batch_mint_decodes_every_token() {
        let tx = tx(vec![
            TxEvent::new("wasm", &[("action", "mint"), ("token_id", "10")]),
            TxEvent::new("wasm", &[("action", "mint"), ("token_id", "11")]),
        ]);
        let minted = Minted::find_all(&tx).unwrap();
        assert_eq!(
            minted.into_iter().map(|m| m.token_id).collect::<Vec<_>>(),
            vec!["10", "11"]
        );
    }

    #[test]
    fn test_decode_splice() {
        let splice_tx = tx(vec![
            TxEvent::new("wasm", &[("action", "burn"), ("token_id", "3")]),
            TxEvent::new(
                "wasm-splice",
                &[("parent_1_id", "3"), ("parent_2_id", "4"), ("child_id", "88")],
            ),
        ]);
        assert_eq!(Spliced::find(&splice_tx).unwrap().child_id, "88");

        let legacy = tx(vec![TxEvent::new(
            "wasm",
            &[("action", "splice"), ("token_id", "89")],
        )]);
        assert_eq!(Spliced::find(&legacy).unwrap().child_id, "89");

        let bare = tx(vec![TxEvent::new("wasm", &[("action", "splice")])]);
        assert_eq!(
            Spliced::find(&bare),
            Err(EventError::MissingAttribute {
                action: "splice".into(),
                key: "child_id".into(),
            })
        );
    }

    #[test]
    fn test_harvest_and_ascend() {
        let tx = tx(vec![
            TxEvent::new(
                "wasm",
                &[("action", "harvest"), ("token_id", "5"), ("rewards", "900")],
            ),
            TxEvent::new(
                "wasm",
                &[
                    ("action", "ascend"),
                    ("token_id", "5"),
                    ("success", "true"),
                    ("new_substrate", "2"),
                ],
            ),
        ]);
        assert_eq!(
            Harvested::find(&tx).unwrap().rewards_paid,
            Amount::new(900)
        );
        assert_eq!(Ascended::find(&tx).unwrap().new_substrate, 2);
    }
}
