// SPDX-License-Identifier: Apache-2.0

//! Event Decoder (spec §4.5). Turns a raw committed transaction into an ordered sequence
//! of typed domain Actions: filters events to the governance component (or a child
//! key-value store it owns), decodes the payload by event name, and emits zero or more
//! Actions in event order.

use std::collections::HashSet;

use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::{
    counters::DECODER_UNKNOWN_EVENT_COUNT,
    db::models::poll::{PollKind, VoteOption},
    gateway::{CommittedTransaction, RawEvent},
};

#[derive(Clone, Debug, Deserialize)]
pub struct NewPollPayload {
    pub id: i64,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub vote_options: Vec<VoteOption>,
    pub max_selections: i32,
    pub start_version: Option<i64>,
    pub end_version: Option<i64>,
    pub quorum: BigDecimal,
    pub approval_threshold: BigDecimal,
    pub hidden: bool,
    pub voter_kvs_address: String,
    pub vote_kvs_address: String,
}

#[derive(Clone, Debug, Deserialize)]
struct VoteCastPayload {
    poll_kind: PollKind,
    poll_id: i64,
    voter: String,
    selections: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct VoteRevokedPayload {
    poll_kind: PollKind,
    poll_id: i64,
    voter: String,
}

#[derive(Clone, Debug, Deserialize)]
struct VoteChangedPayload {
    poll_kind: PollKind,
    poll_id: i64,
    voter: String,
    new_selections: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct HiddenToggledPayload {
    poll_kind: PollKind,
    poll_id: i64,
    hidden: bool,
}

#[derive(Clone, Debug, Deserialize)]
struct ProposalPromotedPayload {
    from_temperature_check_id: i64,
    to_proposal_id: i64,
}

#[derive(Clone, Debug)]
pub enum Action {
    ProposalCreated(NewPollPayload),
    TemperatureCheckCreated(NewPollPayload),
    VoteCast {
        poll_kind: PollKind,
        poll_id: i64,
        voter: String,
        selections: Vec<String>,
        poll_version: i64,
    },
    VoteRevoked {
        poll_kind: PollKind,
        poll_id: i64,
        voter: String,
    },
    /// Treated as revoke+cast by the Snapshot Engine: it carries the same weight
    /// re-measurement semantics as `VoteCast` against an existing record.
    VoteChanged {
        poll_kind: PollKind,
        poll_id: i64,
        voter: String,
        selections: Vec<String>,
        poll_version: i64,
    },
    HiddenToggled {
        poll_kind: PollKind,
        poll_id: i64,
        hidden: bool,
    },
    ParametersChanged(serde_json::Value),
    ProposalPromoted {
        from_temperature_check_id: i64,
        to_proposal_id: i64,
    },
}

/// Decodes one transaction's events into Actions, in event order. `component_address`
/// is the configured governance component; `known_child_addresses` are key-value-store
/// addresses already known to belong to it (e.g. `voter_kvs_address`/`vote_kvs_address`
/// of polls seen so far) so their events aren't dropped by the emitter filter.
pub fn decode_transaction(
    txn: &CommittedTransaction,
    component_address: &str,
    known_child_addresses: &HashSet<String>,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for event in &txn.events {
        if !is_relevant_emitter(event, component_address, known_child_addresses) {
            continue;
        }
        match decode_event(event, txn.state_version) {
            Some(action) => actions.push(action),
            None => {
                DECODER_UNKNOWN_EVENT_COUNT.inc();
                tracing::debug!(
                    state_version = txn.state_version,
                    event_name = event.event_name.as_str(),
                    "unrecognized event variant, ignoring"
                );
            }
        }
    }
    actions
}

fn is_relevant_emitter(
    event: &RawEvent,
    component_address: &str,
    known_child_addresses: &HashSet<String>,
) -> bool {
    event.emitter == component_address || known_child_addresses.contains(&event.emitter)
}

fn decode_event(event: &RawEvent, txn_state_version: i64) -> Option<Action> {
    match event.event_name.as_str() {
        "NewProposalEvent" => serde_json::from_value(event.payload.clone())
            .ok()
            .map(Action::ProposalCreated),
        "NewTemperatureCheckEvent" => serde_json::from_value(event.payload.clone())
            .ok()
            .map(Action::TemperatureCheckCreated),
        "VoteCastEvent" => {
            let payload: VoteCastPayload = serde_json::from_value(event.payload.clone()).ok()?;
            Some(Action::VoteCast {
                poll_kind: payload.poll_kind,
                poll_id: payload.poll_id,
                voter: payload.voter,
                selections: payload.selections,
                poll_version: txn_state_version,
            })
        }
        "VoteRevokedEvent" => {
            let payload: VoteRevokedPayload = serde_json::from_value(event.payload.clone()).ok()?;
            Some(Action::VoteRevoked {
                poll_kind: payload.poll_kind,
                poll_id: payload.poll_id,
                voter: payload.voter,
            })
        }
        "VoteChangedEvent" => {
            let payload: VoteChangedPayload = serde_json::from_value(event.payload.clone()).ok()?;
            Some(Action::VoteChanged {
                poll_kind: payload.poll_kind,
                poll_id: payload.poll_id,
                voter: payload.voter,
                selections: payload.new_selections,
                poll_version: txn_state_version,
            })
        }
        "ProposalHiddenToggledEvent" | "TemperatureCheckHiddenToggledEvent" => {
            let payload: HiddenToggledPayload =
                serde_json::from_value(event.payload.clone()).ok()?;
            Some(Action::HiddenToggled {
                poll_kind: payload.poll_kind,
                poll_id: payload.poll_id,
                hidden: payload.hidden,
            })
        }
        "ParametersChangedEvent" => Some(Action::ParametersChanged(event.payload.clone())),
        "ProposalPromotedEvent" => {
            let payload: ProposalPromotedPayload =
                serde_json::from_value(event.payload.clone()).ok()?;
            Some(Action::ProposalPromoted {
                from_temperature_check_id: payload.from_temperature_check_id,
                to_proposal_id: payload.to_proposal_id,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn txn_with_events(events: Vec<RawEvent>) -> CommittedTransaction {
        CommittedTransaction {
            state_version: 1000,
            intent_hash: "deadbeef".to_string(),
            events,
            affected_global_entities: vec!["component_1".to_string()],
            status: crate::gateway::TransactionStatus::Success,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn decodes_vote_cast_and_assigns_poll_version_from_transaction() {
        let txn = txn_with_events(vec![RawEvent {
            emitter: "component_1".to_string(),
            event_name: "VoteCastEvent".to_string(),
            payload: json!({
                "poll_kind": "temperature_check",
                "poll_id": 1,
                "voter": "account_a",
                "selections": ["for"],
            }),
        }]);

        let actions = decode_transaction(&txn, "component_1", &HashSet::new());
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::VoteCast {
                poll_id,
                poll_version,
                ..
            } => {
                assert_eq!(*poll_id, 1);
                assert_eq!(*poll_version, 1000);
            }
            other => panic!("expected VoteCast, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_ignored_but_counted() {
        let txn = txn_with_events(vec![RawEvent {
            emitter: "component_1".to_string(),
            event_name: "SomeFutureEvent".to_string(),
            payload: json!({}),
        }]);
        let before = DECODER_UNKNOWN_EVENT_COUNT.get();
        let actions = decode_transaction(&txn, "component_1", &HashSet::new());
        assert!(actions.is_empty());
        assert_eq!(DECODER_UNKNOWN_EVENT_COUNT.get(), before + 1);
    }

    #[test]
    fn events_from_unrelated_emitters_are_filtered_out() {
        let txn = txn_with_events(vec![RawEvent {
            emitter: "some_other_component".to_string(),
            event_name: "VoteCastEvent".to_string(),
            payload: json!({
                "poll_kind": "proposal",
                "poll_id": 1,
                "voter": "account_a",
                "selections": ["for"],
            }),
        }]);
        let actions = decode_transaction(&txn, "component_1", &HashSet::new());
        assert!(actions.is_empty());
    }

    #[test]
    fn events_from_known_child_kvs_are_kept() {
        let mut known = HashSet::new();
        known.insert("kvs_addr_1".to_string());
        let txn = txn_with_events(vec![RawEvent {
            emitter: "kvs_addr_1".to_string(),
            event_name: "VoteRevokedEvent".to_string(),
            payload: json!({"poll_kind": "proposal", "poll_id": 1, "voter": "account_a"}),
        }]);
        let actions = decode_transaction(&txn, "component_1", &known);
        assert_eq!(actions.len(), 1);
    }
}
