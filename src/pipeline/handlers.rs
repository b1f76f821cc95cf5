//! Default inbound actions.
//!
//! Every default action checks the process ids carried by the message
//! against the negotiation. The first message from the counterparty supplies
//! its process id; later messages must repeat it.

use std::sync::Arc;

use serde_json::Value;

use super::stage::InboundAction;
use crate::error::{Result, TckError};
use crate::protocol::{
    message, ContractNegotiation, NegotiationMessages, NegotiationRole, NegotiationState,
    ProcessIds, DSPACE_NAMESPACE, DSPACE_PROPERTY_CALLBACK_ADDRESS_EXPANDED, ODRL_NAMESPACE,
};

fn check_pid(name: &str, known: Option<&str>, inbound: Option<&str>) -> Result<()> {
    match (known, inbound) {
        (Some(known), Some(inbound)) if known != inbound => Err(TckError::InvalidMessage(format!(
            "{name} '{inbound}' does not match negotiation ('{known}')"
        ))),
        _ => Ok(()),
    }
}

fn check_ids(record: &ContractNegotiation, inbound: &ProcessIds) -> Result<()> {
    let known = record.process_ids();
    check_pid(
        "consumerPid",
        known.consumer_pid.as_deref(),
        inbound.consumer_pid.as_deref(),
    )?;
    check_pid(
        "providerPid",
        known.provider_pid.as_deref(),
        inbound.provider_pid.as_deref(),
    )
}

/// Validate ids, then transition, learning the correlation id if needed.
fn advance(record: &mut ContractNegotiation, message: &Value, target: NegotiationState) -> Result<()> {
    let inbound = message::process_ids(message);
    check_ids(record, &inbound)?;

    let remote = match record.role() {
        NegotiationRole::Consumer => inbound.provider_pid,
        NegotiationRole::Provider => inbound.consumer_pid,
    };
    match (record.correlation_id(), remote) {
        (None, Some(remote)) => record.set_correlation_id(&remote, target),
        (None, None) => Err(TckError::InvalidMessage(format!(
            "message carries no {} process id",
            record.role().counterpart()
        ))),
        (Some(_), _) => record.transition(target),
    }
}

/// Dataset and offer ids of the `offer` property, if present.
fn offer_ids(message: &Value) -> Option<(String, String)> {
    let offer = message::property(&format!("{DSPACE_NAMESPACE}offer"), message)?;
    let offer_id = offer.get("@id")?.as_str()?.to_string();
    let target = message::property(&format!("{ODRL_NAMESPACE}target"), offer)
        .or_else(|| offer.get("odrl:target"))?;
    let dataset_id = match target {
        Value::String(id) => id.clone(),
        other => other.get("@id")?.as_str()?.to_string(),
    };
    Some((dataset_id, offer_id))
}

/// Transition to `target`, reply with an empty 200.
pub(super) fn transition_to(target: NegotiationState) -> InboundAction {
    Box::new(
        move |message: &Value, record: &mut ContractNegotiation| -> Result<Option<Value>> {
            advance(record, message, target)?;
            Ok(None)
        },
    )
}

/// Require an event of type `event`, then transition to it.
pub(super) fn event(event: NegotiationState) -> InboundAction {
    Box::new(
        move |message: &Value, record: &mut ContractNegotiation| -> Result<Option<Value>> {
            match message::event_type(message) {
                Some(actual) if actual == event => {},
                actual => {
                    return Err(TckError::InvalidMessage(format!(
                        "expected {event} event, got {}",
                        actual.map_or_else(|| "none".to_string(), |s| s.to_string())
                    )))
                },
            }
            advance(record, message, event)?;
            Ok(None)
        },
    )
}

/// Consumer side: offer from the provider, answered with the negotiation.
pub(super) fn offer(messages: Arc<dyn NegotiationMessages>) -> InboundAction {
    Box::new(
        move |message: &Value, record: &mut ContractNegotiation| -> Result<Option<Value>> {
            advance(record, message, NegotiationState::Offered)?;
            if let Some((dataset_id, offer_id)) = offer_ids(message) {
                record.set_offer(&dataset_id, &offer_id);
            }
            Ok(Some(
                messages.negotiation(&record.process_ids(), NegotiationState::Offered),
            ))
        },
    )
}

/// Provider side: initial contract request, answered with the negotiation.
///
/// Records the consumer's process id, callback address and offer.
pub(super) fn contract_request(messages: Arc<dyn NegotiationMessages>) -> InboundAction {
    Box::new(
        move |message: &Value, record: &mut ContractNegotiation| -> Result<Option<Value>> {
            let callback_address = message::require_string_id_property(
                DSPACE_PROPERTY_CALLBACK_ADDRESS_EXPANDED,
                message,
            )?;
            advance(record, message, NegotiationState::Requested)?;
            record.set_callback_address(&callback_address);
            if let Some((dataset_id, offer_id)) = offer_ids(message) {
                record.set_offer(&dataset_id, &offer_id);
            }
            Ok(Some(
                messages.negotiation(&record.process_ids(), NegotiationState::Requested),
            ))
        },
    )
}

/// Provider side: counter request answering an offer.
pub(super) fn counter_request() -> InboundAction {
    Box::new(
        move |message: &Value, record: &mut ContractNegotiation| -> Result<Option<Value>> {
            advance(record, message, NegotiationState::Requested)?;
            if let Some((dataset_id, offer_id)) = offer_ids(message) {
                record.set_offer(&dataset_id, &offer_id);
            }
            Ok(None)
        },
    )
}
