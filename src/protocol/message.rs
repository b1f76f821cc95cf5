//! Wire envelope helpers and the message construction seam.
//!
//! Messages travel as compact JSON-LD. The harness never runs a full
//! linked-data processor; it resolves the handful of namespaced properties it
//! reads (`state`, `providerPid`, `consumerPid`, `eventType`) against the
//! prefixes declared in the message `@context`.
//!
//! Building message bodies belongs to [`NegotiationMessages`]. The bundled
//! [`DspMessages`] produces minimal compact messages that carry everything a
//! SUT needs to correlate a negotiation.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use super::negotiation::ProcessIds;
use super::state::NegotiationState;
use super::{
    DSPACE_NAMESPACE, DSPACE_PROPERTY_CONSUMER_PID_EXPANDED, DSPACE_PROPERTY_EVENT_TYPE_EXPANDED,
    DSPACE_PROPERTY_PROVIDER_PID_EXPANDED, DSPACE_PROPERTY_STATE_EXPANDED, ODRL_NAMESPACE,
};
use crate::error::{Result, TckError};

/// How an outbound message body is framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyFormat {
    /// Compact JSON-LD; a default `@context` is added when missing
    #[default]
    JsonLd,
    /// The value as-is, without linked-data framing
    PlainJson,
}

/// Context added to outbound JSON-LD messages that carry none.
pub fn default_context() -> Value {
    json!({
        "dspace": DSPACE_NAMESPACE,
        "odrl": ODRL_NAMESPACE,
    })
}

/// Serialize a message for the wire.
pub fn encode(message: &Value, format: BodyFormat) -> Result<Vec<u8>> {
    match (format, message) {
        (BodyFormat::JsonLd, Value::Object(map)) if !map.contains_key("@context") => {
            let mut framed = Map::with_capacity(map.len() + 1);
            framed.insert("@context".to_string(), default_context());
            framed.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(serde_json::to_vec(&Value::Object(framed))?)
        },
        _ => Ok(serde_json::to_vec(message)?),
    }
}

/// Decode an inbound or response body.
pub fn decode(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(TckError::InvalidMessage("empty message body".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Prefix table used to expand compact keys and values.
#[derive(Debug, Clone)]
pub struct Namespaces {
    prefixes: HashMap<String, String>,
    vocab: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("dspace".to_string(), DSPACE_NAMESPACE.to_string());
        prefixes.insert("odrl".to_string(), ODRL_NAMESPACE.to_string());
        Self {
            prefixes,
            vocab: DSPACE_NAMESPACE.to_string(),
        }
    }
}

impl Namespaces {
    /// Build the table from a message's `@context`.
    ///
    /// Bare terms fall back to the DSP vocabulary unless `@vocab` says otherwise.
    pub fn from_message(message: &Value) -> Self {
        let mut namespaces = Self::default();
        if let Some(context) = message.get("@context") {
            namespaces.absorb(context);
        }
        namespaces
    }

    fn absorb(&mut self, context: &Value) {
        match context {
            Value::Object(map) => {
                for (term, definition) in map {
                    let Some(iri) = definition.as_str() else {
                        continue;
                    };
                    if term == "@vocab" {
                        self.vocab = iri.to_string();
                    } else {
                        self.prefixes.insert(term.clone(), iri.to_string());
                    }
                }
            },
            Value::Array(items) => items.iter().for_each(|item| self.absorb(item)),
            _ => {},
        }
    }

    /// Expand a property key.
    pub fn expand_key(&self, term: &str) -> String {
        if term.starts_with('@') || is_absolute(term) {
            return term.to_string();
        }
        self.expand_prefixed(term)
            .unwrap_or_else(|| format!("{}{term}", self.vocab))
    }

    /// Expand a compact IRI value; unknown prefixes and bare strings are kept.
    pub fn expand_value(&self, value: &str) -> String {
        if is_absolute(value) {
            return value.to_string();
        }
        self.expand_prefixed(value)
            .unwrap_or_else(|| value.to_string())
    }

    fn expand_prefixed(&self, term: &str) -> Option<String> {
        let (prefix, local) = term.split_once(':')?;
        self.prefixes.get(prefix).map(|iri| format!("{iri}{local}"))
    }
}

fn is_absolute(term: &str) -> bool {
    term.starts_with("http://") || term.starts_with("https://") || term.starts_with("urn:")
}

/// Find a property by its expanded key.
pub fn property<'a>(expanded_key: &str, message: &'a Value) -> Option<&'a Value> {
    let object = message.as_object()?;
    if let Some(value) = object.get(expanded_key) {
        return Some(value);
    }
    let namespaces = Namespaces::from_message(message);
    object
        .iter()
        .find(|(key, _)| namespaces.expand_key(key) == expanded_key)
        .map(|(_, value)| value)
}

/// Read a property as an id string, unwrapping `@id`/`@value` objects and arrays.
pub fn string_id_property(expanded_key: &str, message: &Value) -> Option<String> {
    let namespaces = Namespaces::from_message(message);
    property(expanded_key, message)
        .and_then(id_string)
        .map(|raw| namespaces.expand_value(&raw))
}

/// Like [`string_id_property`], failing when the property is missing.
pub fn require_string_id_property(expanded_key: &str, message: &Value) -> Result<String> {
    string_id_property(expanded_key, message)
        .ok_or_else(|| TckError::InvalidMessage(format!("missing property {expanded_key}")))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("@id")
            .or_else(|| map.get("@value"))
            .and_then(id_string),
        Value::Array(items) => items.first().and_then(id_string),
        _ => None,
    }
}

/// Namespaced state value, e.g. `https://w3id.org/dspace/v0.8/FINALIZED`.
///
/// Bare state names are qualified with the DSP namespace.
pub fn state_property(message: &Value) -> Option<String> {
    string_id_property(DSPACE_PROPERTY_STATE_EXPANDED, message).map(|state| {
        if is_absolute(&state) {
            state
        } else {
            format!("{DSPACE_NAMESPACE}{state}")
        }
    })
}

/// Event type of a negotiation event message.
pub fn event_type(message: &Value) -> Option<NegotiationState> {
    string_id_property(DSPACE_PROPERTY_EVENT_TYPE_EXPANDED, message)
        .and_then(|value| value.parse().ok())
}

/// Process ids carried by a message.
pub fn process_ids(message: &Value) -> ProcessIds {
    ProcessIds {
        consumer_pid: string_id_property(DSPACE_PROPERTY_CONSUMER_PID_EXPANDED, message),
        provider_pid: string_id_property(DSPACE_PROPERTY_PROVIDER_PID_EXPANDED, message),
    }
}

/// Construction of negotiation messages.
///
/// Implementations decide the exact vocabulary; the harness only relies on
/// the process ids, state and event type properties.
pub trait NegotiationMessages: Send + Sync {
    /// Consumer → provider: initial or counter request.
    fn contract_request(
        &self,
        ids: &ProcessIds,
        offer_id: &str,
        dataset_id: &str,
        callback_address: Option<&str>,
    ) -> Value;

    /// Consumer → provider: offer accepted.
    fn accepted_event(&self, ids: &ProcessIds) -> Value;

    /// Consumer → provider: agreement verified.
    fn verification(&self, ids: &ProcessIds) -> Value;

    /// Either party: negotiation terminated.
    fn termination(&self, ids: &ProcessIds, code: &str) -> Value;

    /// Provider → consumer: initial or counter offer.
    fn offer(
        &self,
        ids: &ProcessIds,
        offer_id: &str,
        dataset_id: &str,
        callback_address: Option<&str>,
    ) -> Value;

    /// Provider → consumer: agreement.
    fn agreement(
        &self,
        ids: &ProcessIds,
        agreement_id: &str,
        dataset_id: &str,
        assignee: &str,
    ) -> Value;

    /// Provider → consumer: negotiation finalized.
    fn finalized_event(&self, ids: &ProcessIds) -> Value;

    /// Negotiation resource returned from requests and GETs.
    fn negotiation(&self, ids: &ProcessIds, state: NegotiationState) -> Value;
}

/// Minimal compact DSP messages.
#[derive(Debug, Clone)]
pub struct DspMessages {
    participant_id: String,
}

impl Default for DspMessages {
    fn default() -> Self {
        Self::new(super::TCK_PARTICIPANT_ID)
    }
}

impl DspMessages {
    /// Create with the participant id the harness signs offers with.
    pub fn new(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_string(),
        }
    }

    fn envelope(message_type: &str, ids: &ProcessIds) -> Map<String, Value> {
        let mut message = Map::new();
        message.insert("@context".to_string(), default_context());
        message.insert("@type".to_string(), json!(format!("dspace:{message_type}")));
        if let Some(pid) = &ids.provider_pid {
            message.insert("dspace:providerPid".to_string(), json!(pid));
        }
        if let Some(pid) = &ids.consumer_pid {
            message.insert("dspace:consumerPid".to_string(), json!(pid));
        }
        message
    }

    fn event(ids: &ProcessIds, event: NegotiationState) -> Value {
        let mut message = Self::envelope("ContractNegotiationEventMessage", ids);
        message.insert(
            "dspace:eventType".to_string(),
            json!(format!("dspace:{event}")),
        );
        Value::Object(message)
    }

    fn odrl_offer(&self, offer_id: &str, dataset_id: &str) -> Value {
        json!({
            "@type": "odrl:Offer",
            "@id": offer_id,
            "odrl:target": { "@id": dataset_id },
            "odrl:assigner": { "@id": self.participant_id },
        })
    }
}

impl NegotiationMessages for DspMessages {
    fn contract_request(
        &self,
        ids: &ProcessIds,
        offer_id: &str,
        dataset_id: &str,
        callback_address: Option<&str>,
    ) -> Value {
        let mut message = Self::envelope("ContractRequestMessage", ids);
        message.insert(
            "dspace:offer".to_string(),
            json!({
                "@type": "odrl:Offer",
                "@id": offer_id,
                "odrl:target": { "@id": dataset_id },
            }),
        );
        if let Some(address) = callback_address {
            message.insert("dspace:callbackAddress".to_string(), json!(address));
        }
        Value::Object(message)
    }

    fn accepted_event(&self, ids: &ProcessIds) -> Value {
        Self::event(ids, NegotiationState::Accepted)
    }

    fn verification(&self, ids: &ProcessIds) -> Value {
        Value::Object(Self::envelope("ContractAgreementVerificationMessage", ids))
    }

    fn termination(&self, ids: &ProcessIds, code: &str) -> Value {
        let mut message = Self::envelope("ContractNegotiationTerminationMessage", ids);
        message.insert("dspace:code".to_string(), json!(code));
        Value::Object(message)
    }

    fn offer(
        &self,
        ids: &ProcessIds,
        offer_id: &str,
        dataset_id: &str,
        callback_address: Option<&str>,
    ) -> Value {
        let mut message = Self::envelope("ContractOfferMessage", ids);
        message.insert("dspace:offer".to_string(), self.odrl_offer(offer_id, dataset_id));
        if let Some(address) = callback_address {
            message.insert("dspace:callbackAddress".to_string(), json!(address));
        }
        Value::Object(message)
    }

    fn agreement(
        &self,
        ids: &ProcessIds,
        agreement_id: &str,
        dataset_id: &str,
        assignee: &str,
    ) -> Value {
        let mut message = Self::envelope("ContractAgreementMessage", ids);
        message.insert(
            "dspace:agreement".to_string(),
            json!({
                "@type": "odrl:Agreement",
                "@id": agreement_id,
                "odrl:target": { "@id": dataset_id },
                "odrl:assigner": { "@id": self.participant_id },
                "odrl:assignee": { "@id": assignee },
                "dspace:timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
        Value::Object(message)
    }

    fn finalized_event(&self, ids: &ProcessIds) -> Value {
        Self::event(ids, NegotiationState::Finalized)
    }

    fn negotiation(&self, ids: &ProcessIds, state: NegotiationState) -> Value {
        let mut message = Self::envelope("ContractNegotiation", ids);
        message.insert("dspace:state".to_string(), json!(format!("dspace:{state}")));
        Value::Object(message)
    }
}
