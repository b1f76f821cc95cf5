//! In-memory negotiation record.
//!
//! A [`ContractNegotiation`] is the harness-side view of one negotiation.
//! All state changes go through [`ContractNegotiation::transition`] or
//! [`ContractNegotiation::set_correlation_id`], which validate against the
//! role's transition table and leave the record untouched on failure.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::state::{NegotiationRole, NegotiationState};
use crate::error::{Result, TckError};

/// Negotiation record shared between the pipeline task and inbound handlers.
pub type SharedNegotiation = Arc<Mutex<ContractNegotiation>>;

/// DSP process ids of both parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIds {
    /// Consumer-side negotiation id
    pub consumer_pid: Option<String>,
    /// Provider-side negotiation id
    pub provider_pid: Option<String>,
}

/// Contract negotiation tracked by the harness
#[derive(Debug, Clone)]
pub struct ContractNegotiation {
    /// Local id (our process id)
    id: String,
    /// Role the harness plays
    role: NegotiationRole,
    /// Counterparty process id, learned once
    correlation_id: Option<String>,
    /// Dataset under negotiation
    dataset_id: Option<String>,
    /// Offer under negotiation
    offer_id: Option<String>,
    /// Counterparty participant id
    counter_party_id: Option<String>,
    /// Where the counterparty receives callbacks
    callback_address: Option<String>,
    /// Current state, `None` until the first transition
    state: Option<NegotiationState>,
    /// States entered so far, oldest first
    history: Vec<NegotiationState>,
}

impl ContractNegotiation {
    /// Create a record with a fresh local id.
    pub fn new(role: NegotiationRole) -> Self {
        Self::with_id(&uuid::Uuid::new_v4().to_string(), role)
    }

    /// Create a record with a known local id.
    pub fn with_id(id: &str, role: NegotiationRole) -> Self {
        Self {
            id: id.to_string(),
            role,
            correlation_id: None,
            dataset_id: None,
            offer_id: None,
            counter_party_id: None,
            callback_address: None,
            state: None,
            history: Vec::new(),
        }
    }

    /// Wrap into the shared handle used by pipelines.
    pub fn shared(self) -> SharedNegotiation {
        Arc::new(Mutex::new(self))
    }

    /// Local id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Role the harness plays
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Current state
    pub fn state(&self) -> Option<NegotiationState> {
        self.state
    }

    /// States entered so far
    pub fn history(&self) -> &[NegotiationState] {
        &self.history
    }

    /// Counterparty id, if known
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Counterparty id, or an error naming this negotiation.
    pub fn require_correlation_id(&self) -> Result<&str> {
        self.correlation_id
            .as_deref()
            .ok_or_else(|| TckError::MissingCorrelationId(self.id.clone()))
    }

    /// Dataset id
    pub fn dataset_id(&self) -> Option<&str> {
        self.dataset_id.as_deref()
    }

    /// Offer id
    pub fn offer_id(&self) -> Option<&str> {
        self.offer_id.as_deref()
    }

    /// Counterparty participant id
    pub fn counter_party_id(&self) -> Option<&str> {
        self.counter_party_id.as_deref()
    }

    /// Counterparty callback address
    pub fn callback_address(&self) -> Option<&str> {
        self.callback_address.as_deref()
    }

    /// Counterparty callback address, or an error if it was never learned.
    pub fn require_callback_address(&self) -> Result<&str> {
        self.callback_address.as_deref().ok_or_else(|| {
            TckError::InvalidMessage(format!(
                "negotiation {} has no counterparty callback address",
                self.id
            ))
        })
    }

    /// Record the dataset and offer under negotiation.
    pub fn set_offer(&mut self, dataset_id: &str, offer_id: &str) {
        self.dataset_id = Some(dataset_id.to_string());
        self.offer_id = Some(offer_id.to_string());
    }

    /// Record the counterparty participant id.
    pub fn set_counter_party_id(&mut self, id: &str) {
        self.counter_party_id = Some(id.to_string());
    }

    /// Record the counterparty callback address.
    pub fn set_callback_address(&mut self, address: &str) {
        self.callback_address = Some(address.trim_end_matches('/').to_string());
    }

    /// Whether the record reached FINALIZED or TERMINATED.
    pub fn is_terminal(&self) -> bool {
        self.state.is_some_and(|s| s.is_terminal())
    }

    /// Move to `target` if it is an outgoing edge of the current state.
    pub fn transition(&mut self, target: NegotiationState) -> Result<()> {
        self.check_transition(target)?;
        tracing::debug!(
            negotiation = %self.id,
            role = %self.role,
            from = ?self.state,
            to = %target,
            "transition"
        );
        self.state = Some(target);
        self.history.push(target);
        Ok(())
    }

    /// Set the counterparty-assigned id and transition in one step.
    ///
    /// Both the transition and the id are checked before anything changes; a
    /// second id is rejected.
    pub fn set_correlation_id(&mut self, id: &str, target: NegotiationState) -> Result<()> {
        if let Some(existing) = &self.correlation_id {
            return Err(TckError::CorrelationIdAlreadySet {
                existing: existing.clone(),
                attempted: id.to_string(),
            });
        }
        self.check_transition(target)?;
        self.correlation_id = Some(id.to_string());
        self.transition(target)
    }

    /// Record the id returned by the counterparty for a message this side
    /// opened the negotiation with.
    ///
    /// An inbound message may have delivered the same id first, in which
    /// case the record keeps the state that message moved it to. A
    /// different id is rejected.
    pub fn confirm_correlation_id(&mut self, id: &str, target: NegotiationState) -> Result<()> {
        match self.correlation_id.as_deref() {
            None => self.set_correlation_id(id, target),
            Some(existing) if existing == id => Ok(()),
            Some(existing) => Err(TckError::CorrelationIdAlreadySet {
                existing: existing.to_string(),
                attempted: id.to_string(),
            }),
        }
    }

    /// Process ids as seen on the wire.
    pub fn process_ids(&self) -> ProcessIds {
        let local = Some(self.id.clone());
        let remote = self.correlation_id.clone();
        match self.role {
            NegotiationRole::Consumer => ProcessIds {
                consumer_pid: local,
                provider_pid: remote,
            },
            NegotiationRole::Provider => ProcessIds {
                consumer_pid: remote,
                provider_pid: local,
            },
        }
    }

    fn check_transition(&self, target: NegotiationState) -> Result<()> {
        if self.role.can_transition(self.state, target) {
            Ok(())
        } else {
            Err(TckError::IllegalStateTransition {
                role: self.role,
                from: self.state,
                to: target,
            })
        }
    }
}
