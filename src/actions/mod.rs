//! Role-specific protocol senders.
//!
//! Each action pairs a local state transition with one outbound message. The
//! transition is applied first, under the negotiation lock, and the lock is
//! released before the network call. Actions that expect the counterparty to
//! reject the message leave the record untouched.

mod consumer;
mod provider;

pub use consumer::ConsumerActions;
pub use provider::ProviderActions;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, TckError};
use crate::protocol::{
    message, BodyFormat, ContractNegotiation, DspMessages, NegotiationMessages, NegotiationState,
    SharedNegotiation,
};
use crate::transport::{ExpectedOutcome, HttpTransport, TransportResponse};

/// Transport, message construction and wire framing shared by all actions.
#[derive(Clone)]
pub struct ActionContext {
    transport: Arc<HttpTransport>,
    messages: Arc<dyn NegotiationMessages>,
    format: BodyFormat,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("transport", &self.transport)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    /// Create with the default message builder.
    pub fn new(transport: HttpTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            messages: Arc::new(DspMessages::default()),
            format: BodyFormat::default(),
        }
    }

    /// Replace the message builder.
    pub fn with_messages(mut self, messages: impl NegotiationMessages + 'static) -> Self {
        self.messages = Arc::new(messages);
        self
    }

    /// Replace the body framing.
    pub fn with_format(mut self, format: BodyFormat) -> Self {
        self.format = format;
        self
    }

    /// HTTP transport
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Message builder
    pub fn messages(&self) -> Arc<dyn NegotiationMessages> {
        Arc::clone(&self.messages)
    }

    /// Build a message from the record, transition unless an error is
    /// expected, then post.
    ///
    /// `prepare` returns the target URL and body. It runs under the lock, so
    /// the message and the transition see the same record.
    pub(crate) async fn send<F>(
        &self,
        negotiation: &SharedNegotiation,
        target: NegotiationState,
        expected: ExpectedOutcome,
        prepare: F,
    ) -> Result<TransportResponse>
    where
        F: FnOnce(&ContractNegotiation, &dyn NegotiationMessages) -> Result<(String, Value)>,
    {
        let (url, body) = {
            let mut record = negotiation.lock().await;
            let prepared = prepare(&record, self.messages.as_ref())?;
            if expected == ExpectedOutcome::Success {
                record.transition(target)?;
            }
            prepared
        };

        tracing::debug!(%url, %target, ?expected, "Sending message");
        self.transport
            .post_json(&url, &body, expected, self.format)
            .await
    }

    /// GET a negotiation resource and compare its state with `expected`.
    pub async fn verify_remote_state(&self, url: &str, expected: NegotiationState) -> Result<()> {
        let response = self.transport.get_json(url, ExpectedOutcome::Success).await?;
        let negotiation = response.json()?;
        let actual = message::state_property(&negotiation);
        let expected = expected.namespaced();

        match actual {
            Some(actual) if actual == expected => Ok(()),
            actual => Err(TckError::StateMismatch {
                expected,
                actual: actual.unwrap_or_else(|| "<missing>".to_string()),
            }),
        }
    }
}
