//! Messages the harness sends while playing provider.
//!
//! The consumer is reached through the callback address it announced (or the
//! base URL an initial offer was sent to).

use serde_json::Value;
use uuid::Uuid;

use super::ActionContext;
use crate::error::Result;
use crate::protocol::{
    message, paths, ContractNegotiation, NegotiationState, SharedNegotiation,
    DSPACE_PROPERTY_CONSUMER_PID_EXPANDED,
};
use crate::transport::ExpectedOutcome;

/// Provider-side senders.
#[derive(Debug, Clone)]
pub struct ProviderActions {
    ctx: ActionContext,
}

fn consumer_target(record: &ContractNegotiation) -> Result<(&str, &str)> {
    Ok((
        record.require_callback_address()?,
        record.require_correlation_id()?,
    ))
}

impl ProviderActions {
    /// Create from a shared action context.
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    /// Provider-initiated offer to the consumer at `consumer_url`.
    ///
    /// Like the consumer's initial request, the transition waits for the
    /// consumer's process id in the response.
    pub async fn post_initial_offer(
        &self,
        negotiation: &SharedNegotiation,
        consumer_url: &str,
        dataset_id: &str,
        offer_id: &str,
        callback_address: &str,
    ) -> Result<Value> {
        let offer = {
            let mut record = negotiation.lock().await;
            record.set_offer(dataset_id, offer_id);
            self.ctx.messages.offer(
                &record.process_ids(),
                offer_id,
                dataset_id,
                Some(callback_address),
            )
        };

        let url = paths::initial_offer_url(consumer_url);
        tracing::debug!(%url, "Sending initial offer");
        let response = self
            .ctx
            .transport
            .post_json(&url, &offer, ExpectedOutcome::Success, self.ctx.format)
            .await?
            .json()?;

        let consumer_pid =
            message::require_string_id_property(DSPACE_PROPERTY_CONSUMER_PID_EXPANDED, &response)?;
        let mut record = negotiation.lock().await;
        record.confirm_correlation_id(&consumer_pid, NegotiationState::Offered)?;
        record.set_callback_address(consumer_url);
        Ok(response)
    }

    /// Counter offer with a fresh offer id.
    pub async fn post_offer(
        &self,
        negotiation: &SharedNegotiation,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        let offer_id = Uuid::new_v4().to_string();
        self.ctx
            .send(negotiation, NegotiationState::Offered, expected, |record, messages| {
                let (base, consumer_pid) = consumer_target(record)?;
                let dataset_id = record
                    .dataset_id()
                    .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
                let body = messages.offer(&record.process_ids(), &offer_id, &dataset_id, None);
                Ok((paths::offer_url(base, consumer_pid), body))
            })
            .await?;
        Ok(())
    }

    /// Contract agreement with a fresh agreement id.
    pub async fn post_agreed(
        &self,
        negotiation: &SharedNegotiation,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        let agreement_id = Uuid::new_v4().to_string();
        self.ctx
            .send(negotiation, NegotiationState::Agreed, expected, |record, messages| {
                let (base, consumer_pid) = consumer_target(record)?;
                let body = messages.agreement(
                    &record.process_ids(),
                    &agreement_id,
                    record.dataset_id().unwrap_or_default(),
                    record.counter_party_id().unwrap_or_default(),
                );
                Ok((paths::agreement_url(base, consumer_pid), body))
            })
            .await?;
        Ok(())
    }

    /// FINALIZED event.
    pub async fn post_finalized(
        &self,
        negotiation: &SharedNegotiation,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        self.ctx
            .send(negotiation, NegotiationState::Finalized, expected, |record, messages| {
                let (base, consumer_pid) = consumer_target(record)?;
                let body = messages.finalized_event(&record.process_ids());
                Ok((paths::events_url(base, consumer_pid), body))
            })
            .await?;
        Ok(())
    }

    /// Termination.
    pub async fn post_terminated(
        &self,
        negotiation: &SharedNegotiation,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        self.ctx
            .send(negotiation, NegotiationState::Terminated, expected, |record, messages| {
                let (base, consumer_pid) = consumer_target(record)?;
                let body = messages.termination(&record.process_ids(), "1");
                Ok((paths::termination_url(base, consumer_pid, true), body))
            })
            .await?;
        Ok(())
    }

    /// URL of the consumer's view of this negotiation.
    pub async fn negotiation_url(&self, negotiation: &SharedNegotiation) -> Result<String> {
        let record = negotiation.lock().await;
        let (base, consumer_pid) = consumer_target(&record)?;
        Ok(paths::negotiation_url(base, consumer_pid))
    }
}
