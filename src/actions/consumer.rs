//! Messages the harness sends while playing consumer.

use serde_json::Value;

use super::ActionContext;
use crate::error::Result;
use crate::protocol::{
    message, paths, NegotiationState, SharedNegotiation, DSPACE_PROPERTY_PROVIDER_PID_EXPANDED,
};
use crate::transport::ExpectedOutcome;

/// Consumer-side senders against one provider.
#[derive(Debug, Clone)]
pub struct ConsumerActions {
    ctx: ActionContext,
    provider_url: String,
}

impl ConsumerActions {
    /// Create for the provider at `provider_url` (its DSP base URL).
    pub fn new(ctx: ActionContext, provider_url: &str) -> Self {
        Self {
            ctx,
            provider_url: provider_url.trim_end_matches('/').to_string(),
        }
    }

    /// Provider base URL
    pub fn provider_url(&self) -> &str {
        &self.provider_url
    }

    /// Initial contract request.
    ///
    /// The provider assigns its process id in the response, so the record
    /// moves to REQUESTED only after the call succeeds. Returns the response.
    pub async fn post_request(
        &self,
        negotiation: &SharedNegotiation,
        dataset_id: &str,
        offer_id: &str,
        callback_address: &str,
    ) -> Result<Value> {
        let request = {
            let mut record = negotiation.lock().await;
            record.set_offer(dataset_id, offer_id);
            self.ctx.messages.contract_request(
                &record.process_ids(),
                offer_id,
                dataset_id,
                Some(callback_address),
            )
        };

        let url = paths::request_url(&self.provider_url);
        tracing::debug!(%url, "Sending contract request");
        let response = self
            .ctx
            .transport
            .post_json(&url, &request, ExpectedOutcome::Success, self.ctx.format)
            .await?
            .json()?;

        let provider_pid =
            message::require_string_id_property(DSPACE_PROPERTY_PROVIDER_PID_EXPANDED, &response)?;
        negotiation
            .lock()
            .await
            .confirm_correlation_id(&provider_pid, NegotiationState::Requested)?;
        Ok(response)
    }

    /// Counter request answering the provider's last offer.
    pub async fn post_counter_request(
        &self,
        negotiation: &SharedNegotiation,
        offer_id: &str,
        dataset_id: &str,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        let base = &self.provider_url;
        self.ctx
            .send(negotiation, NegotiationState::Requested, expected, |record, messages| {
                let provider_pid = record.require_correlation_id()?;
                let body =
                    messages.contract_request(&record.process_ids(), offer_id, dataset_id, None);
                Ok((paths::counter_request_url(base, provider_pid), body))
            })
            .await?;

        if expected == ExpectedOutcome::Success {
            negotiation.lock().await.set_offer(dataset_id, offer_id);
        }
        Ok(())
    }

    /// ACCEPTED event for the last offer.
    pub async fn post_accepted(&self, negotiation: &SharedNegotiation) -> Result<()> {
        let base = &self.provider_url;
        self.ctx
            .send(
                negotiation,
                NegotiationState::Accepted,
                ExpectedOutcome::Success,
                |record, messages| {
                    let provider_pid = record.require_correlation_id()?;
                    let body = messages.accepted_event(&record.process_ids());
                    Ok((paths::events_url(base, provider_pid), body))
                },
            )
            .await?;
        Ok(())
    }

    /// Agreement verification.
    pub async fn post_verification(
        &self,
        negotiation: &SharedNegotiation,
        expected: ExpectedOutcome,
    ) -> Result<()> {
        let base = &self.provider_url;
        self.ctx
            .send(negotiation, NegotiationState::Verified, expected, |record, messages| {
                let provider_pid = record.require_correlation_id()?;
                let body = messages.verification(&record.process_ids());
                Ok((paths::verification_url(base, provider_pid), body))
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
        let base = &self.provider_url;
        self.ctx
            .send(negotiation, NegotiationState::Terminated, expected, |record, messages| {
                let provider_pid = record.require_correlation_id()?;
                let body = messages.termination(&record.process_ids(), "1");
                Ok((paths::termination_url(base, provider_pid, false), body))
            })
            .await?;
        Ok(())
    }

    /// URL of the provider's view of this negotiation.
    pub async fn negotiation_url(&self, negotiation: &SharedNegotiation) -> Result<String> {
        let record = negotiation.lock().await;
        Ok(paths::negotiation_url(
            &self.provider_url,
            record.require_correlation_id()?,
        ))
    }
}
