//! Pipeline for the harness acting as provider.

use futures::future::BoxFuture;
use serde_json::Value;

use super::handlers;
use super::stage::{RoleStage, StageList};
use super::PipelineContext;
use crate::actions::ProviderActions;
use crate::error::Result;
use crate::protocol::{
    paths, ContractNegotiation, NegotiationRole, NegotiationState, SharedNegotiation,
};
use crate::transport::ExpectedOutcome;

pub(crate) enum ProviderStep {
    InitialOffer {
        dataset_id: String,
        offer_id: String,
    },
    Offer(ExpectedOutcome),
    Agree(ExpectedOutcome),
    Finalize(ExpectedOutcome),
    Terminate(ExpectedOutcome),
}

impl RoleStage for ProviderStep {
    fn name(&self) -> &'static str {
        match self {
            ProviderStep::InitialOffer { .. } => "send initial offer",
            ProviderStep::Offer(_) => "send offer",
            ProviderStep::Agree(_) => "send agreement",
            ProviderStep::Finalize(_) => "send finalized event",
            ProviderStep::Terminate(_) => "send termination",
        }
    }

    fn run<'a>(
        self,
        ctx: &'a PipelineContext,
        negotiation: &'a SharedNegotiation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let actions = ProviderActions::new(ctx.actions.clone());
            match self {
                ProviderStep::InitialOffer {
                    dataset_id,
                    offer_id,
                } => {
                    actions
                        .post_initial_offer(
                            negotiation,
                            &ctx.settings.counterparty_url,
                            &dataset_id,
                            &offer_id,
                            ctx.endpoint.address(),
                        )
                        .await?;
                },
                ProviderStep::Offer(expected) => actions.post_offer(negotiation, expected).await?,
                ProviderStep::Agree(expected) => actions.post_agreed(negotiation, expected).await?,
                ProviderStep::Finalize(expected) => {
                    actions.post_finalized(negotiation, expected).await?;
                },
                ProviderStep::Terminate(expected) => {
                    actions.post_terminated(negotiation, expected).await?;
                },
            }
            Ok(())
        })
    }
}

/// Drives a consumer under test through a negotiation.
///
/// The consumer usually opens the negotiation, so most scenarios start with
/// [`expect_contract_request`](Self::expect_contract_request) and then wait
/// for the consumer to be prompted.
pub struct ProviderPipeline {
    ctx: PipelineContext,
    negotiation: SharedNegotiation,
    stages: StageList<ProviderStep>,
}

impl ProviderPipeline {
    /// Start a pipeline with a fresh provider-side negotiation.
    pub fn new(ctx: PipelineContext) -> Self {
        let mut negotiation = ContractNegotiation::new(NegotiationRole::Provider);
        negotiation.set_counter_party_id(&ctx.settings.counterparty_id);
        Self {
            ctx,
            negotiation: negotiation.shared(),
            stages: StageList::default(),
        }
    }

    /// Handle to the negotiation this pipeline drives.
    pub fn negotiation(&self) -> SharedNegotiation {
        self.negotiation.clone()
    }

    /// Open the negotiation with an offer to the consumer under test.
    pub fn send_initial_offer(mut self, dataset_id: &str, offer_id: &str) -> Self {
        self.stages.push(ProviderStep::InitialOffer {
            dataset_id: dataset_id.to_string(),
            offer_id: offer_id.to_string(),
        });
        self
    }

    /// Send a counter offer.
    pub fn send_offer(mut self) -> Self {
        self.stages.push(ProviderStep::Offer(ExpectedOutcome::Success));
        self
    }

    /// Send an offer the consumer must reject.
    pub fn send_offer_expecting_error(mut self) -> Self {
        self.stages.push(ProviderStep::Offer(ExpectedOutcome::Error));
        self
    }

    /// Send the agreement.
    pub fn send_agreement(mut self) -> Self {
        self.stages.push(ProviderStep::Agree(ExpectedOutcome::Success));
        self
    }

    /// Send an agreement the consumer must reject.
    pub fn send_agreement_expecting_error(mut self) -> Self {
        self.stages.push(ProviderStep::Agree(ExpectedOutcome::Error));
        self
    }

    /// Send the FINALIZED event.
    pub fn send_finalized_event(mut self) -> Self {
        self.stages.push(ProviderStep::Finalize(ExpectedOutcome::Success));
        self
    }

    /// Send a FINALIZED event the consumer must reject.
    pub fn send_finalized_event_expecting_error(mut self) -> Self {
        self.stages.push(ProviderStep::Finalize(ExpectedOutcome::Error));
        self
    }

    /// Terminate the negotiation.
    pub fn send_termination(mut self) -> Self {
        self.stages.push(ProviderStep::Terminate(ExpectedOutcome::Success));
        self
    }

    /// Send a termination the consumer must reject.
    pub fn send_termination_expecting_error(mut self) -> Self {
        self.stages.push(ProviderStep::Terminate(ExpectedOutcome::Error));
        self
    }

    /// Expect the consumer's initial request; the negotiation moves to
    /// REQUESTED and learns the consumer's callback address.
    pub fn expect_contract_request(mut self) -> Self {
        let action = handlers::contract_request(self.ctx.actions.messages());
        self.stages
            .expect(paths::NEGOTIATIONS_REQUEST_PATH, "contract request", action);
        self
    }

    /// Expect a counter request answering an offer.
    pub fn expect_counter_request(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATIONS_COUNTER_REQUEST_PATH,
            "counter request",
            handlers::counter_request(),
        );
        self
    }

    /// Expect the ACCEPTED event.
    pub fn expect_accepted_event(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATION_EVENT_PATH,
            "accepted event",
            handlers::event(NegotiationState::Accepted),
        );
        self
    }

    /// Expect the agreement verification.
    pub fn expect_verification(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATIONS_VERIFICATION_PATH,
            "verification",
            handlers::transition_to(NegotiationState::Verified),
        );
        self
    }

    /// Expect a termination from the consumer.
    pub fn expect_termination(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATIONS_TERMINATION_PATH,
            "termination",
            handlers::transition_to(NegotiationState::Terminated),
        );
        self
    }

    /// Expect a message on `pattern` and handle it with `action`.
    pub fn expect_message<F>(mut self, pattern: &str, description: &str, action: F) -> Self
    where
        F: FnOnce(&Value, &mut ContractNegotiation) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.stages.expect(pattern, description, Box::new(action));
        self
    }

    /// Assert the local state now, without waiting.
    pub fn then_verify_state(mut self, state: NegotiationState) -> Self {
        self.stages.verify_state(state);
        self
    }

    /// Wait for outstanding expectations, then assert the local state.
    pub fn then_wait_for_state(mut self, state: NegotiationState) -> Self {
        self.stages.wait_for_state(state);
        self
    }

    /// Wait for outstanding expectations.
    pub fn then_wait_for_expectations(mut self) -> Self {
        self.stages.wait_for_expectations();
        self
    }

    /// Fetch the consumer's negotiation and assert its state.
    pub fn then_verify_consumer_state(mut self, state: NegotiationState) -> Self {
        self.stages.verify_counterparty_state(state);
        self
    }

    /// Wait for outstanding expectations, then inspect the negotiation.
    pub fn then_verify_negotiation<F>(mut self, inspection: F) -> Self
    where
        F: FnOnce(&ContractNegotiation) -> Result<()> + Send + 'static,
    {
        self.stages.inspect(Box::new(inspection));
        self
    }

    /// Run the declared stages.
    pub async fn execute(&mut self) -> Result<()> {
        let id = self.negotiation.lock().await.id().to_string();
        tracing::info!(negotiation = %id, stages = self.stages.len(), "Executing provider pipeline");
        self.stages.execute(&self.ctx, &self.negotiation).await
    }
}
