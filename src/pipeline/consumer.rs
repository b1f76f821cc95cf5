//! Pipeline for the harness acting as consumer.

use futures::future::BoxFuture;
use serde_json::Value;

use super::handlers;
use super::stage::{RoleStage, StageList};
use super::PipelineContext;
use crate::actions::ConsumerActions;
use crate::error::Result;
use crate::protocol::{
    paths, ContractNegotiation, NegotiationRole, NegotiationState, SharedNegotiation,
};
use crate::transport::ExpectedOutcome;

/// Outbound stages of the consumer role.
pub(crate) enum ConsumerStep {
    Request {
        dataset_id: String,
        offer_id: String,
    },
    CounterRequest {
        offer_id: String,
        dataset_id: String,
        expected: ExpectedOutcome,
    },
    Accept,
    Verify(ExpectedOutcome),
    Terminate(ExpectedOutcome),
}

impl RoleStage for ConsumerStep {
    fn name(&self) -> &'static str {
        match self {
            ConsumerStep::Request { .. } => "send request",
            ConsumerStep::CounterRequest { .. } => "send counter request",
            ConsumerStep::Accept => "accept last offer",
            ConsumerStep::Verify(_) => "send verification",
            ConsumerStep::Terminate(_) => "send termination",
        }
    }

    fn run<'a>(
        self,
        ctx: &'a PipelineContext,
        negotiation: &'a SharedNegotiation,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let actions = ConsumerActions::new(ctx.actions.clone(), &ctx.settings.counterparty_url);
            match self {
                ConsumerStep::Request {
                    dataset_id,
                    offer_id,
                } => {
                    actions
                        .post_request(negotiation, &dataset_id, &offer_id, ctx.endpoint.address())
                        .await?;
                },
                ConsumerStep::CounterRequest {
                    offer_id,
                    dataset_id,
                    expected,
                } => {
                    actions
                        .post_counter_request(negotiation, &offer_id, &dataset_id, expected)
                        .await?;
                },
                ConsumerStep::Accept => actions.post_accepted(negotiation).await?,
                ConsumerStep::Verify(expected) => {
                    tokio::time::sleep(ctx.settings.pause).await;
                    actions.post_verification(negotiation, expected).await?;
                },
                ConsumerStep::Terminate(expected) => {
                    actions.post_terminated(negotiation, expected).await?;
                },
            }
            Ok(())
        })
    }
}

/// Drives a provider under test through a negotiation.
///
/// Declaration methods append a stage and return the pipeline; nothing runs
/// until [`execute`](Self::execute).
pub struct ConsumerPipeline {
    ctx: PipelineContext,
    negotiation: SharedNegotiation,
    stages: StageList<ConsumerStep>,
}

impl ConsumerPipeline {
    /// Start a pipeline with a fresh consumer-side negotiation.
    pub fn new(ctx: PipelineContext) -> Self {
        let mut negotiation = ContractNegotiation::new(NegotiationRole::Consumer);
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

    /// Send the initial contract request for `offer_id` on `dataset_id`.
    pub fn send_request_message(mut self, dataset_id: &str, offer_id: &str) -> Self {
        self.stages.push(ConsumerStep::Request {
            dataset_id: dataset_id.to_string(),
            offer_id: offer_id.to_string(),
        });
        self
    }

    /// Answer the last offer with a counter request.
    pub fn send_counter_request(mut self, offer_id: &str, dataset_id: &str) -> Self {
        self.stages.push(ConsumerStep::CounterRequest {
            offer_id: offer_id.to_string(),
            dataset_id: dataset_id.to_string(),
            expected: ExpectedOutcome::Success,
        });
        self
    }

    /// Send a counter request the provider must reject.
    pub fn send_counter_request_expecting_error(mut self, offer_id: &str, dataset_id: &str) -> Self {
        self.stages.push(ConsumerStep::CounterRequest {
            offer_id: offer_id.to_string(),
            dataset_id: dataset_id.to_string(),
            expected: ExpectedOutcome::Error,
        });
        self
    }

    /// Accept the last offer.
    pub fn accept_last_offer(mut self) -> Self {
        self.stages.push(ConsumerStep::Accept);
        self
    }

    /// Verify the agreement.
    pub fn send_verified_event(mut self) -> Self {
        self.stages.push(ConsumerStep::Verify(ExpectedOutcome::Success));
        self
    }

    /// Send a verification the provider must reject.
    pub fn send_verified_event_expecting_error(mut self) -> Self {
        self.stages.push(ConsumerStep::Verify(ExpectedOutcome::Error));
        self
    }

    /// Terminate the negotiation.
    pub fn send_termination(mut self) -> Self {
        self.stages.push(ConsumerStep::Terminate(ExpectedOutcome::Success));
        self
    }

    /// Send a termination the provider must reject.
    pub fn send_termination_expecting_error(mut self) -> Self {
        self.stages.push(ConsumerStep::Terminate(ExpectedOutcome::Error));
        self
    }

    /// Expect an offer; the negotiation moves to OFFERED.
    pub fn expect_offer(mut self) -> Self {
        let action = handlers::offer(self.ctx.actions.messages());
        self.stages
            .expect(paths::NEGOTIATIONS_OFFER_PATH, "offer", action);
        self
    }

    /// Expect the agreement; the negotiation moves to AGREED.
    pub fn expect_agreement(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATIONS_AGREEMENT_PATH,
            "agreement",
            handlers::transition_to(NegotiationState::Agreed),
        );
        self
    }

    /// Expect the FINALIZED event.
    pub fn expect_finalized_event(mut self) -> Self {
        self.stages.expect(
            paths::NEGOTIATION_EVENT_PATH,
            "finalized event",
            handlers::event(NegotiationState::Finalized),
        );
        self
    }

    /// Expect a termination from the provider.
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

    /// Fetch the provider's negotiation and assert its state.
    pub fn then_verify_provider_state(mut self, state: NegotiationState) -> Self {
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
        tracing::info!(negotiation = %id, stages = self.stages.len(), "Executing consumer pipeline");
        self.stages.execute(&self.ctx, &self.negotiation).await
    }
}
