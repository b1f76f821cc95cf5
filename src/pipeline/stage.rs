//! Stage list shared by both pipeline roles.

use std::time::Duration;

use axum::body::Bytes;
use futures::future::BoxFuture;
use serde_json::Value;

use super::signal::CompletionSignal;
use super::PipelineContext;
use crate::callback::{self, InboundHandler};
use crate::error::{Result, TckError};
use crate::protocol::{
    message, paths, ContractNegotiation, NegotiationRole, NegotiationState, SharedNegotiation,
};

/// Action applied to the negotiation when an inbound message arrives.
///
/// Returns the response payload, if any.
pub type InboundAction =
    Box<dyn FnOnce(&Value, &mut ContractNegotiation) -> Result<Option<Value>> + Send + Sync>;

/// Custom inspection of the negotiation record.
pub type Inspection = Box<dyn FnOnce(&ContractNegotiation) -> Result<()> + Send>;

/// Role-specific outbound stage.
pub(crate) trait RoleStage: Send + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run the stage against the pipeline's negotiation.
    fn run<'a>(
        self,
        ctx: &'a PipelineContext,
        negotiation: &'a SharedNegotiation,
    ) -> BoxFuture<'a, Result<()>>;
}

pub(crate) struct Expect {
    pattern: String,
    description: String,
    action: InboundAction,
}

pub(crate) enum Stage<R> {
    Role(R),
    Expect(Expect),
    WaitForExpectations,
    WaitForState(NegotiationState),
    VerifyState(NegotiationState),
    VerifyCounterpartyState(NegotiationState),
    Inspect(Inspection),
}

impl<R: RoleStage> Stage<R> {
    fn name(&self) -> &'static str {
        match self {
            Stage::Role(step) => step.name(),
            Stage::Expect(_) => "expect",
            Stage::WaitForExpectations => "wait for expectations",
            Stage::WaitForState(_) => "wait for state",
            Stage::VerifyState(_) => "verify state",
            Stage::VerifyCounterpartyState(_) => "verify counterparty state",
            Stage::Inspect(_) => "verify negotiation",
        }
    }
}

/// Registered expectation whose signal has not been awaited yet.
struct Pending {
    pattern: String,
    description: String,
    signal: CompletionSignal,
}

/// Ordered stages of one pipeline.
pub(crate) struct StageList<R> {
    stages: Vec<Stage<R>>,
}

impl<R> Default for StageList<R> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<R: RoleStage> StageList<R> {
    pub(crate) fn push(&mut self, step: R) {
        self.stages.push(Stage::Role(step));
    }

    pub(crate) fn expect(&mut self, pattern: &str, description: &str, action: InboundAction) {
        self.stages.push(Stage::Expect(Expect {
            pattern: pattern.to_string(),
            description: description.to_string(),
            action,
        }));
    }

    pub(crate) fn wait_for_expectations(&mut self) {
        self.stages.push(Stage::WaitForExpectations);
    }

    pub(crate) fn wait_for_state(&mut self, state: NegotiationState) {
        self.stages.push(Stage::WaitForState(state));
    }

    pub(crate) fn verify_state(&mut self, state: NegotiationState) {
        self.stages.push(Stage::VerifyState(state));
    }

    pub(crate) fn verify_counterparty_state(&mut self, state: NegotiationState) {
        self.stages.push(Stage::VerifyCounterpartyState(state));
    }

    pub(crate) fn inspect(&mut self, inspection: Inspection) {
        self.stages.push(Stage::Inspect(inspection));
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// On failure, handlers still registered by this run are removed from
    /// the endpoint. The negotiation keeps whatever state it reached.
    pub(crate) async fn execute(
        &mut self,
        ctx: &PipelineContext,
        negotiation: &SharedNegotiation,
    ) -> Result<()> {
        let stages = std::mem::take(&mut self.stages);
        let mut pending = Vec::new();

        let result = run_stages(stages, ctx, negotiation, &mut pending).await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Pipeline failed");
            for expectation in pending {
                if ctx.endpoint.deregister_handler(&expectation.pattern).await {
                    tracing::debug!(pattern = %expectation.pattern, "Deregistered outstanding handler");
                }
            }
        }
        result
    }
}

async fn run_stages<R: RoleStage>(
    stages: Vec<Stage<R>>,
    ctx: &PipelineContext,
    negotiation: &SharedNegotiation,
    pending: &mut Vec<Pending>,
) -> Result<()> {
    let total = stages.len();
    for (index, stage) in stages.into_iter().enumerate() {
        tracing::debug!(stage = stage.name(), index, total, "Running stage");

        match stage {
            Stage::Role(step) => step.run(ctx, negotiation).await?,
            Stage::Expect(expect) => {
                let signal = CompletionSignal::new();
                let handler = inbound_handler(
                    negotiation.clone(),
                    expect.action,
                    signal.clone(),
                    expect.description.clone(),
                );
                ctx.endpoint.register_handler(&expect.pattern, handler).await?;
                pending.push(Pending {
                    pattern: expect.pattern,
                    description: expect.description,
                    signal,
                });
            },
            Stage::WaitForExpectations => await_pending(ctx, pending).await?,
            Stage::WaitForState(expected) => {
                await_pending(ctx, pending).await?;
                verify_local_state(negotiation, expected).await?;
            },
            Stage::VerifyState(expected) => verify_local_state(negotiation, expected).await?,
            Stage::VerifyCounterpartyState(expected) => {
                tokio::time::sleep(ctx.settings.pause).await;
                let url = counterparty_negotiation_url(ctx, negotiation).await?;
                ctx.actions.verify_remote_state(&url, expected).await?;
            },
            Stage::Inspect(inspection) => {
                await_pending(ctx, pending).await?;
                let record = negotiation.lock().await;
                inspection(&*record)?;
            },
        }
    }

    await_pending(ctx, pending).await
}

/// Wait on every outstanding signal, oldest first.
async fn await_pending(ctx: &PipelineContext, pending: &mut Vec<Pending>) -> Result<()> {
    check_unexpected(ctx).await?;

    let wait: Duration = ctx.settings.wait;
    while let Some(expectation) = pending.first() {
        if let Err(e) = expectation.signal.wait(&expectation.description, wait).await {
            // a stray message usually explains the missing one
            check_unexpected(ctx).await?;
            return Err(e);
        }
        tracing::debug!(expectation = %expectation.description, "Expectation met");
        pending.remove(0);
    }

    check_unexpected(ctx).await
}

async fn check_unexpected(ctx: &PipelineContext) -> Result<()> {
    match ctx.endpoint.take_unexpected().await.into_iter().next() {
        Some(request) => Err(request.into()),
        None => Ok(()),
    }
}

async fn verify_local_state(negotiation: &SharedNegotiation, expected: NegotiationState) -> Result<()> {
    let actual = negotiation.lock().await.state();
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(TckError::StateMismatch {
            expected: expected.to_string(),
            actual: actual.map_or_else(|| "<new>".to_string(), |s| s.to_string()),
        })
    }
}

async fn counterparty_negotiation_url(
    ctx: &PipelineContext,
    negotiation: &SharedNegotiation,
) -> Result<String> {
    let record = negotiation.lock().await;
    let base = match record.role() {
        NegotiationRole::Consumer => ctx.settings.counterparty_url.as_str(),
        NegotiationRole::Provider => record.require_callback_address()?,
    };
    Ok(paths::negotiation_url(base, record.require_correlation_id()?))
}

/// Wrap an action into a handler that fires `signal` with its outcome.
fn inbound_handler(
    negotiation: SharedNegotiation,
    action: InboundAction,
    signal: CompletionSignal,
    description: String,
) -> InboundHandler {
    callback::handler(move |body: Bytes| async move {
        let outcome: Result<Option<Value>> = async move {
            let message = message::decode(&body)?;
            let mut record = negotiation.lock().await;
            action(&message, &mut *record)
        }
        .await;

        match &outcome {
            Ok(_) => {
                tracing::debug!(expectation = %description, "Inbound message handled");
                signal.fire(Ok(()));
            },
            Err(e) => {
                tracing::warn!(expectation = %description, error = %e, "Inbound handler failed");
                signal.fire(Err(e.to_string()));
            },
        }
        outcome
    })
}
