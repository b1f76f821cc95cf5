//! Pipeline engine.
//!
//! A pipeline is a fluently declared list of stages that drives one
//! negotiation end to end. [`ConsumerPipeline`] plays consumer against a
//! provider under test; [`ProviderPipeline`] plays provider against a
//! consumer under test.
//!
//! # Execution
//!
//! `execute().await` runs the stages strictly in order on the calling task.
//!
//! - Send stages apply the local transition, then POST.
//! - `expect_*` stages register a single-shot handler on the callback
//!   endpoint and return immediately, so an expectation can be declared
//!   before the send that provokes it.
//! - Blocking points wait for every outstanding expectation, each bounded
//!   by the configured wait: `then_wait_for_expectations`,
//!   `then_wait_for_state`, `then_verify_negotiation` and the end of the
//!   pipeline.
//!
//! ```rust,ignore
//! use dsp_tck::pipeline::{ConsumerPipeline, PipelineContext};
//! use dsp_tck::protocol::NegotiationState::*;
//!
//! ConsumerPipeline::new(ctx)
//!     .send_request_message("dataset-1", "offer-1")
//!     .then_verify_state(Requested)
//!     .expect_agreement()
//!     .accept_last_offer()
//!     .then_wait_for_state(Agreed)
//!     .expect_finalized_event()
//!     .send_verified_event()
//!     .then_wait_for_state(Finalized)
//!     .then_verify_provider_state(Finalized)
//!     .execute()
//!     .await?;
//! ```

mod consumer;
mod handlers;
mod provider;
mod signal;
mod stage;

pub use consumer::ConsumerPipeline;
pub use provider::ProviderPipeline;
pub use signal::CompletionSignal;
pub use stage::{InboundAction, Inspection};

use std::time::Duration;

use crate::actions::ActionContext;
use crate::callback::CallbackEndpoint;
use crate::config::Config;
use crate::error::Result;
use crate::protocol::DspMessages;
use crate::transport::HttpTransport;

/// Timing and counterparty settings for pipelines.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// DSP base URL of the connector under test
    pub counterparty_url: String,
    /// Participant id of the connector under test
    pub counterparty_id: String,
    /// Maximum wait per expectation
    pub wait: Duration,
    /// Pause before remote state checks and verification
    pub pause: Duration,
}

impl PipelineSettings {
    /// Settings for the connector at `counterparty_url`, default timing.
    pub fn new(counterparty_url: &str) -> Self {
        Self {
            counterparty_url: counterparty_url.trim_end_matches('/').to_string(),
            counterparty_id: "CONNECTOR_UNDER_TEST".to_string(),
            wait: Duration::from_secs(15),
            pause: Duration::from_millis(100),
        }
    }

    /// Settings from the `[connector]` and `[pipeline]` sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            counterparty_url: config.connector.base_url.trim_end_matches('/').to_string(),
            counterparty_id: config.connector.participant_id.clone(),
            wait: config.pipeline.wait(),
            pause: config.pipeline.pause(),
        }
    }

    /// Set the expectation wait.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the pause before remote checks.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Set the counterparty participant id.
    pub fn with_counterparty_id(mut self, id: &str) -> Self {
        self.counterparty_id = id.to_string();
        self
    }
}

/// Everything a pipeline needs besides its negotiation.
///
/// Cheap to clone; pipelines created from the same context share the
/// transport and the callback endpoint.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    actions: ActionContext,
    endpoint: CallbackEndpoint,
    settings: PipelineSettings,
}

impl PipelineContext {
    /// Assemble a context.
    pub fn new(actions: ActionContext, endpoint: CallbackEndpoint, settings: PipelineSettings) -> Self {
        Self {
            actions,
            endpoint,
            settings,
        }
    }

    /// Build transport, messages and settings from configuration.
    ///
    /// The endpoint is passed in because it must already be listening.
    pub fn from_config(config: &Config, endpoint: CallbackEndpoint) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        let actions = ActionContext::new(transport)
            .with_messages(DspMessages::new(&config.pipeline.participant_id));
        Ok(Self::new(actions, endpoint, PipelineSettings::from_config(config)))
    }

    /// Action context
    pub fn actions(&self) -> &ActionContext {
        &self.actions
    }

    /// Callback endpoint
    pub fn endpoint(&self) -> &CallbackEndpoint {
        &self.endpoint
    }

    /// Settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a consumer pipeline.
    pub fn consumer_pipeline(&self) -> ConsumerPipeline {
        ConsumerPipeline::new(self.clone())
    }

    /// Start a provider pipeline.
    pub fn provider_pipeline(&self) -> ProviderPipeline {
        ProviderPipeline::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.connector.base_url = "http://provider:9191/dsp/".to_string();
        config.pipeline.wait_secs = 2;

        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.counterparty_url, "http://provider:9191/dsp");
        assert_eq!(settings.counterparty_id, "CONNECTOR_UNDER_TEST");
        assert_eq!(settings.wait, Duration::from_secs(2));
        assert_eq!(settings.pause, Duration::from_millis(100));
    }

    #[test]
    fn test_context_from_config() {
        let config = Config::default();
        let endpoint = CallbackEndpoint::new("http://localhost:8083", "");
        let ctx = PipelineContext::from_config(&config, endpoint).unwrap();
        assert_eq!(ctx.endpoint().address(), "http://localhost:8083");
        assert_eq!(ctx.settings().wait, Duration::from_secs(15));
    }
}
