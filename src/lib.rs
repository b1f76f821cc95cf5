//! # DSP TCK - Contract Negotiation Conformance Harness
//!
//! Drives a Dataspace Protocol contract negotiation against a connector under
//! test (the SUT), playing either consumer or provider, and asserts that the
//! SUT follows the negotiation state machine.
//!
//! ## Features
//!
//! - **Per-role state machine**: every transition is checked against the
//!   consumer or provider table
//! - **Fluent pipelines**: declare sends, inbound expectations and state
//!   checks; run them in order with bounded waits
//! - **Callback endpoint**: local axum listener with single-shot handlers
//!   for messages the SUT pushes back
//! - **Retrying transport**: transient 4xx answers are retried with
//!   exponential backoff; protocol violations are not masked
//!
//! ## Architecture
//!
//! ```text
//!   Pipeline ──── send stages ────> Actions ──> HttpTransport ──> SUT
//!      │                               │                           │
//!      │ expect_* registers            │ transition                │ callbacks
//!      v                               v                           v
//!   CallbackEndpoint <──────── ContractNegotiation <──── handler(body)
//!      │                                                     │
//!      └──────────── CompletionSignal (fired once) <─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dsp_tck::{CallbackEndpoint, Config, PipelineContext};
//! use dsp_tck::protocol::NegotiationState::*;
//!
//! let config = Config::load(None)?;
//! let endpoint = CallbackEndpoint::bind(&config.callback).await?;
//! let ctx = PipelineContext::from_config(&config, endpoint)?;
//!
//! ctx.consumer_pipeline()
//!     .send_request_message("dataset-1", "offer-1")
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
//!
//! ## Modules
//!
//! - [`protocol`]: Negotiation states, records and wire helpers
//! - [`transport`]: Outbound HTTP with retry and auth
//! - [`callback`]: Inbound HTTP endpoint
//! - [`actions`]: Role-specific message senders
//! - [`pipeline`]: Scenario builders and execution
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod actions;
pub mod callback;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use actions::{ActionContext, ConsumerActions, ProviderActions};
pub use callback::CallbackEndpoint;
pub use config::Config;
pub use error::{Result, TckError, Violation};
pub use pipeline::{ConsumerPipeline, PipelineContext, PipelineSettings, ProviderPipeline};
pub use protocol::{ContractNegotiation, NegotiationRole, NegotiationState};
pub use transport::{ExpectedOutcome, HttpTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dataspace Protocol version the harness speaks
pub const PROTOCOL_VERSION: &str = "0.8";
