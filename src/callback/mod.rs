//! Callback endpoint for inbound DSP messages.
//!
//! The connector under test calls back into the harness: offers, agreements
//! and events when the harness plays consumer; requests and verifications
//! when it plays provider. Pipelines register one single-shot handler per
//! expected message, keyed by a path regex.
//!
//! ```text
//!  SUT ── POST /negotiations/42/offers ──> [ CallbackEndpoint ]
//!                                             │ match + remove
//!                                             v
//!                                       InboundHandler(body)
//!                                             │
//!                        200 + JSON  <────────┤ Ok(Some)
//!                        200         <────────┤ Ok(None)
//!                        400         <────────┘ Err / no handler
//! ```

mod endpoint;
mod listener;

pub use endpoint::{
    handler, CallbackEndpoint, HandlerFuture, InboundHandler, UnexpectedRequest,
};
