//! Contract negotiation protocol model.
//!
//! # State Machine
//!
//! Each party tracks the negotiation with its own table. Both tables share
//! the tail of the lifecycle; they differ in who may move a REQUESTED
//! negotiation forward.
//!
//! ```text
//!              ┌──────────── counter ────────────┐
//!              v                                 │
//!   ──> [REQUESTED] ─────── offer ──────────> [OFFERED] <──
//!              │                                 │
//!              │ accept (consumer)               │ accept
//!              │ agree  (provider)               v
//!              │                            [ACCEPTED]
//!              │                                 │ agree
//!              └──────────────> [AGREED] <───────┘
//!                                  │ verify
//!                                  v
//!                              [VERIFIED]
//!                                  │ finalize
//!                                  v
//!                             [FINALIZED]
//!
//!   any non-terminal state ── terminate ──> [TERMINATED]
//! ```
//!
//! | From        | Consumer                        | Provider                      |
//! |-------------|---------------------------------|-------------------------------|
//! | (new)       | REQUESTED, OFFERED              | OFFERED, REQUESTED            |
//! | `REQUESTED` | OFFERED, ACCEPTED, TERMINATED   | OFFERED, AGREED, TERMINATED   |
//! | `OFFERED`   | REQUESTED, ACCEPTED, TERMINATED | REQUESTED, ACCEPTED, TERMINATED |
//! | `ACCEPTED`  | AGREED, TERMINATED              | AGREED, TERMINATED            |
//! | `AGREED`    | VERIFIED, TERMINATED            | VERIFIED, TERMINATED          |
//! | `VERIFIED`  | FINALIZED, TERMINATED           | FINALIZED, TERMINATED         |
//! | `FINALIZED` | (terminal)                      | (terminal)                    |
//! | `TERMINATED`| (terminal)                      | (terminal)                    |

pub mod message;
mod negotiation;
pub mod paths;
mod state;

pub use message::{BodyFormat, DspMessages, NegotiationMessages};
pub use negotiation::{ContractNegotiation, ProcessIds, SharedNegotiation};
pub use state::{NegotiationRole, NegotiationState};

/// DSP vocabulary namespace
pub const DSPACE_NAMESPACE: &str = "https://w3id.org/dspace/v0.8/";

/// ODRL vocabulary namespace
pub const ODRL_NAMESPACE: &str = "http://www.w3.org/ns/odrl/2/";

/// Expanded `state` property
pub const DSPACE_PROPERTY_STATE_EXPANDED: &str = "https://w3id.org/dspace/v0.8/state";

/// Expanded `providerPid` property
pub const DSPACE_PROPERTY_PROVIDER_PID_EXPANDED: &str = "https://w3id.org/dspace/v0.8/providerPid";

/// Expanded `consumerPid` property
pub const DSPACE_PROPERTY_CONSUMER_PID_EXPANDED: &str = "https://w3id.org/dspace/v0.8/consumerPid";

/// Expanded `eventType` property
pub const DSPACE_PROPERTY_EVENT_TYPE_EXPANDED: &str = "https://w3id.org/dspace/v0.8/eventType";

/// Expanded `callbackAddress` property
pub const DSPACE_PROPERTY_CALLBACK_ADDRESS_EXPANDED: &str =
    "https://w3id.org/dspace/v0.8/callbackAddress";

/// Participant id the harness uses when none is configured
pub const TCK_PARTICIPANT_ID: &str = "TCK_PARTICIPANT";
