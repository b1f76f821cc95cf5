//! Single-fire completion signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Result, TckError};

type Slot = Option<std::result::Result<(), String>>;

/// Fired once by an inbound handler, awaited by the pipeline.
///
/// The first `fire` wins; later calls are ignored. Waiting is always bounded.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    slot: Arc<watch::Sender<Slot>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Record the handler outcome. Returns false if the signal had already fired.
    pub fn fire(&self, outcome: std::result::Result<(), String>) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait up to `wait` for the signal.
    ///
    /// Fails with `ExpectationTimeout` if it does not fire in time and with
    /// `HandlerFailed` if the handler reported an error.
    pub async fn wait(&self, expectation: &str, wait: Duration) -> Result<()> {
        let mut rx = self.slot.subscribe();
        let outcome = match tokio::time::timeout(wait, rx.wait_for(Option::is_some)).await {
            Ok(Ok(slot)) => (*slot).clone(),
            // The sender lives in `self`, so the channel cannot close here
            Ok(Err(_)) | Err(_) => None,
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => Err(TckError::HandlerFailed {
                expectation: expectation.to_string(),
                message,
            }),
            None => Err(TckError::ExpectationTimeout {
                expectation: expectation.to_string(),
                waited: wait,
            }),
        }
    }
}
