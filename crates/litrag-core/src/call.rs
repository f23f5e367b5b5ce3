//! Timeout and cancellation for external calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline and cancellation handle carried through one retrieval.
///
/// Every call to an embedding provider, search index or language model goes
/// through [`CallContext::run`]. Cancelling the token drops the guarded future,
/// which aborts the in-flight request.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CallContext {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, cancel: CancellationToken::new() }
    }

    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(operation));
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled(operation)),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout {
                    operation,
                    elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }
}
