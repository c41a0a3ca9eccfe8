//! Bounded, cancellable adapter calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Adapter, OrchestrationError};

/// Run one adapter call under a timeout, racing the caller's cancellation.
///
/// The adapter's own result is handed back untouched so the caller can map
/// adapter-specific errors (such as "not found") onto its own taxonomy.
pub(crate) async fn bounded<T, E, F>(
  adapter: Adapter,
  timeout: Duration,
  cancel: &CancellationToken,
  call: F,
) -> Result<Result<T, E>, OrchestrationError>
where
  F: Future<Output = Result<T, E>>,
{
  if cancel.is_cancelled() {
    return Err(OrchestrationError::Cancelled);
  }

  tokio::select! {
    biased;
    _ = cancel.cancelled() => {
      warn!(adapter = %adapter, "adapter_call_cancelled");
      Err(OrchestrationError::Cancelled)
    }
    result = tokio::time::timeout(timeout, call) => match result {
      Ok(result) => Ok(result),
      Err(_) => {
        warn!(adapter = %adapter, timeout_ms = timeout.as_millis() as u64, "adapter_call_timed_out");
        Err(OrchestrationError::Timeout { adapter })
      }
    },
  }
}
