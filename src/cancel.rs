//! Cooperative cancellation for suspending pipeline steps.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// The cancellation signal was observed before the step completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Drive `fut` to completion unless `cancel` fires first.
///
/// An already-cancelled token short-circuits without polling `fut`, so a
/// step that has not started never issues its network call.
///
/// # Errors
///
/// Returns [`Cancelled`] if the token is or becomes cancelled before `fut`
/// resolves. The in-flight future is dropped.
pub async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}
