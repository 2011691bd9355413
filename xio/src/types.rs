//! Result and state types shared by the state machine and its adapters.

/// Outcome of a single non-blocking step.
///
/// Every adapter primitive that may take more than one poll returns one of
/// these: the step is finished, it should be retried on a later poll, or it
/// failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncResult {
    /// Done. For `read` this means "more may be available, call again".
    Success,
    /// Nothing happened yet, call again later.
    Waiting,
    /// Unrecoverable error.
    Failure,
}

impl AsyncResult {
    pub fn is_waiting(self) -> bool {
        self == AsyncResult::Waiting
    }
}

/// Result passed to the open-complete callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    Ok,
    Error,
    Cancelled,
}

/// Result passed to a send-complete callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Ok,
    Error,
    Cancelled,
}

/// Lifecycle of an [`IoStateMachine`](crate::IoStateMachine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XioState {
    /// Created, `open` not called yet.
    Initial,
    /// `open` called, adapter open still in progress.
    Opening,
    /// Connected, data flows.
    Open,
    /// `close` called, adapter close still in progress.
    Closing,
    /// Closed; only destruction remains.
    Closed,
    /// A transport failure happened; only close or destroy are legal.
    Error,
}
