// pipe system error types.

use thiserror::Error;


// ==== base error types ====


/// Which connection or queue rule forbade an operation
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InvalidStateReason {
    /// Sends must originate from the unconnected end of a topology
    SendOnConnectedInlet,
    /// Receives must originate from the unconnected end of a topology
    ReceiveOnConnectedOutlet,
    /// The inlet being connected is already connected
    InletConnected,
    /// The outlet being connected is already connected
    OutletConnected,
    /// One of the lets has threads parked on it, which assume unconnected semantics
    HasWaitingParties,
    /// The let is not connected to anything
    NotConnected,
    /// The inlet and outlet belong to the same pipe
    SamePipe,
    /// The pipe owning the let has been dropped
    PipeDropped,
    /// A non-blocking operation found no partner
    NothingAvailable,
}

impl std::fmt::Display for InvalidStateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            InvalidStateReason::SendOnConnectedInlet => "cannot send through a connected inlet",
            InvalidStateReason::ReceiveOnConnectedOutlet =>
                "cannot receive through a connected outlet",
            InvalidStateReason::InletConnected => "inlet is already connected",
            InvalidStateReason::OutletConnected => "outlet is already connected",
            InvalidStateReason::HasWaitingParties => "let has threads waiting on it",
            InvalidStateReason::NotConnected => "let is not connected",
            InvalidStateReason::SamePipe => "cannot connect a pipe to itself",
            InvalidStateReason::PipeDropped => "the let's pipe has been dropped",
            InvalidStateReason::NothingAvailable => "no partner was immediately available",
        })
    }
}

/// Error for any operation on lets and pipes
///
/// Every error is reported synchronously to the caller that triggered it. Nothing is retried
/// internally.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PipeError {
    /// The endpoint's current connection or queue state forbids the operation
    #[error("invalid state: {0}")]
    InvalidState(InvalidStateReason),
    /// Connecting would create a cycle or a second path between two pipes
    #[error("connection would create a cycle or duplicate path")]
    TopologyConflict,
    /// A bounded blocking operation found no partner before its deadline
    #[error("timed out waiting for a partner")]
    Timeout,
    /// A blocking operation was aborted through its cancel token while parked
    #[error("cancelled while waiting for a partner")]
    Cancelled,
    /// Malformed configuration or arguments
    #[error("invalid argument: {0}")]
    ArgumentInvalid(&'static str),
}

impl From<InvalidStateReason> for PipeError {
    fn from(reason: InvalidStateReason) -> Self {
        PipeError::InvalidState(reason)
    }
}


// ==== compound error types ====


/// Error for trying to send a message, handing the unsent message back
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[error("{cause}")]
pub struct SendError<T> {
    /// The message that could not be sent
    pub msg: T,
    /// The reason the message could not be sent
    pub cause: PipeError,
}

impl<T> SendError<T> {
    pub(crate) fn new(msg: T, cause: impl Into<PipeError>) -> Self {
        SendError { msg, cause: cause.into() }
    }

    /// Discard the message, keeping only the cause
    pub fn into_cause(self) -> PipeError {
        self.cause
    }
}

impl<T> From<SendError<T>> for PipeError {
    fn from(e: SendError<T>) -> Self {
        e.cause
    }
}
