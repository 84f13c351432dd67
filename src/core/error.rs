//! Crate-wide error type.
//!
//! Nothing in the runtime is fatal: validation failures are routed to
//! the dispatcher error sink, wire failures end a connection reader,
//! and substrate failures are reported while the handlers keep going.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing or malformed environment).
    #[error("configuration error: {0}")]
    Config(String),

    /// WebSocket dial, handshake or transport errors.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A venue frame that could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// HTTP transport errors from REST order entry.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The venue answered an order-entry request with a failure.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// Serialization of instructions, reports or wire frames.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A non-New instruction arrived for an unknown OrderID.
    #[error("expected a New instruction for unknown order {0}")]
    ExpectedNew(String),

    /// A New instruction arrived for an OrderID already registered.
    #[error("duplicate New instruction for order {0}")]
    DuplicateNew(String),

    /// An instruction whose Side or Symbol does not match the
    /// registered definition of its OrderID.
    #[error("Side or Symbol do not match the registered order {0}")]
    DefinitionMismatch(String),

    /// A report arrived for an OrderID the dispatcher does not own.
    #[error("report for unknown order {0}")]
    UnexpectedReport(String),

    /// A replace or cancel referenced a ClOrdID that is not indexed.
    #[error("OrigClOrdID {0} not found")]
    OrigClOrdIdNotFound(String),

    /// The order state machine refused to mint a request: a request is
    /// already in flight, the order is terminal, or the transition is
    /// not allowed from the current state.
    #[error("order {0} cannot accept another request")]
    RequestConflict(String),

    /// Stream append or hash write failures in the journal substrate.
    #[error("journal error: {0}")]
    Journal(String),
}
