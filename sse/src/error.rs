//! Error types for the SSE core.

use std::error::Error as StdError;
use std::fmt;

/// Errors raised while delivering an event to a single subscriber.
///
/// None of these are fatal to the broker: a failing subscriber is reported in the
/// publish [`Delivery`](crate::broker::Delivery) and the remaining subscribers still
/// receive the event.
#[derive(Debug)]
pub enum Error {
    /// The receiving half of a stream is gone, usually because the client hung up
    /// and the subscription has not been torn down yet.
    Disconnected,

    /// The event payload could not be converted to or from JSON.
    Serialization(serde_json::Error),

    /// Event names are written on a single `event:` line, so they may not contain
    /// carriage returns or line feeds.
    InvalidEventName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Disconnected => write!(f, "Stream receiver disconnected"),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::InvalidEventName(name) => {
                write!(f, "Invalid event name (contains a line break): {:?}", name)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
