//! Server-Sent Events broadcasting.
//!
//! Named events with JSON payloads are fanned out to every HTTP client holding an open
//! stream on the same channel.
//!
//! # Architecture
//!
//! - **Broker**: channel → subscriber registry. Allocates subscription ids and invokes
//!   every callback registered under a channel when something is published to it.
//!   [`MemoryBroker`] is the in-process implementation; anything implementing [`Broker`]
//!   can replace it.
//! - **Frame codec**: encodes events into the `event:`/`data:` text protocol and decodes
//!   them on the receiving side.
//! - **ServerSentEvents**: opens streams (subscribe, write headers and primer, forward
//!   encoded frames) and tears them down when the client goes away.
//!
//! # Message Flow
//!
//! 1. A handler calls [`ServerSentEvents::open_stream`] for the channel in the request path
//! 2. The adapter subscribes a callback that encodes frames into the stream's queue
//! 3. A producer calls [`ServerSentEvents::publish`]
//! 4. The broker invokes each callback registered on that channel, once, before returning
//! 5. When the client disconnects the stream is dropped and its subscription removed
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//!
//! let events = sse::ServerSentEvents::new();
//! let stream = events.open_stream("foo"); // return this from an axum handler
//! events.publish("foo", "greeting", &json!({ "text": "hello" }));
//! ```
//!
//! Events are ephemeral: a client that is not connected when an event is published never
//! sees it.

pub mod broker;
pub mod error;
pub mod frame;
pub mod stream;

pub use broker::{Broker, Callback, Delivery, MemoryBroker, SubscriptionId};
pub use error::Error;
pub use stream::{EventStream, Options, ServerSentEvents};
