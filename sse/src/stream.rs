use crate::broker::{Broker, Callback, Delivery, MemoryBroker, SubscriptionId};
use crate::error::Error;
use crate::frame::{Frame, KEEP_ALIVE, PRIMER};
use async_stream::stream;
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use log::*;
use serde_json::Value;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";
pub const CACHE_CONTROL_NO_STORE: &str = "max-age=0, no-cache, no-store, must-revalidate";

/// Construction options for [`ServerSentEvents`].
#[derive(Default)]
pub struct Options {
    /// Broker to route events through. Defaults to a fresh [`MemoryBroker`].
    pub broker: Option<Arc<dyn Broker>>,
    /// Interval for comment frames on idle streams. `None` disables them.
    pub keep_alive: Option<Duration>,
}

/// Bridges long-lived HTTP responses to a [`Broker`].
#[derive(Clone)]
pub struct ServerSentEvents {
    broker: Arc<dyn Broker>,
    keep_alive: Option<Duration>,
}

impl ServerSentEvents {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            broker: options
                .broker
                .unwrap_or_else(|| Arc::new(MemoryBroker::new())),
            keep_alive: options.keep_alive,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Subscribe a new stream to `channel`.
    ///
    /// The subscription is live as soon as this returns and lasts until the returned
    /// [`EventStream`] is dropped, which is what happens when the client disconnects.
    pub fn open_stream(&self, channel: impl Into<String>) -> EventStream {
        let channel = channel.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

        let callback: Callback = Arc::new(move |event: &str, data: &Value| -> Result<(), Error> {
            let frame = Frame::new(event, data)?;
            tx.send(Bytes::from(frame.encode()))
                .map_err(|_| Error::Disconnected)
        });

        let id = self.broker.subscribe(&channel, callback);
        info!("Opened SSE stream {} on channel {:?}", id, channel);

        let subscription = Subscription {
            broker: Arc::clone(&self.broker),
            channel,
            id: Some(id),
        };
        let keep_alive = self.keep_alive;

        let stream = stream! {
            // Unsubscribes when the stream is dropped.
            let _subscription = subscription;

            let mut ticker = keep_alive.map(|period| {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            yield Ok::<Bytes, Infallible>(Bytes::from_static(PRIMER));

            loop {
                let next = match ticker.as_mut() {
                    Some(ticker) => tokio::select! {
                        frame = rx.recv() => {
                            // Events restart the idle period.
                            ticker.reset();
                            frame
                        }
                        _ = ticker.tick() => Some(Bytes::from_static(KEEP_ALIVE)),
                    },
                    None => rx.recv().await,
                };

                match next {
                    Some(bytes) => yield Ok(bytes),
                    // The broker dropped our callback, nothing more will arrive.
                    None => break,
                }
            }
        };

        EventStream {
            inner: Box::pin(stream),
        }
    }

    pub fn publish(&self, channel: &str, event: &str, data: &Value) -> Delivery {
        self.broker.publish(channel, event, data)
    }
}

impl Default for ServerSentEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one broker registration for the lifetime of a stream.
struct Subscription {
    broker: Arc<dyn Broker>,
    channel: String,
    id: Option<SubscriptionId>,
}

impl Subscription {
    fn close(&mut self) {
        if let Some(id) = self.id.take() {
            info!("Closed SSE stream {} on channel {:?}", id, self.channel);
            self.broker.unsubscribe(id, &self.channel);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of one SSE response: the primer, then encoded frames as they are published.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>,
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl IntoResponse for EventStream {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (CONTENT_TYPE, CONTENT_TYPE_EVENT_STREAM),
                (CACHE_CONTROL, CACHE_CONTROL_NO_STORE),
                (CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Decoder;
    use futures::StreamExt;
    use serde_json::json;

    fn adapter() -> (Arc<MemoryBroker>, ServerSentEvents) {
        let broker = Arc::new(MemoryBroker::new());
        let events = ServerSentEvents::with_options(Options {
            broker: Some(broker.clone() as Arc<dyn Broker>),
            keep_alive: None,
        });
        (broker, events)
    }

    async fn next_frame(stream: &mut EventStream, decoder: &mut Decoder) -> Frame {
        loop {
            let chunk = stream
                .next()
                .await
                .expect("stream ended")
                .expect("infallible");
            if let Some(frame) = decoder.feed(&chunk).into_iter().next() {
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn test_stream_starts_with_primer() {
        let (_broker, events) = adapter();
        let mut stream = events.open_stream("foo");

        let first = stream.next().await.unwrap().unwrap();

        assert_eq!(&first[..], PRIMER);
    }

    #[tokio::test]
    async fn test_open_stream_subscribes_immediately() {
        let (broker, events) = adapter();

        let _stream = events.open_stream("foo");

        assert_eq!(broker.subscriber_count("foo"), 1);
    }

    #[tokio::test]
    async fn test_two_streams_receive_the_same_event() {
        let (_broker, events) = adapter();
        let mut first = events.open_stream("foo");
        let mut second = events.open_stream("foo");

        let delivery = events.publish("foo", "simple", &json!(42));
        assert_eq!(delivery.delivered, 2);

        for stream in [&mut first, &mut second] {
            let frame = next_frame(stream, &mut Decoder::new()).await;
            assert_eq!(frame.event, "simple");
            assert_eq!(frame.json::<Value>().unwrap(), json!(42));
        }
    }

    #[tokio::test]
    async fn test_stream_only_receives_its_channel() {
        let (_broker, events) = adapter();
        let mut foo = events.open_stream("foo");
        let mut bar = events.open_stream("bar");

        events.publish("foo", "one", &json!(1));
        events.publish("bar", "two", &json!(2));

        let frame = next_frame(&mut foo, &mut Decoder::new()).await;
        assert_eq!(frame.event, "one");
        let frame = next_frame(&mut bar, &mut Decoder::new()).await;
        assert_eq!(frame.event, "two");
    }

    #[tokio::test]
    async fn test_newlines_in_payload_are_preserved() {
        let (_broker, events) = adapter();
        let mut stream = events.open_stream("foo");

        events.publish("foo", "newlines", &json!({"text": "foo\n\n\nbar"}));

        let frame = next_frame(&mut stream, &mut Decoder::new()).await;
        assert_eq!(frame.event, "newlines");
        assert_eq!(
            frame.json::<Value>().unwrap(),
            json!({"text": "foo\n\n\nbar"})
        );
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let (_broker, events) = adapter();
        let mut stream = events.open_stream("foo");
        let mut decoder = Decoder::new();

        events.publish("foo", "one", &json!(1));
        events.publish("foo", "two", &json!(2));

        assert_eq!(next_frame(&mut stream, &mut decoder).await.event, "one");
        assert_eq!(next_frame(&mut stream, &mut decoder).await.event, "two");
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let (broker, events) = adapter();
        let stream = events.open_stream("foo");
        assert_eq!(broker.subscriber_count("foo"), 1);

        drop(stream);

        assert_eq!(broker.subscriber_count("foo"), 0);
        assert_eq!(broker.channel_count(), 0);
        assert_eq!(
            events.publish("foo", "after-close", &json!(1)),
            Delivery::default()
        );
    }

    #[tokio::test]
    async fn test_subscription_closes_only_once() {
        let (broker, events) = adapter();
        let _other = events.open_stream("foo");

        let mut subscription = Subscription {
            broker: broker.clone() as Arc<dyn Broker>,
            channel: "foo".to_string(),
            id: Some(broker.subscribe(
                "foo",
                Arc::new(|_: &str, _: &Value| -> Result<(), Error> { Ok(()) }),
            )),
        };
        assert_eq!(broker.subscriber_count("foo"), 2);

        subscription.close();
        subscription.close();
        drop(subscription);

        assert_eq!(broker.subscriber_count("foo"), 1);
    }

    #[tokio::test]
    async fn test_invalid_event_name_counts_as_failed_delivery() {
        let (_broker, events) = adapter();
        let _stream = events.open_stream("foo");

        let delivery = events.publish("foo", "bad\nname", &json!(1));

        assert_eq!(delivery, Delivery { delivered: 0, failed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_emits_keep_alive() {
        let events = ServerSentEvents::with_options(Options {
            broker: None,
            keep_alive: Some(Duration::from_secs(15)),
        });
        let mut stream = events.open_stream("foo");
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], PRIMER);

        let chunk = stream.next().await.unwrap().unwrap();

        assert_eq!(&chunk[..], KEEP_ALIVE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_postpone_keep_alive() {
        let events = ServerSentEvents::with_options(Options {
            broker: None,
            keep_alive: Some(Duration::from_secs(15)),
        });
        let mut stream = events.open_stream("foo");
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], PRIMER);

        time::advance(Duration::from_secs(14)).await;
        events.publish("foo", "one", &json!(1));
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"event: one\ndata: 1\n\n");

        let last_event = Instant::now();
        let chunk = stream.next().await.unwrap().unwrap();

        assert_eq!(&chunk[..], KEEP_ALIVE);
        assert!(last_event.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_clones_share_the_default_broker() {
        let events = ServerSentEvents::new();
        let _stream = events.clone().open_stream("foo");

        let delivery = events.broker().publish("foo", "one", &json!(1));

        assert_eq!(delivery.delivered, 1);
    }

    #[tokio::test]
    async fn test_response_headers() {
        let (_broker, events) = adapter();

        let response = events.open_stream("foo").into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], CONTENT_TYPE_EVENT_STREAM);
        assert_eq!(headers[CACHE_CONTROL], CACHE_CONTROL_NO_STORE);
        assert_eq!(headers[CONNECTION], "keep-alive");
    }
}
