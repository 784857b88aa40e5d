use anyhow::{Context, Result};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use sse::frame::Decoder;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
}

/// One open stream on the server. Dropping it closes the connection.
pub struct Connection {
    pub label: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
    handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(
        client: &reqwest::Client,
        base_url: &str,
        channel: &str,
        label: String,
    ) -> Result<Self> {
        let url = format!("{}/stream/{}", base_url, channel);
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to open stream {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to open stream {}: {}", url, response.status());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut chunks = response.bytes_stream();
            let mut decoder = Decoder::new();

            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("SSE error for {}: {}", task_label, e);
                        break;
                    }
                };

                for frame in decoder.feed(&chunk) {
                    let data = match frame.json::<Value>() {
                        Ok(data) => data,
                        Err(e) => {
                            warn!("Undecodable {} payload for {}: {}", frame.event, task_label, e);
                            continue;
                        }
                    };

                    let event = Event {
                        event_type: frame.event,
                        data,
                    };

                    if tx.send(event).is_err() {
                        debug!("SSE receiver dropped for {}", task_label);
                        return;
                    }
                }
            }

            debug!("SSE stream ended for {}", task_label);
        });

        Ok(Self {
            label,
            event_rx: rx,
            handle,
        })
    }

    pub async fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", event_type);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.event_type == event_type => {
                    return Ok(event);
                }
                Ok(Some(event)) => {
                    debug!("{} skipping {} event", self.label, event.event_type);
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("SSE connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", event_type);
                }
            }
        }
    }

    /// Next event of any type, or `None` if nothing arrives within `timeout`.
    pub async fn next_event(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.event_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Abort the reader task, which drops the response body and hangs up.
    pub fn close(self) {
        self.handle.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
