use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Delivery report returned by the publish endpoint.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Delivery,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach health endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Server unhealthy: {}", response.status());
        }

        Ok(())
    }

    pub async fn publish(&self, channel: &str, event: &str, data: Value) -> Result<Delivery> {
        let url = format!("{}/stream/{}", self.base_url, channel);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "event": event, "data": data }))
            .send()
            .await
            .context("Failed to publish event")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to publish event: {} - Response: {}", status, body);
        }

        let body: ApiResponse = response
            .json()
            .await
            .context("Failed to parse publish response")?;

        Ok(body.data)
    }
}
