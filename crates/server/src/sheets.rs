use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use yobidashi_discord::archive::{ArchiveError, MessageArchive};

/// Spreadsheet web-app endpoint that appends one row per POST.
pub struct SheetsWebhookClient {
    client: Client,
    url: String,
}

impl SheetsWebhookClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ArchiveError::Request(error.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl MessageArchive for SheetsWebhookClient {
    async fn append(&self, content: &str) -> Result<(), ArchiveError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|error| ArchiveError::Request(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ArchiveError::Status { status: status.as_u16(), body })
    }
}
