use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::{ChatRequest, ChunkStream, Transport, TransportError};

/// Streams replies from the site's own chat endpoint.
///
/// The endpoint answers with the reply text as a plain chunked body.
#[derive(Clone)]
pub struct SiteTransport {
    client: Client,
    endpoint: String,
}

impl SiteTransport {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for SiteTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        debug!(endpoint = %self.endpoint, turns = request.messages.len(), "Opening chat stream");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from));

        Ok(Box::pin(stream))
    }
}
