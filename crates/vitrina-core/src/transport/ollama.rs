use async_trait::async_trait;
use anyhow::{Result, anyhow};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatRequest, ChunkStream, Transport, TransportError};
use crate::state::ChatRole;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

/// One NDJSON line of a streamed `/api/generate` response.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Streams a completion; the stream yields the text deltas as bytes.
    pub async fn generate_stream(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<ChunkStream, TransportError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model,
            prompt,
            system,
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: format!("{}. Make sure Ollama is running with: ollama serve", body.trim()),
            });
        }

        Ok(ndjson_deltas(response.bytes_stream()))
    }

    /// Embeds text with an Ollama embedding model, for section search queries.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let request = EmbeddingRequest { model, prompt: text };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama embedding request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        let embedding: EmbeddingResponse = response.json().await?;
        if embedding.embedding.is_empty() {
            return Err(anyhow!("Ollama returned an empty embedding for model {}", model));
        }
        Ok(embedding.embedding)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

/// Talks straight to a local Ollama server, asking it to answer in the reply protocol.
#[derive(Clone)]
pub struct OllamaTransport {
    client: OllamaClient,
    model: String,
    system_prompt: String,
}

impl OllamaTransport {
    pub fn new(client: OllamaClient, model: &str, system_prompt: String) -> Self {
        Self {
            client,
            model: model.to_string(),
            system_prompt,
        }
    }
}

#[async_trait]
impl Transport for OllamaTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        let prompt = build_prompt(request);
        debug!(model = %self.model, prompt_len = prompt.len(), "Opening Ollama stream");

        self.client
            .generate_stream(&self.model, Some(&self.system_prompt), &prompt)
            .await
    }
}

/// Flattens the conversation into a single prompt, newest question last.
pub fn build_prompt(request: &ChatRequest) -> String {
    let mut prompt = String::new();

    if request.messages.len() > 1 {
        prompt.push_str("Conversation so far:\n");
        for turn in &request.messages[..request.messages.len() - 1] {
            match turn.role {
                ChatRole::User => prompt.push_str(&format!("Visitor: {}\n", turn.content)),
                ChatRole::Assistant => prompt.push_str(&format!("Assistant: {}\n", turn.content)),
            }
        }
        prompt.push('\n');
    }

    if let Some(last) = request.messages.last() {
        prompt.push_str("Visitor: ");
        prompt.push_str(&last.content);
    }

    prompt
}

fn parse_generate_line(line: &[u8]) -> Result<Option<GenerateChunk>, TransportError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| TransportError::Malformed(format!("invalid NDJSON line: {}", e)))?;

    match chunk.error {
        Some(message) => Err(TransportError::Malformed(message)),
        None => Ok(Some(chunk)),
    }
}

/// Turns an NDJSON body into a stream of `response` deltas.
///
/// Network chunks do not line up with NDJSON lines, so bytes are buffered
/// until a full line is available.
pub fn ndjson_deltas<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = (Box::pin(body), Vec::<u8>::new(), false);

    Box::pin(futures_util::stream::unfold(
        state,
        |(mut body, mut pending, finished)| async move {
            if finished {
                return None;
            }

            loop {
                if let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    match parse_generate_line(&line) {
                        Ok(None) => continue,
                        Ok(Some(chunk)) => {
                            let done = chunk.done;
                            return Some((Ok(chunk.response.into_bytes()), (body, pending, done)));
                        }
                        Err(e) => return Some((Err(e), (body, pending, true))),
                    }
                }

                match body.next().await {
                    Some(Ok(bytes)) => pending.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => return Some((Err(e.into()), (body, pending, true))),
                    None => {
                        let line = std::mem::take(&mut pending);
                        return match parse_generate_line(&line) {
                            Ok(Some(chunk)) => {
                                Some((Ok(chunk.response.into_bytes()), (body, pending, true)))
                            }
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (body, pending, true))),
                        };
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChatTurn;

    async fn collect(stream: ChunkStream) -> Vec<Result<String, String>> {
        stream
            .map(|item| {
                item.map(|bytes| String::from_utf8(bytes).unwrap())
                    .map_err(|e| e.to_string())
            })
            .collect()
            .await
    }

    fn body(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, TransportError>> + Send + 'static {
        let parts: Vec<Result<Vec<u8>, TransportError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures_util::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_ndjson_lines_split_across_chunks() {
        let stream = ndjson_deltas(body(&[
            "{\"response\":\"MESS",
            "AGE:\\n\",\"done\":false}\n{\"response\":\"hola\",",
            "\"done\":false}\n\n{\"response\":\"\",\"done\":true}\n",
        ]));

        let items = collect(stream).await;
        assert_eq!(
            items,
            vec![
                Ok("MESSAGE:\n".to_string()),
                Ok("hola".to_string()),
                Ok(String::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ndjson_trailing_line_without_newline() {
        let stream = ndjson_deltas(body(&["{\"response\":\"fin\",\"done\":true}"]));
        assert_eq!(collect(stream).await, vec![Ok("fin".to_string())]);
    }

    #[tokio::test]
    async fn test_ndjson_error_line_ends_stream() {
        let stream = ndjson_deltas(body(&[
            "{\"error\":\"model not found\"}\n{\"response\":\"ignored\"}\n",
        ]));

        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().contains("model not found"));
    }

    #[tokio::test]
    async fn test_ndjson_garbage_is_malformed() {
        let stream = ndjson_deltas(body(&["not json\n"]));
        let items = collect(stream).await;
        assert!(items[0].as_ref().unwrap_err().starts_with("malformed response stream"));
    }

    #[test]
    fn test_build_prompt_includes_history() {
        let request = ChatRequest {
            messages: vec![
                ChatTurn { role: ChatRole::User, content: "hola".to_string() },
                ChatTurn { role: ChatRole::Assistant, content: "¡Hola!".to_string() },
                ChatTurn { role: ChatRole::User, content: "precios".to_string() },
            ],
        };

        let prompt = build_prompt(&request);
        assert!(prompt.starts_with("Conversation so far:\nVisitor: hola\nAssistant: ¡Hola!\n"));
        assert!(prompt.ends_with("Visitor: precios"));
    }

    #[test]
    fn test_build_prompt_single_turn() {
        let request = ChatRequest {
            messages: vec![ChatTurn { role: ChatRole::User, content: "hola".to_string() }],
        };
        assert_eq!(build_prompt(&request), "Visitor: hola");
    }
}
