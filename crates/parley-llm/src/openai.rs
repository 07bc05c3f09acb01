//! OpenAI-compatible chat-completions provider.
//!
//! Talks to any endpoint speaking the `/v1/chat/completions` protocol with
//! Bearer auth, in both buffered and SSE streaming modes. Error bodies are
//! parsed into the shared [`ProviderError`] taxonomy; a 404 or
//! `model_not_found` code maps to [`ProviderError::ModelUnavailable`] so the
//! orchestrator can fall back.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use parley_core::Role;

use crate::provider::{
    ChunkStream, Generation, GenerationRequest, Provider, ProviderError, ProviderResult,
};
use crate::sse::parse_sse_lines;

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Configuration for the OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL without the `/v1/...` path.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
}

impl OpenAiConfig {
    /// Config for the public endpoint with the given key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
        }
    }
}

/// OpenAI-compatible generation provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a new provider with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: OpenAiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", self.config.api_key);
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| ProviderError::Auth {
                message: format!("Invalid API key header: {e}"),
            })?,
        );
        Ok(headers)
    }

    /// Build the chat-completions request body.
    fn build_body(request: &GenerationRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &request.turns {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": turn.content}));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> ProviderResult<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&Self::build_body(request, stream))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(
            status.as_u16(),
            &body,
            &request.model,
            retry_after_ms,
        ))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
        let response = self.send(request, false).await?;
        let body: Value = response.json().await?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Other {
                message: "response missing choices[0].message.content".into(),
            })?
            .to_string();
        let model = body["model"]
            .as_str()
            .unwrap_or(&request.model)
            .to_string();
        debug!(model, chars = content.len(), "generation complete");
        Ok(Generation { content, model })
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<ChunkStream> {
        let response = self.send(request, true).await?;
        let byte_stream = response.bytes_stream();

        let chunks = parse_sse_lines(Box::pin(byte_stream)).filter_map(|data| async move {
            match serde_json::from_str::<Value>(&data) {
                Ok(event) => event["choices"][0]["delta"]["content"]
                    .as_str()
                    .filter(|text| !text.is_empty())
                    .map(|text| Ok(text.to_string())),
                Err(e) => Some(Err(ProviderError::SseParse {
                    message: format!("invalid SSE data: {e}"),
                })),
            }
        });
        Ok(Box::pin(chunks))
    }
}

/// Classify a non-success HTTP response into a [`ProviderError`].
///
/// Tries the standard error envelope `{"error": {"message", "code"|"type"}}`
/// first, then flat `{"message"}` bodies, then falls back to the raw text.
fn classify_error(
    status: u16,
    body: &str,
    model: &str,
    retry_after_ms: Option<u64>,
) -> ProviderError {
    let (message, code) = parse_error_body(body, status);

    if status == 404 || code.as_deref() == Some("model_not_found") {
        return ProviderError::ModelUnavailable {
            model: model.to_string(),
        };
    }
    if status == 401 || status == 403 {
        return ProviderError::Auth { message };
    }
    if status == 429 {
        return ProviderError::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(0),
            message,
        };
    }
    ProviderError::Api {
        status,
        message,
        code,
        retryable: status >= 500,
    }
}

fn parse_error_body(body: &str, status: u16) -> (String, Option<String>) {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value["error"]["message"].as_str() {
            let code = value["error"]["code"]
                .as_str()
                .or_else(|| value["error"]["type"].as_str())
                .map(String::from);
            return (msg.to_string(), code);
        }
        if let Some(msg) = value["message"].as_str() {
            return (msg.to_string(), value["code"].as_str().map(String::from));
        }
    }
    (format!("HTTP {status}: {body}"), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use parley_core::Turn;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerationRequest {
        GenerationRequest {
            model: model.into(),
            system: Some("be brief".into()),
            turns: vec![Turn::user("hello")],
            max_tokens: None,
            temperature: None,
        }
    }

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            base_url: server.uri(),
            api_key: "test-key".into(),
        })
    }

    #[test]
    fn body_includes_system_and_turns() {
        let body = OpenAiProvider::build_body(&request("m"), false);
        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn body_without_system() {
        let req = GenerationRequest {
            system: None,
            ..request("m")
        };
        let body = OpenAiProvider::build_body(&req, true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gpt-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-test",
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            })))
            .mount(&server)
            .await;

        let generation = provider_for(&server)
            .complete(&request("gpt-test"))
            .await
            .unwrap();
        assert_eq!(generation.content, "hi there");
        assert_eq!(generation.model, "gpt-test");
    }

    #[tokio::test]
    async fn complete_404_maps_to_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"message": "The model `nope` does not exist", "code": "model_not_found"},
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&request("nope"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ModelUnavailable { model } if model == "nope"
        ));
    }

    #[tokio::test]
    async fn complete_model_not_found_code_without_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "unknown model", "code": "model_not_found"},
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&request("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelUnavailable { .. }));
    }

    #[tokio::test]
    async fn complete_500_is_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&request("m"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn complete_401_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"},
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&request("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth { .. }));
    }

    #[tokio::test]
    async fn complete_missing_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&request("m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Other { .. }));
    }

    #[tokio::test]
    async fn stream_yields_delta_chunks() {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let stream = provider_for(&server).stream(&request("m")).await.unwrap();
        let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn stream_request_error_fails_before_first_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
            .mount(&server)
            .await;

        let Err(err) = provider_for(&server).stream(&request("m")).await else {
            panic!("expected stream request to fail");
        };
        assert!(matches!(err, ProviderError::ModelUnavailable { .. }));
    }

    #[test]
    fn classify_error_envelopes() {
        let err = classify_error(
            429,
            r#"{"error":{"message":"slow down","type":"rate_limit_error"}}"#,
            "m",
            Some(2000),
        );
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: 2000,
                ..
            }
        ));

        let err = classify_error(429, "", "m", None);
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_ms(), Some(0));

        let err = classify_error(400, r#"{"message":"flat","code":"bad"}"#, "m", None);
        assert!(matches!(err, ProviderError::Api { retryable: false, .. }));

        let err = classify_error(503, "not json", "m", None);
        if let ProviderError::Api { message, .. } = err {
            assert!(message.contains("HTTP 503"));
        } else {
            panic!("expected Api error");
        }
    }
}
