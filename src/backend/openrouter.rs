//! Analyzer for OpenRouter's OpenAI-compatible chat completions API.
//!
//! Endpoint: `{base_url}/v1/chat/completions`, always chat mode with the
//! extraction instructions as the system message and the bulletin text as
//! the user message.

use super::{error_from_response, AnalysisRequest, AnalysisResponse, Analyzer};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const REFERER: &str = "https://github.com/rmoriz/rubot";
const TITLE: &str = "bulletin-digest";

/// Analyzer backed by OpenRouter (or any OpenAI-compatible endpoint).
///
/// # Example
///
/// ```
/// use bulletin_digest::backend::OpenRouterAnalyzer;
/// use std::time::Duration;
///
/// let analyzer = OpenRouterAnalyzer::new(
///     "https://openrouter.ai/api",
///     "sk-or-...",
///     Duration::from_secs(120),
/// ).unwrap();
/// ```
#[derive(Clone)]
pub struct OpenRouterAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenRouterAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.chars().count() > 6 {
            format!("{}***", crate::format::truncate(&self.api_key, 6))
        } else {
            "***".to_string()
        };
        f.debug_struct("OpenRouterAnalyzer")
            .field("base_url", &self.base_url)
            .field("api_key", &key)
            .finish()
    }
}

impl OpenRouterAnalyzer {
    /// Create an analyzer whose requests give up after `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Build the request body for `/v1/chat/completions`.
    fn build_body(request: &AnalysisRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        messages.push(json!({"role": "user", "content": request.document}));

        json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    /// Build the reqwest request with appropriate headers.
    fn build_http_request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .json(body)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
    }

    /// Pull the assistant message out of a completion envelope.
    ///
    /// A body without `choices[0].message.content` is malformed; a present but
    /// blank content is an empty response. Both are worth retrying.
    fn extract_content(json_resp: &Value) -> Result<String> {
        let content = json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"));

        match content {
            Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
            Some(Value::String(_)) | Some(Value::Null) => {
                Err(PipelineError::EmptyResponse("openrouter".into()))
            }
            _ => {
                let snippet = json_resp.to_string();
                Err(PipelineError::MalformedResponse(format!(
                    "no choices[0].message.content in response: {}",
                    crate::format::truncate(&snippet, 200)
                )))
            }
        }
    }

    /// Extract metadata from a completion envelope.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["usage", "model", "id"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Analyzer for OpenRouterAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let url = self.endpoint();
        let body = Self::build_body(request);
        tracing::debug!(
            url = %url,
            model = %request.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            document_chars = request.document.len(),
            "sending analysis request"
        );

        let resp = self.build_http_request(&url, &body).send().await?;
        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let raw = resp.text().await?;
        let json_resp: Value = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::MalformedResponse(format!("response is not JSON: {}", e))
        })?;

        if let Some(err) = json_resp.get("error") {
            // OpenRouter sometimes reports upstream failures in a 200 body.
            return Err(PipelineError::MalformedResponse(format!("provider error: {}", err)));
        }

        let text = Self::extract_content(&json_resp)?;
        tracing::debug!(status, chars = text.len(), "analysis response received");

        Ok(AnalysisResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request() -> AnalysisRequest {
        AnalysisRequest {
            model: "openai/gpt-4o".into(),
            system_prompt: "Extract announcements as JSON.".into(),
            document: "# Rathaus Umschau\n\nStadtrat tagt.".into(),
            temperature: 0.1,
            max_tokens: 4000,
        }
    }

    fn analyzer() -> OpenRouterAnalyzer {
        OpenRouterAnalyzer::new("https://openrouter.ai/api/", "sk-or-1234567890", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_chat_payload() {
        let body = OpenRouterAnalyzer::build_body(&test_request());

        assert_eq!(body["model"], "openai/gpt-4o");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 4000);

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Extract announcements as JSON.");
        assert_eq!(messages[1]["role"], "user");
        assert!(messages[1]["content"].as_str().unwrap().contains("Stadtrat"));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(analyzer().endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_headers() {
        let analyzer = analyzer();
        let req = analyzer
            .build_http_request(&analyzer.endpoint(), &json!({"test": true}))
            .build()
            .expect("build request");

        assert_eq!(req.headers().get("Authorization").unwrap(), "Bearer sk-or-1234567890");
        assert_eq!(req.headers().get("X-Title").unwrap(), TITLE);
        assert!(req.headers().get("HTTP-Referer").is_some());
    }

    #[test]
    fn test_extract_content_ok() {
        let resp = json!({"choices": [{"message": {"content": "{\"summary\": \"x\"}"}}]});
        assert_eq!(
            OpenRouterAnalyzer::extract_content(&resp).unwrap(),
            "{\"summary\": \"x\"}"
        );
    }

    #[test]
    fn test_extract_content_empty_is_retryable() {
        let resp = json!({"choices": [{"message": {"content": "  "}}]});
        let err = OpenRouterAnalyzer::extract_content(&resp).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResponse(_)));
        assert!(err.disposition().is_retryable());
    }

    #[test]
    fn test_extract_content_missing_choices_is_malformed() {
        let err = OpenRouterAnalyzer::extract_content(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
        assert!(err.disposition().is_retryable());
    }

    #[test]
    fn test_extract_content_non_ascii_body_is_malformed() {
        let resp = json!({"error": {"message": format!("Überlastung {}", "ä".repeat(200))}});
        let err = OpenRouterAnalyzer::extract_content(&resp).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(ref m) if m.contains("Überlastung")));
        assert!(err.disposition().is_retryable());

        let resp = json!({"xy": "ä".repeat(200)});
        let err = OpenRouterAnalyzer::extract_content(&resp).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));
    }

    #[test]
    fn test_extract_metadata() {
        let resp = json!({"id": "gen-1", "model": "openai/gpt-4o", "usage": {"total_tokens": 10}});
        let meta = OpenRouterAnalyzer::extract_metadata(&resp).unwrap();
        assert_eq!(meta["id"], "gen-1");
        assert_eq!(meta["usage"]["total_tokens"], 10);
        assert!(OpenRouterAnalyzer::extract_metadata(&json!({})).is_none());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug_output = format!("{:?}", analyzer());
        assert!(!debug_output.contains("1234567890"), "API key must not appear in Debug output");
        assert!(debug_output.contains("sk-or-"));
        assert!(debug_output.contains("***"));
    }

    #[test]
    fn test_debug_non_ascii_api_key() {
        let analyzer =
            OpenRouterAnalyzer::new("https://openrouter.ai/api", "ééééééééé", Duration::from_secs(5))
                .unwrap();
        let debug_output = format!("{:?}", analyzer);
        assert!(debug_output.contains("éééééé***"));
        assert!(!debug_output.contains("ééééééé"));
    }
}
