//! HTTP client for the classification workflow.
//!
//! Posts `{workflow_id, parameters: {input}}` to the workflow endpoint and
//! decodes the double-encoded result. A single attempt per call: retrying is
//! left to the user, who sees the failure and can trigger analysis again.

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client as HttpClient;

use super::config::WorkflowConfig;
use super::decode::decode_workflow_output;
use super::errors::ClassifierError;
use super::streaming::parse_chat_stream;
use super::types::{ChatUpdate, ClassifierOutput, TabData, WorkflowParameters, WorkflowRequest};
use super::Classifier;

// ─── WorkflowClient ──────────────────────────────────────────────────────────

/// Client for the remote classification workflow.
pub struct WorkflowClient {
    /// HTTP client for classification requests.
    http: HttpClient,
    /// HTTP client for streaming chat (longer timeout).
    http_stream: HttpClient,
    config: WorkflowConfig,
}

impl WorkflowClient {
    /// Build a client. Does NOT check connectivity.
    pub fn from_config(config: WorkflowConfig) -> Result<Self, ClassifierError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClassifierError::ConnectionFailed {
                endpoint: config.endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.stream_timeout())
            .build()
            .map_err(|e| ClassifierError::ConnectionFailed {
                endpoint: config.chat_endpoint().to_string(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            config,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    // ─── Classification ──────────────────────────────────────────────────

    /// Classify a batch of tabs.
    pub async fn classify_tabs(
        &self,
        input: &[TabData],
    ) -> Result<ClassifierOutput, ClassifierError> {
        let url = &self.config.endpoint;
        let body = WorkflowRequest {
            workflow_id: &self.config.workflow_id,
            parameters: WorkflowParameters { input },
        };

        tracing::info!(
            url = %url,
            workflow_id = %self.config.workflow_id,
            tab_count = input.len(),
            "=== CLASSIFIER REQUEST ==="
        );

        let mut request = self.http.post(url).json(&body);
        if let Some(key) = self.config.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e, self.config.request_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "classifier returned non-success status");
            return Err(ClassifierError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout {
                    duration_secs: self.config.request_timeout_secs,
                }
            } else {
                ClassifierError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: format!("failed to read response body: {e}"),
                }
            }
        })?;

        let output = decode_workflow_output(&body_text)?;
        tracing::info!(
            buckets = match &output {
                ClassifierOutput::Flat(v) => v.len(),
                ClassifierOutput::Intent(v) => v.len(),
            },
            two_level = matches!(output, ClassifierOutput::Intent(_)),
            "classifier response decoded"
        );
        Ok(output)
    }

    // ─── Chat (streaming) ────────────────────────────────────────────────

    /// Start a streaming chat run.
    ///
    /// Each yielded `ChatUpdate` carries the full reply text so far.
    pub async fn chat_stream(
        &self,
        message: &str,
    ) -> Result<impl Stream<Item = Result<ChatUpdate, ClassifierError>>, ClassifierError> {
        let url = self.config.chat_endpoint();
        let body = WorkflowRequest {
            workflow_id: self.config.chat_workflow_id(),
            parameters: WorkflowParameters { input: message },
        };

        tracing::info!(
            url = %url,
            workflow_id = %body.workflow_id,
            message_len = message.len(),
            "=== CHAT REQUEST ==="
        );

        let mut request = self
            .http_stream
            .post(url)
            .json(&body)
            .header("Accept", "text/event-stream");
        if let Some(key) = self.config.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e, self.config.stream_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(parse_chat_stream(Box::pin(response.bytes_stream())))
    }

    // ─── Health Check ────────────────────────────────────────────────────

    /// Whether the workflow host answers at all. Never returns an error.
    pub async fn health_check(&self) -> bool {
        match self
            .http
            .head(&self.config.endpoint)
            .timeout(self.config.connect_timeout())
            .send()
            .await
        {
            Ok(resp) => !resp.status().is_server_error(),
            Err(_) => false,
        }
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error, timeout_secs: u64) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            ClassifierError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Classifier for WorkflowClient {
    async fn classify(&self, input: &[TabData]) -> Result<ClassifierOutput, ClassifierError> {
        self.classify_tabs(input).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::collect_chat_reply;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> WorkflowConfig {
        WorkflowConfig {
            endpoint,
            chat_endpoint: None,
            workflow_id: "wf-tabs".into(),
            chat_workflow_id: Some("wf-chat".into()),
            api_key: Some("sk-test".into()),
            connect_timeout_secs: 2,
            request_timeout_secs: 2,
            stream_timeout_secs: 5,
        }
    }

    fn input() -> Vec<TabData> {
        vec![
            TabData {
                id: 1,
                title: "x".into(),
                url: "https://github.com/x".into(),
            },
            TabData {
                id: 3,
                title: "a".into(),
                url: "https://news.site/a".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_classify_success_sends_contract_body() {
        let server = MockServer::start().await;
        let output = serde_json::json!([
            {"intent_level1": "Development", "subcategories": [{"intent_level2": "Repos", "tab_ids": [1]}]},
            {"intent_level1": "News", "subcategories": [{"intent_level2": "Articles", "tab_ids": [3]}]}
        ])
        .to_string();

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/run"))
            .and(matchers::header("authorization", "Bearer sk-test"))
            .and(matchers::body_partial_json(serde_json::json!({
                "workflow_id": "wf-tabs",
                "parameters": {"input": [{"id": 1, "title": "x", "url": "https://github.com/x"}, {"id": 3, "title": "a", "url": "https://news.site/a"}]}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "output": output })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkflowClient::from_config(test_config(format!("{}/run", server.uri()))).unwrap();
        match client.classify(&input()).await.unwrap() {
            ClassifierOutput::Intent(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected intent output, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classify_http_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = WorkflowClient::from_config(test_config(format!("{}/run", server.uri()))).unwrap();
        let err = client.classify(&input()).await.unwrap_err();
        assert_eq!(
            err,
            ClassifierError::HttpError {
                status: 503,
                body: "overloaded".into()
            }
        );
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_classify_malformed_output() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "output": "definitely not json" })),
            )
            .mount(&server)
            .await;

        let client = WorkflowClient::from_config(test_config(format!("{}/run", server.uri()))).unwrap();
        let err = client.classify(&input()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_classify_timeout() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "output": "[]" }))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = WorkflowClient::from_config(test_config(format!("{}/run", server.uri()))).unwrap();
        let err = client.classify(&input()).await.unwrap_err();
        assert_eq!(err, ClassifierError::Timeout { duration_secs: 2 });
    }

    #[tokio::test]
    async fn test_classify_connection_refused() {
        let client =
            WorkflowClient::from_config(test_config("http://127.0.0.1:1/run".into())).unwrap();
        let err = client.classify(&input()).await.unwrap_err();
        assert!(err.is_unavailable(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_chat_stream_replaces_content() {
        let server = MockServer::start().await;
        let sse = "event: message\ndata: {\"content\": \"Your tabs\", \"status\": \"in_progress\"}\n\n\
                   event: message\ndata: {\"content\": \"Your tabs cover two topics.\", \"status\": \"completed\"}\n\n";
        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(serde_json::json!({
                "workflow_id": "wf-chat",
                "parameters": {"input": "summarize"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let client = WorkflowClient::from_config(test_config(format!("{}/run", server.uri()))).unwrap();
        let stream = client.chat_stream("summarize").await.unwrap();
        let reply = collect_chat_reply(stream).await.unwrap();
        assert_eq!(reply, "Your tabs cover two topics.");
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = test_config("http://localhost/run".into());
        config.workflow_id = " ".into();
        assert!(WorkflowClient::from_config(config).is_err());
    }
}
