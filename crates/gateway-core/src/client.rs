//! The service client (§4.2): a thin `reqwest`-backed transport for
//! subgraph requests, behind a trait so the executor can be exercised
//! against a fake in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use gateway_json::Value;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// One file to attach as a multipart part, keyed by the dotted variable path
/// it fills in (`variables.input.file`), per the GraphQL multipart request
/// spec (§4.2).
#[derive(Clone, Debug)]
pub struct Upload {
    pub variable_path: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ServiceRequest<'a> {
    pub url: &'a str,
    pub document: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: Option<Value>,
    pub uploads: Vec<Upload>,
}

/// The GraphQL-over-HTTP response envelope a subgraph returns.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SubgraphResponse {
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<RemoteError>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Value>,
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn request(&self, request: ServiceRequest<'_>) -> Result<SubgraphResponse, ClientError>;
}

/// The production client: one shared `reqwest::Client`, a configured byte
/// cap, and a user agent applied to every outbound request.
pub struct HttpServiceClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpServiceClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(HttpServiceClient { http, config })
    }
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "operationName")]
    operation_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    #[tracing::instrument(name = "subgraph_request", skip_all, fields(url = %request.url, response_bytes = tracing::field::Empty))]
    async fn request(&self, request: ServiceRequest<'_>) -> Result<SubgraphResponse, ClientError> {
        let started = std::time::Instant::now();
        let builder = if request.uploads.is_empty() {
            self.json_request(&request)
        } else {
            self.multipart_request(&request)?
        };

        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status();
        let body = self.read_capped(response).await?;
        tracing::Span::current().record("response_bytes", body.len());
        tracing::debug!(elapsed = ?started.elapsed(), status = status.as_u16(), "subgraph responded");

        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus { status: status.as_u16() });
        }
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

impl HttpServiceClient {
    fn json_request(&self, request: &ServiceRequest<'_>) -> reqwest::RequestBuilder {
        let envelope =
            JsonEnvelope { query: request.document, operation_name: request.operation_name, variables: request.variables.as_ref() };
        self.http.post(request.url).json(&envelope)
    }

    /// Builds the GraphQL multipart request: an `operations` part holding the
    /// JSON envelope (file variables nulled out), a `map` part pointing each
    /// file's dotted variable path back to its form-field name, and one part
    /// per file (§4.2).
    fn multipart_request(&self, request: &ServiceRequest<'_>) -> Result<reqwest::RequestBuilder, ClientError> {
        let envelope =
            JsonEnvelope { query: request.document, operation_name: request.operation_name, variables: request.variables.as_ref() };
        let operations = serde_json::to_string(&envelope).map_err(|e| ClientError::Decode(e.to_string()))?;

        let mut map = serde_json::Map::new();
        for (i, upload) in request.uploads.iter().enumerate() {
            map.insert(i.to_string(), serde_json::json!([format!("variables.{}", upload.variable_path)]));
        }
        let map_json = serde_json::to_string(&map).map_err(|e| ClientError::Decode(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new().text("operations", operations).text("map", map_json);
        for (i, upload) in request.uploads.iter().enumerate() {
            let part = reqwest::multipart::Part::bytes(upload.bytes.to_vec())
                .file_name(upload.filename.clone())
                .mime_str(&upload.content_type)
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            form = form.part(i.to_string(), part);
        }
        Ok(self.http.post(request.url).multipart(form))
    }

    async fn read_capped(&self, response: reqwest::Response) -> Result<Bytes, ClientError> {
        let limit = self.config.max_response_size;
        if limit == 0 {
            return response.bytes().await.map_err(classify_body_error);
        }
        let mut collected = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_body_error)?;
            collected.extend_from_slice(&chunk);
            if collected.len() as u64 > limit {
                return Err(ClientError::SizeExceeded { limit });
            }
        }
        Ok(Bytes::from(collected))
    }
}

fn classify_send_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(error.to_string())
    }
}

fn classify_body_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn json_envelope_round_trips_through_a_mock_subgraph() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"name": "Rex"}})))
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(ClientConfig::default()).unwrap();
        let response = client
            .request(ServiceRequest { url: &server.uri(), document: "{ name }", operation_name: None, variables: None, uploads: vec![] })
            .await
            .unwrap();
        assert_eq!(response.data.unwrap().as_object().unwrap().get("name").unwrap().as_str(), Some("Rex"));
    }

    #[tokio::test]
    async fn non_2xx_status_is_an_unexpected_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let client = HttpServiceClient::new(ClientConfig::default()).unwrap();
        let err = client
            .request(ServiceRequest { url: &server.uri(), document: "{ name }", operation_name: None, variables: None, uploads: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus { status: 500 }));
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1024)))
            .mount(&server)
            .await;

        let mut config = ClientConfig::default();
        config.max_response_size = 16;
        let client = HttpServiceClient::new(config).unwrap();
        let err = client
            .request(ServiceRequest { url: &server.uri(), document: "{ name }", operation_name: None, variables: None, uploads: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SizeExceeded { limit: 16 }));
    }
}
