//! Remote operation client.
//!
//! [`RestClient`] issues exactly one HTTPS call per invocation and returns
//! the parsed body or an error carrying the raw status and body for
//! downstream classification. Retries are never performed here; they are
//! layered in the waiter. The underlying `reqwest::Client` holds the
//! connection pool and is safe to share across concurrent orchestrations.
//!
//! Credential and endpoint resolution are the caller's concern: the caller
//! supplies the base URL and any authentication headers.

use std::collections::HashMap;

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::ProviderError;

/// Success status codes used when a request declares none.
const DEFAULT_OK_CODES: &[u16] = &[200, 201, 202, 204];

/// A single declarative REST call: method, path template with
/// `{placeholder}` segments, query, optional JSON body, and the set of
/// status codes considered successful. Built fresh per call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path_template: String,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    ok_codes: Vec<u16>,
}

impl ApiRequest {
    /// Start building a request for `method` against `path_template`,
    /// e.g. `v1/{project_id}/networks/{id}`.
    pub fn new(method: Method, path_template: impl Into<String>) -> Self {
        Self {
            method,
            path_template: path_template.into(),
            path_params: HashMap::new(),
            query: Vec::new(),
            body: None,
            ok_codes: DEFAULT_OK_CODES.to_vec(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path_template: impl Into<String>) -> Self {
        Self::new(Method::GET, path_template)
    }

    /// Shorthand for a POST request.
    pub fn post(path_template: impl Into<String>) -> Self {
        Self::new(Method::POST, path_template)
    }

    /// Shorthand for a PUT request.
    pub fn put(path_template: impl Into<String>) -> Self {
        Self::new(Method::PUT, path_template)
    }

    /// Shorthand for a DELETE request.
    pub fn delete(path_template: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path_template)
    }

    /// Substitute a `{placeholder}` in the path template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Append a query pair.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace the set of status codes treated as success.
    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Render the path with all placeholders substituted.
    fn rendered_path(&self) -> Result<String, ProviderError> {
        let mut path = self.path_template.clone();
        for (name, value) in &self.path_params {
            path = path.replace(&format!("{{{name}}}"), value);
        }
        if path.contains('{') {
            return Err(ProviderError::Configuration(format!(
                "unsubstituted placeholder in request path: {path}"
            )));
        }
        Ok(path)
    }
}

/// HTTP client for a single control-plane endpoint.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
    headers: HashMap<String, String>,
}

impl RestClient {
    /// Create a client for `base_url`. Fails on an unparseable URL.
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("nimbus-provider-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            headers: HashMap::new(),
        })
    }

    /// Add a header sent with every request (auth token, project scope).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Issue the request. One network call, no retries.
    ///
    /// On a declared-ok status the parsed body is returned (`Value::Null`
    /// for empty bodies). Any other status yields
    /// [`ProviderError::Api`] with the raw body preserved.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ProviderError> {
        let path = request.rendered_path()?;
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| ProviderError::Configuration(format!("invalid request path: {e}")))?;

        tracing::debug!(method = %request.method, %url, "issuing control-plane request");

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !request.ok_codes.contains(&status) {
            tracing::debug!(status, "control-plane request returned non-ok status");
            return Err(ProviderError::Api { status, body });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> RestClient {
        RestClient::new(&server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_get_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/networks/n-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "network": {"id": "n-1", "status": "ACTIVE"}
            })))
            .mount(&server)
            .await;

        let request = ApiRequest::get("v1/networks/{id}").path_param("id", "n-1");
        let body = client_for(&server).await.execute(&request).await.unwrap();
        assert_eq!(body["network"]["status"], "ACTIVE");
    }

    #[tokio::test]
    async fn test_post_sends_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/networks"))
            .and(body_json(json!({"network": {"name": "test"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "n-2"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_header("X-Auth-Token", "tok");
        let request = ApiRequest::post("v1/networks").json_body(json!({"network": {"name": "test"}}));
        let body = client.execute(&request).await.unwrap();
        assert_eq!(body["id"], "n-2");
    }

    #[tokio::test]
    async fn test_non_ok_status_carries_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/networks/gone"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error_code":"VPC.0202"}"#),
            )
            .mount(&server)
            .await;

        let request = ApiRequest::get("v1/networks/{id}").path_param("id", "gone");
        let err = client_for(&server).await.execute(&request).await.unwrap_err();
        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("VPC.0202"));
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_declared_ok_codes_override_default() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/networks/n-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        // Only 204 is acceptable for this endpoint; a 200 would be an error.
        let request = ApiRequest::delete("v1/networks/{id}")
            .path_param("id", "n-1")
            .ok_codes(&[204]);
        let body = client_for(&server).await.execute(&request).await.unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_query_params_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/networks"))
            .and(query_param("offset", "10"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"networks": []})))
            .mount(&server)
            .await;

        let request = ApiRequest::get("v1/networks")
            .query("offset", "10")
            .query("limit", "10");
        let body = client_for(&server).await.execute(&request).await.unwrap();
        assert_eq!(body["networks"], json!([]));
    }

    #[tokio::test]
    async fn test_unsubstituted_placeholder_is_rejected() {
        let server = MockServer::start().await;
        let request = ApiRequest::get("v1/networks/{id}");
        let err = client_for(&server).await.execute(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}
