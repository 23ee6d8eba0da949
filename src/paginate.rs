//! Paginated collection of list endpoints.
//!
//! Control planes page list responses by offset or by a server-supplied
//! marker. [`Paginator::collect_all`] drives either scheme until the first
//! empty page and returns all records in order. Termination is driven by
//! "empty page observed", never by a server-reported total count, so a
//! server whose totals disagree with its pages cannot loop us forever.
//! Each call starts a fresh pagination from zero.

use serde_json::Value;

use crate::client::{ApiRequest, RestClient};
use crate::error::ProviderError;
use crate::path::{path_array, path_str};

/// How the endpoint advances between pages.
#[derive(Debug, Clone)]
pub enum PageMode {
    /// Numeric offset paging: `?offset=N&limit=L`. The offset advances by
    /// the number of records actually returned, not by the requested
    /// limit, to stay correct against servers that return short pages.
    Offset {
        /// Name of the offset query parameter.
        param: String,
        /// Page size requested per call (endpoints fix this at 10-100).
        limit: usize,
    },
    /// Marker paging: each page carries the marker for the next one.
    Marker {
        /// Name of the marker query parameter.
        param: String,
        /// Path of the next-page marker inside the response body.
        next_path: String,
    },
}

/// Declarative pagination over one list endpoint.
#[derive(Debug, Clone)]
pub struct Paginator {
    /// Path of the record array inside each page body.
    pub records_path: String,
    /// The paging scheme.
    pub mode: PageMode,
}

impl Paginator {
    /// Offset paging with a `limit`/`offset` query pair.
    pub fn offset(records_path: impl Into<String>, limit: usize) -> Self {
        Self {
            records_path: records_path.into(),
            mode: PageMode::Offset {
                param: "offset".to_string(),
                limit,
            },
        }
    }

    /// Marker paging advancing via `next_path` in each response.
    pub fn marker(
        records_path: impl Into<String>,
        param: impl Into<String>,
        next_path: impl Into<String>,
    ) -> Self {
        Self {
            records_path: records_path.into(),
            mode: PageMode::Marker {
                param: param.into(),
                next_path: next_path.into(),
            },
        }
    }

    /// Fetch every page of `template`, concatenating the record arrays.
    pub async fn collect_all(
        &self,
        client: &RestClient,
        template: &ApiRequest,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut marker = String::new();

        loop {
            let request = match &self.mode {
                PageMode::Offset { param, limit } => template
                    .clone()
                    .query(param, offset.to_string())
                    .query("limit", limit.to_string()),
                PageMode::Marker { param, .. } => {
                    if marker.is_empty() {
                        template.clone()
                    } else {
                        template.clone().query(param, marker.clone())
                    }
                }
            };

            let page = client.execute(&request).await?;
            let page_records = path_array(&self.records_path, &page);
            tracing::debug!(
                count = page_records.len(),
                total = records.len(),
                "collected page"
            );
            if page_records.is_empty() {
                break;
            }

            match &self.mode {
                PageMode::Offset { .. } => offset += page_records.len(),
                PageMode::Marker { next_path, .. } => {
                    marker = path_str(next_path, &page, "");
                    records.extend(page_records);
                    if marker.is_empty() {
                        break;
                    }
                    continue;
                }
            }
            records.extend(page_records);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_offset_pages_concatenate_in_order() {
        let server = MockServer::start().await;
        for (offset, page) in [
            ("0", json!(["a", "b"])),
            ("2", json!(["c"])),
            ("3", json!([])),
        ] {
            Mock::given(method("GET"))
                .and(path("/v1/items"))
                .and(query_param("offset", offset))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": page})))
                .mount(&server)
                .await;
        }

        let client = RestClient::new(&server.uri()).unwrap();
        let paginator = Paginator::offset("items", 2);
        let records = paginator
            .collect_all(&client, &ApiRequest::get("v1/items"))
            .await
            .unwrap();
        assert_eq!(records, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_terminates_despite_inconsistent_total() {
        let server = MockServer::start().await;
        // The server claims 50 records but only ever serves three.
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 50, "items": ["a", "b", "c"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param("offset", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 50, "items": []
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(&server.uri()).unwrap();
        let records = Paginator::offset("items", 3)
            .collect_all(&client, &ApiRequest::get("v1/items"))
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_marker_pagination_follows_next_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param("marker", "m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "c"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": "a"}, {"id": "b"}], "next_marker": "m1"
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(&server.uri()).unwrap();
        let records = Paginator::marker("items", "marker", "next_marker")
            .collect_all(&client, &ApiRequest::get("v1/items"))
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["id"], "c");
    }

    #[tokio::test]
    async fn test_missing_records_path_is_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unrelated": 1})))
            .mount(&server)
            .await;

        let client = RestClient::new(&server.uri()).unwrap();
        let records = Paginator::offset("items", 10)
            .collect_all(&client, &ApiRequest::get("v1/items"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let client = RestClient::new(&server.uri()).unwrap();
        let err = Paginator::offset("items", 10)
            .collect_all(&client, &ApiRequest::get("v1/items"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 403, .. }));
    }
}
