/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of httpbatch, a client-side HTTP request batcher.
 *
 * httpbatch is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * httpbatch is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with httpbatch.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Wire adapters: turn a batch of logical requests into one physical request and split the
//! physical response back into per-request results.
//!
//! Built-ins are selected by name; anything else implementing [`WireAdapter`] can be supplied
//! as a custom adapter.

mod batch_request;
mod http_batch;
mod multi_fetch;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::{AdapterSelector, EndpointConfig};
use crate::environment::Environment;
use crate::error::BatchError;
use crate::http::{headers_to_string, HttpRequest, HttpResponse};
use crate::request::{BatchResponse, LogicalRequest, ResponseBody};

pub use batch_request::BatchRequestAdapter;
pub use http_batch::HttpBatchAdapter;
pub use multi_fetch::MultiFetchAdapter;

pub const HTTP_BATCH_ADAPTER: &str = "httpBatchAdapter";
pub const MULTI_FETCH_ADAPTER: &str = "nodeJsMultiFetchAdapter";
pub const BATCH_REQUEST_ADAPTER: &str = "npmBatchRequestAdapter";

/// One decoded result, tied to the logical request it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponseData<'r> {
    pub request: &'r LogicalRequest,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl BatchResponseData<'_> {
    /// What the caller sees: headers flattened to `name: value` lines.
    pub fn into_response(self) -> BatchResponse {
        BatchResponse {
            status: self.status,
            status_text: self.status_text,
            body: self.body,
            headers: headers_to_string(&self.headers),
        }
    }
}

/// Batch wire format.
///
/// `build_request` must frame requests in slice order. `parse_response` returns at most one
/// entry per request; each entry's `request` must point into the `requests` slice it was given.
/// Requests without an entry are answered with [`BatchError::MissingResponse`].
pub trait WireAdapter: Send + Sync {
    fn key(&self) -> &str;

    /// Guard for requests this format cannot carry.
    fn can_batch_request(&self, request: &LogicalRequest, config: &EndpointConfig) -> bool {
        let _ = (request, config);
        true
    }

    fn build_request(
        &self,
        requests: &[LogicalRequest],
        config: &EndpointConfig,
    ) -> Result<HttpRequest, BatchError>;

    fn parse_response<'r>(
        &self,
        requests: &'r [LogicalRequest],
        response: &HttpResponse,
        config: &EndpointConfig,
    ) -> Result<Vec<BatchResponseData<'r>>, BatchError>;
}

/// Resolved adapter for one endpoint.
#[derive(Clone)]
pub enum Adapter {
    HttpBatch(HttpBatchAdapter),
    MultiFetch(MultiFetchAdapter),
    BatchRequest(BatchRequestAdapter),
    Custom(Arc<dyn WireAdapter>),
}

impl Adapter {
    /// Look up a built-in by name or wrap a custom implementation.
    pub fn resolve(selector: &AdapterSelector, env: &Arc<dyn Environment>) -> Result<Self, BatchError> {
        match selector {
            AdapterSelector::Named(name) => match name.as_str() {
                HTTP_BATCH_ADAPTER => Ok(Adapter::HttpBatch(HttpBatchAdapter::new(env.clone()))),
                MULTI_FETCH_ADAPTER => Ok(Adapter::MultiFetch(MultiFetchAdapter)),
                BATCH_REQUEST_ADAPTER => Ok(Adapter::BatchRequest(BatchRequestAdapter)),
                other => Err(BatchError::UnknownAdapter(other.to_string())),
            },
            AdapterSelector::Custom(adapter) => Ok(Adapter::Custom(adapter.clone())),
        }
    }

    fn inner(&self) -> &dyn WireAdapter {
        match self {
            Adapter::HttpBatch(a) => a,
            Adapter::MultiFetch(a) => a,
            Adapter::BatchRequest(a) => a,
            Adapter::Custom(a) => a.as_ref(),
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Adapter").field(&self.key()).finish()
    }
}

impl WireAdapter for Adapter {
    fn key(&self) -> &str {
        self.inner().key()
    }

    fn can_batch_request(&self, request: &LogicalRequest, config: &EndpointConfig) -> bool {
        self.inner().can_batch_request(request, config)
    }

    fn build_request(
        &self,
        requests: &[LogicalRequest],
        config: &EndpointConfig,
    ) -> Result<HttpRequest, BatchError> {
        self.inner().build_request(requests, config)
    }

    fn parse_response<'r>(
        &self,
        requests: &'r [LogicalRequest],
        response: &HttpResponse,
        config: &EndpointConfig,
    ) -> Result<Vec<BatchResponseData<'r>>, BatchError> {
        self.inner().parse_response(requests, response, config)
    }
}

// ── Index-keyed JSON responses ────────────────────────────────────────

/// `{"0": {"statusCode": 200, "body": ..., "headers": {...}}, "1": ...}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexedResult {
    status_code: u16,
    #[serde(default)]
    body: serde_json::Value,
    #[serde(default)]
    headers: serde_json::Map<String, serde_json::Value>,
}

/// Decode an index-keyed JSON batch response. Indexes absent from the response are skipped.
fn parse_indexed_results<'r>(
    requests: &'r [LogicalRequest],
    response: &HttpResponse,
) -> Result<Vec<BatchResponseData<'r>>, BatchError> {
    let mut results: HashMap<String, IndexedResult> = serde_json::from_slice(&response.body)?;
    let mut out = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        let Some(result) = results.remove(&i.to_string()) else {
            tracing::warn!(index = i, "no result for request in batch response");
            continue;
        };
        let headers = result
            .headers
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect();
        let body = match result.body {
            serde_json::Value::Null => ResponseBody::Empty,
            serde_json::Value::String(s) => ResponseBody::Text(s),
            other => ResponseBody::Json(other),
        };
        out.push(BatchResponseData {
            request,
            status: result.status_code,
            status_text: String::new(),
            headers,
            body,
        });
    }
    if !results.is_empty() {
        tracing::warn!(extra = results.len(), "batch response has results for unknown indexes");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;
    use serde_json::json;

    fn env() -> Arc<dyn Environment> {
        Arc::new(StaticEnvironment::new("http://localhost/"))
    }

    #[test]
    fn resolve_by_name() {
        for name in [HTTP_BATCH_ADAPTER, MULTI_FETCH_ADAPTER, BATCH_REQUEST_ADAPTER] {
            let adapter = Adapter::resolve(&AdapterSelector::Named(name.to_string()), &env()).unwrap();
            assert_eq!(adapter.key(), name);
        }
        assert_eq!(
            Adapter::resolve(&AdapterSelector::Named("nope".to_string()), &env()).unwrap_err(),
            BatchError::UnknownAdapter("nope".to_string())
        );
    }

    #[test]
    fn custom_adapter_is_used() {
        let custom: Arc<dyn WireAdapter> = Arc::new(MultiFetchAdapter);
        let adapter = Adapter::resolve(&AdapterSelector::Custom(custom), &env()).unwrap();
        assert!(matches!(adapter, Adapter::Custom(_)));
        assert_eq!(adapter.key(), MULTI_FETCH_ADAPTER);
    }

    #[test]
    fn indexed_results_skip_missing_indexes() {
        let requests = vec![LogicalRequest::get("a"), LogicalRequest::get("b")];
        let mut response = HttpResponse::new(200);
        response.body(
            json!({"1": {"statusCode": 404, "body": {"err": "x"}, "headers": {"X-A": "1", "X-N": 2}}})
                .to_string(),
        );
        let results = parse_indexed_results(&requests, &response).unwrap();
        assert_eq!(results.len(), 1);
        assert!(std::ptr::eq(results[0].request, &requests[1]));
        assert_eq!(results[0].status, 404);
        assert_eq!(results[0].status_text, "");
        assert_eq!(results[0].body, ResponseBody::Json(json!({"err": "x"})));
        assert_eq!(
            results[0].headers,
            vec![("X-A".to_string(), "1".to_string()), ("X-N".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn into_response_joins_headers() {
        let request = LogicalRequest::get("a");
        let data = BatchResponseData {
            request: &request,
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("X-A".to_string(), "1".to_string()),
            ],
            body: ResponseBody::Text("hi".to_string()),
        };
        let response = data.into_response();
        assert_eq!(response.headers, "Content-Type: text/plain\nX-A: 1");
        assert_eq!(response.header("x-a"), Some("1"));
    }
}
