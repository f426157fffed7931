/*
 * batch_request.rs
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

//! Index-keyed JSON batches in the npm `batch-request` format.

use serde::Serialize;

use super::{parse_indexed_results, BatchResponseData, WireAdapter, BATCH_REQUEST_ADAPTER};
use crate::config::EndpointConfig;
use crate::error::BatchError;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::request::LogicalRequest;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRequestAdapter;

#[derive(Serialize)]
struct BatchItem<'a> {
    method: &'a str,
    uri: &'a str,
    headers: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
}

impl<'a> BatchItem<'a> {
    fn new(request: &'a LogicalRequest) -> Self {
        let headers = request
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        // GET carries no body. JSON bodies travel as JSON, anything else as a string.
        let body = match (&request.method, &request.body) {
            (Method::Get, _) | (_, None) => None,
            (_, Some(body)) => Some(
                serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.clone())),
            ),
        };
        Self {
            method: request.method.as_str(),
            uri: &request.url,
            headers,
            body,
        }
    }
}

impl WireAdapter for BatchRequestAdapter {
    fn key(&self) -> &str {
        BATCH_REQUEST_ADAPTER
    }

    fn build_request(
        &self,
        requests: &[LogicalRequest],
        config: &EndpointConfig,
    ) -> Result<HttpRequest, BatchError> {
        let items: serde_json::Map<String, serde_json::Value> = requests
            .iter()
            .enumerate()
            .map(|(i, r)| -> Result<(String, serde_json::Value), BatchError> {
                Ok((i.to_string(), serde_json::to_value(BatchItem::new(r))?))
            })
            .collect::<Result<_, _>>()?;
        let mut request = HttpRequest::new(Method::Post, config.batch_endpoint_url.as_str());
        for (name, value) in &config.batch_request_headers {
            request.header(name, value.as_str());
        }
        if request.get_header("Content-Type").is_none() {
            request.header("Content-Type", "application/json");
        }
        request.body(serde_json::to_string(&items)?);
        Ok(request)
    }

    fn parse_response<'r>(
        &self,
        requests: &'r [LogicalRequest],
        response: &HttpResponse,
        _config: &EndpointConfig,
    ) -> Result<Vec<BatchResponseData<'r>>, BatchError> {
        parse_indexed_results(requests, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResponseBody;
    use serde_json::{json, Value};

    fn config() -> EndpointConfig {
        EndpointConfig::new("http://api.example.com", "http://api.example.com/batch")
    }

    #[test]
    fn json_body_keyed_by_index() {
        let requests = vec![
            LogicalRequest::get("http://api.example.com/users/1").with_header("Accept", "application/json"),
            LogicalRequest::post("http://api.example.com/users", "{\"name\":\"a\"}"),
            LogicalRequest::new(Method::Put, "http://api.example.com/notes/2").with_body("plain text"),
            LogicalRequest::get("http://api.example.com/ignored-body").with_body("x"),
        ];
        let request = BatchRequestAdapter.build_request(&requests, &config()).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "http://api.example.com/batch");
        assert_eq!(request.get_header("content-type"), Some("application/json"));
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "0": {"method": "GET", "uri": "http://api.example.com/users/1", "headers": {"Accept": "application/json"}},
                "1": {"method": "POST", "uri": "http://api.example.com/users", "headers": {}, "body": {"name": "a"}},
                "2": {"method": "PUT", "uri": "http://api.example.com/notes/2", "headers": {}, "body": "plain text"},
                "3": {"method": "GET", "uri": "http://api.example.com/ignored-body", "headers": {}}
            })
        );
    }

    #[test]
    fn configured_content_type_is_kept() {
        let config = config().with_request_header("Content-Type", "application/vnd.batch+json");
        let request = BatchRequestAdapter
            .build_request(&[LogicalRequest::get("http://api.example.com/a")], &config)
            .unwrap();
        assert_eq!(request.get_header("Content-Type"), Some("application/vnd.batch+json"));
    }

    #[test]
    fn response_has_empty_status_text() {
        let requests = vec![LogicalRequest::get("http://api.example.com/users/1")];
        let mut response = HttpResponse::new(200);
        response.body(json!({"0": {"statusCode": 201, "body": {"id": 1}, "headers": {}}}).to_string());
        let results = BatchRequestAdapter.parse_response(&requests, &response, &config()).unwrap();
        assert_eq!(results[0].status, 201);
        assert_eq!(results[0].status_text, "");
        assert_eq!(results[0].body, ResponseBody::Json(json!({"id": 1})));
    }
}
