/*
 * multi_fetch.rs
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

//! GET-only query-string multiplexing (`GET /batch?0=/a&1=/b`), for multi-fetch style servers.

use super::{parse_indexed_results, BatchResponseData, WireAdapter, MULTI_FETCH_ADAPTER};
use crate::config::EndpointConfig;
use crate::error::BatchError;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::request::LogicalRequest;
use crate::uri::encode_uri_component;

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiFetchAdapter;

impl WireAdapter for MultiFetchAdapter {
    fn key(&self) -> &str {
        MULTI_FETCH_ADAPTER
    }

    fn can_batch_request(&self, request: &LogicalRequest, _config: &EndpointConfig) -> bool {
        request.method == Method::Get
    }

    fn build_request(
        &self,
        requests: &[LogicalRequest],
        config: &EndpointConfig,
    ) -> Result<HttpRequest, BatchError> {
        let mut url = format!("{}?", config.batch_endpoint_url);
        for (i, request) in requests.iter().enumerate() {
            let (path, query) = match request.url.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (request.url.as_str(), None),
            };
            if i > 0 {
                url.push('&');
            }
            url.push_str(&format!("{}={}", i, path.replacen(config.service_url.as_str(), "", 1)));
            if let Some(query) = query {
                url.push('?');
                url.push_str(&encode_uri_component(query));
            }
        }
        let mut request = HttpRequest::new(Method::Get, url);
        for (name, value) in &config.batch_request_headers {
            request.header(name, value.as_str());
        }
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
    use serde_json::json;

    fn config() -> EndpointConfig {
        EndpointConfig::new("http://www.myservice.com", "http://www.myservice.com/batch")
    }

    #[test]
    fn get_only() {
        assert!(MultiFetchAdapter.can_batch_request(&LogicalRequest::get("http://www.myservice.com/a"), &config()));
        assert!(!MultiFetchAdapter
            .can_batch_request(&LogicalRequest::post("http://www.myservice.com/a", "{}"), &config()));
    }

    #[test]
    fn paths_are_multiplexed_into_query() {
        let config = config().with_request_header("X-Client", "web");
        let requests = vec![
            LogicalRequest::get("http://www.myservice.com/resource"),
            LogicalRequest::get("http://www.myservice.com/resource-two?a=1&b=2"),
        ];
        let request = MultiFetchAdapter.build_request(&requests, &config).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(
            request.url,
            "http://www.myservice.com/batch?0=/resource&1=/resource-two?a%3D1%26b%3D2"
        );
        assert_eq!(request.get_header("X-Client"), Some("web"));
        assert!(request.body.is_none());
    }

    #[test]
    fn results_keyed_by_index() {
        let requests = vec![
            LogicalRequest::get("http://www.myservice.com/resource"),
            LogicalRequest::get("http://www.myservice.com/resource-two"),
        ];
        let mut response = HttpResponse::new(200);
        response.body(
            json!({
                "0": {"statusCode": 200, "body": "first", "headers": {"content-type": "text/plain"}},
                "1": {"statusCode": 200, "body": [1, 2], "headers": {}}
            })
            .to_string(),
        );
        let results = MultiFetchAdapter.parse_response(&requests, &response, &config()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].body, ResponseBody::Text("first".to_string()));
        assert_eq!(results[0].headers, vec![("content-type".to_string(), "text/plain".to_string())]);
        assert!(std::ptr::eq(results[1].request, &requests[1]));
        assert_eq!(results[1].body, ResponseBody::Json(json!([1, 2])));
    }

    #[test]
    fn malformed_json_is_error() {
        let requests = vec![LogicalRequest::get("http://www.myservice.com/a")];
        let mut response = HttpResponse::new(200);
        response.body("not json");
        assert!(matches!(
            MultiFetchAdapter.parse_response(&requests, &response, &config()),
            Err(BatchError::Json(_))
        ));
    }
}
