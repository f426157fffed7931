/*
 * http_batch.rs
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

//! Default adapter: `multipart/mixed` with one `application/http` part per request, as
//! understood by ASP.NET Web API style batch handlers.

use std::fmt;
use std::sync::Arc;

use super::{BatchResponseData, WireAdapter, HTTP_BATCH_ADAPTER};
use crate::config::EndpointConfig;
use crate::environment::Environment;
use crate::error::BatchError;
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::mime::{decode_batch, encode_batch, find_response_boundary};
use crate::request::LogicalRequest;

#[derive(Clone)]
pub struct HttpBatchAdapter {
    env: Arc<dyn Environment>,
}

impl HttpBatchAdapter {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

impl fmt::Debug for HttpBatchAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBatchAdapter")
            .field("location", self.env.location())
            .finish()
    }
}

impl WireAdapter for HttpBatchAdapter {
    fn key(&self) -> &str {
        HTTP_BATCH_ADAPTER
    }

    fn build_request(
        &self,
        requests: &[LogicalRequest],
        config: &EndpointConfig,
    ) -> Result<HttpRequest, BatchError> {
        let boundary = self.env.calculate_boundary();
        let mut request = HttpRequest::new(Method::Post, config.batch_endpoint_url.as_str());
        for (name, value) in &config.batch_request_headers {
            request.header(name, value.as_str());
        }
        request.header("Content-Type", format!("multipart/mixed; boundary={}", boundary));
        request.body(encode_batch(requests, config, self.env.as_ref(), &boundary));
        Ok(request)
    }

    fn parse_response<'r>(
        &self,
        requests: &'r [LogicalRequest],
        response: &HttpResponse,
        _config: &EndpointConfig,
    ) -> Result<Vec<BatchResponseData<'r>>, BatchError> {
        let content_type = response
            .get_header("Content-Type")
            .ok_or_else(|| BatchError::Protocol("batch response without Content-Type".to_string()))?;
        let boundary = find_response_boundary(content_type).ok_or_else(|| {
            BatchError::Protocol(format!("no boundary in response Content-Type {:?}", content_type))
        })?;
        let parts = decode_batch(&boundary, &response.text())?;
        if parts.len() != requests.len() {
            tracing::warn!(
                parts = parts.len(),
                requests = requests.len(),
                "batch response part count does not match request count"
            );
        }
        Ok(requests
            .iter()
            .zip(parts)
            .map(|(request, part)| BatchResponseData {
                request,
                status: part.status,
                status_text: part.status_text,
                headers: part.headers,
                body: part.body,
            })
            .collect())
    }
}
