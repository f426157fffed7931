/*
 * request.rs
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

//! Logical requests (one per caller) and what each caller gets back.

use std::future::Future;
use std::pin::Pin;

use crate::error::BatchError;
use crate::http::{find_header, Method};

/// One caller's HTTP call, eligible for batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRequest {
    /// Absolute (`https://host/path`) or relative (`api/items`, `./api/items`) URL.
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl LogicalRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Method::Post, url).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Body of one batched response, already converted by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(serde_json::Value),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// What a caller receives for a batched request: status, body, headers as text, status text.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub status: u16,
    pub status_text: String,
    pub body: ResponseBody,
    /// `name: value` lines joined with `\n`.
    pub headers: String,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header in the joined header text (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// Headers parsed back into pairs.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }

    pub fn content_type(&self) -> Option<String> {
        find_header(&self.header_pairs(), "Content-Type").map(str::to_string)
    }
}

/// Exactly one of these is delivered per submitted request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The request went out in a batch (or the batch failed as a whole) and this is its answer.
    Completed(BatchResponse),
    /// Not batched: the caller should send the request directly.
    ContinueNormally(LogicalRequest),
}

impl BatchOutcome {
    pub fn into_response(self) -> Option<BatchResponse> {
        match self {
            BatchOutcome::Completed(r) => Some(r),
            BatchOutcome::ContinueNormally(_) => None,
        }
    }
}

/// Resolves once the request's batch has been answered, failed, or released.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<BatchOutcome, BatchError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_in_joined_text() {
        let r = BatchResponse {
            status: 200,
            status_text: "OK".to_string(),
            body: ResponseBody::Empty,
            headers: "Content-Type: application/json; charset=utf-8\nX-Trace: a:b".to_string(),
        };
        assert_eq!(r.header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(r.header("x-trace"), Some("a:b"));
        assert_eq!(r.header("missing"), None);
        assert_eq!(r.content_type().as_deref(), Some("application/json; charset=utf-8"));
        assert!(r.is_success());
    }
}
