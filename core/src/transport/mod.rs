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

//! Sending physical batch requests. The engine only sees [`Transport`]; [`HttpTransport`] is
//! the default HTTP/1.1 implementation.

pub mod h1;
mod http;
mod tls;

use std::future::Future;
use std::io;
use std::pin::Pin;

use crate::http::{headers_to_string, HttpRequest, HttpResponse};
use crate::mime::convert_body;
use crate::request::{BatchResponse, ResponseBody};

pub use self::http::HttpTransport;

/// A failed send: what every caller in the batch receives instead of its own response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// HTTP status, or 0 when no response was received.
    pub status: u16,
    pub data: String,
    pub headers: Vec<(String, String)>,
    pub status_text: String,
}

impl TransportFailure {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            data: String::new(),
            headers: Vec::new(),
            status_text: status_text.into(),
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Non-2xx response from the batch endpoint.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: response.code,
            data: response.text().into_owned(),
            headers: response.headers.clone(),
            status_text: response.reason.clone().unwrap_or_default(),
        }
    }

    /// No response at all (connect, TLS, I/O or framing error).
    pub fn from_io(err: &io::Error) -> Self {
        Self::new(0, "").with_data(err.to_string())
    }

    /// The failure as a caller-visible response. JSON error bodies are parsed when possible.
    pub fn to_response(&self) -> BatchResponse {
        let content_type = crate::http::find_header(&self.headers, "Content-Type");
        let body = convert_body(content_type, &self.data)
            .unwrap_or_else(|_| ResponseBody::Text(self.data.clone()));
        BatchResponse {
            status: self.status,
            status_text: self.status_text.clone(),
            body,
            headers: headers_to_string(&self.headers),
        }
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status == 0 {
            write!(f, "batch request failed: {}", self.data)
        } else {
            write!(f, "batch request failed: {} {}", self.status, self.status_text)
        }
    }
}

pub type TransportFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, TransportFailure>> + Send>>;

/// Sends one physical request. Implementations may return non-2xx responses as `Ok`; the
/// engine treats those as failures.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> TransportFuture;
}
