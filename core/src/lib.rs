/*
 * lib.rs
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

//! httpbatch core: collects HTTP calls aimed at a batch-capable service and sends them as one
//! physical request to the service's batch endpoint, then splits the combined response back
//! out to each caller.
//!
//! - `batcher`: per-endpoint collection windows (`BatchEngine`), flush triggers, fan-out.
//! - `adapter`: wire formats (multipart/mixed, query-string multi-fetch, JSON batch-request).
//! - `mime`: the multipart/mixed batch codec used by the default adapter.
//! - `transport`: the collaborator that sends one physical request (`HttpTransport` by default).

pub mod adapter;
pub mod batcher;
pub mod config;
pub mod environment;
pub mod error;
pub mod http;
pub mod mime;
pub mod request;
pub mod transport;
pub mod uri;

pub use adapter::{Adapter, BatchResponseData, WireAdapter};
pub use batcher::BatchEngine;
pub use config::{load_config, AdapterSelector, BatchConfig, EndpointConfig};
pub use environment::{Environment, Location, StaticEnvironment};
pub use error::BatchError;
pub use http::{HttpRequest, HttpResponse, Method};
pub use request::{BatchOutcome, BatchResponse, LogicalRequest, ResponseBody, ResponseFuture};
pub use transport::{HttpTransport, Transport, TransportFailure, TransportFuture};
