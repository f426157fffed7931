/*
 * error.rs
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

//! Batching errors.

use thiserror::Error;

/// Errors from configuration, adapters, and the batch engine.
///
/// `Clone` because one failed physical request resolves every caller in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// An endpoint names an adapter that is not registered.
    #[error("unknown batch adapter: {0}")]
    UnknownAdapter(String),
    /// The batch response could not be framed (no boundary, malformed part).
    #[error("batch protocol error: {0}")]
    Protocol(String),
    /// The batch response had no part for the request at this position.
    #[error("no response part for batched request {index}")]
    MissingResponse { index: usize },
    /// A JSON body could not be parsed or built.
    #[error("invalid JSON: {0}")]
    Json(String),
    /// The transport could not be set up (bad endpoint URL etc.).
    #[error("transport error: {0}")]
    Transport(String),
    /// The engine went away before the request was resolved.
    #[error("batched request was cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for BatchError {
    fn from(e: serde_json::Error) -> Self {
        BatchError::Json(e.to_string())
    }
}
