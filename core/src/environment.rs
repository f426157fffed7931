/*
 * environment.rs
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

//! The page the batcher runs for: current location (relative URL resolution), forwardable
//! cookies, and multipart boundary generation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Current document location, split the way relative URL resolution needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Full URL of the current document, e.g. `http://localhost:9876/app/index.html`.
    pub href: String,
    /// Scheme with trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Host with optional port, e.g. `localhost:9876`.
    pub host: String,
}

impl Location {
    /// Split an absolute URL into location parts. Without `://` the whole string is taken as host.
    pub fn parse(href: &str) -> Self {
        match href.find("://") {
            Some(i) => {
                let rest = &href[i + 3..];
                let host_end = rest
                    .find(|c| c == '/' || c == '?' || c == '#')
                    .unwrap_or(rest.len());
                Self {
                    href: href.to_string(),
                    protocol: format!("{}:", &href[..i]),
                    host: rest[..host_end].to_string(),
                }
            }
            None => Self {
                href: format!("http://{}/", href),
                protocol: "http:".to_string(),
                host: href.to_string(),
            },
        }
    }
}

/// Environment accessor consumed by the multipart adapter.
pub trait Environment: Send + Sync {
    fn location(&self) -> &Location;

    /// Cookie string (non-HTTP-only cookies of the current document), if any.
    fn cookies(&self) -> Option<String>;

    /// Boundary token for one physical request. Must not repeat within the life of a batch.
    fn calculate_boundary(&self) -> String {
        unique_boundary()
    }
}

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Microsecond timestamp plus a process-wide sequence number, so two batches built in the
/// same tick still get distinct boundaries.
pub fn unique_boundary() -> String {
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}{:04}", Utc::now().timestamp_micros(), seq % 10_000)
}

/// Fixed location and cookies; optionally a fixed boundary (tests, non-browser hosts).
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    location: Location,
    cookies: Option<String>,
    boundary: Option<String>,
}

impl StaticEnvironment {
    pub fn new(href: &str) -> Self {
        Self {
            location: Location::parse(href),
            cookies: None,
            boundary: None,
        }
    }

    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }
}

impl Environment for StaticEnvironment {
    fn location(&self) -> &Location {
        &self.location
    }

    fn cookies(&self) -> Option<String> {
        self.cookies.clone().filter(|c| !c.is_empty())
    }

    fn calculate_boundary(&self) -> String {
        match &self.boundary {
            Some(b) => b.clone(),
            None => unique_boundary(),
        }
    }
}
