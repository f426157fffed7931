/*
 * config.rs
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

//! Batch endpoint configuration: which service URLs are batchable, where their batch
//! endpoint lives, window and size limits, and the wire adapter to use.
//!
//! Configuration files are XML and read with quick_xml.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::adapter::WireAdapter;
use crate::error::BatchError;
use crate::http::Method;

pub const DEFAULT_MAX_BATCHED_REQUESTS: usize = 10;
pub const DEFAULT_MINIMUM_BATCH_SIZE: usize = 2;
pub const DEFAULT_COLLECTION_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_ADAPTER: &str = "httpBatchAdapter";

/// Per-request batchability override: `(url, method) -> batchable`.
pub type BatchPredicate = Arc<dyn Fn(&str, &Method) -> bool + Send + Sync>;

/// Wire adapter for an endpoint: a built-in by name, or a caller-supplied implementation.
#[derive(Clone)]
pub enum AdapterSelector {
    Named(String),
    Custom(Arc<dyn WireAdapter>),
}

impl Default for AdapterSelector {
    fn default() -> Self {
        AdapterSelector::Named(DEFAULT_ADAPTER.to_string())
    }
}

impl fmt::Debug for AdapterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterSelector::Named(name) => f.debug_tuple("Named").field(name).finish(),
            AdapterSelector::Custom(a) => f.debug_tuple("Custom").field(&a.key()).finish(),
        }
    }
}

/// One batch-capable service. Immutable once registered.
#[derive(Clone)]
pub struct EndpointConfig {
    /// Prefix identifying the service; a request URL containing it is routed here.
    pub service_url: String,
    /// URL the aggregated request is sent to. Never batchable itself.
    pub batch_endpoint_url: String,
    pub max_batched_request_per_call: usize,
    pub minimum_batch_size: usize,
    pub batch_request_collection_delay: Duration,
    pub ignored_verbs: Vec<Method>,
    pub enabled: bool,
    /// Forward the environment's cookie string in each part.
    pub send_cookies: bool,
    /// Extra headers on the physical request.
    pub batch_request_headers: Vec<(String, String)>,
    /// Extra headers at the top of every multipart part.
    pub batch_part_request_headers: Vec<(String, String)>,
    /// Seed for `; name=<seed><index>` on Content-Disposition part headers.
    pub unique_request_name: Option<String>,
    pub adapter: AdapterSelector,
    pub can_batch_request: Option<BatchPredicate>,
    /// When non-empty, a URL must contain at least one of these to be batched.
    pub url_must_contain: Vec<String>,
}

impl EndpointConfig {
    pub fn new(service_url: impl Into<String>, batch_endpoint_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            batch_endpoint_url: batch_endpoint_url.into(),
            max_batched_request_per_call: DEFAULT_MAX_BATCHED_REQUESTS,
            minimum_batch_size: DEFAULT_MINIMUM_BATCH_SIZE,
            batch_request_collection_delay: DEFAULT_COLLECTION_DELAY,
            ignored_verbs: vec![Method::Head],
            enabled: true,
            send_cookies: false,
            batch_request_headers: Vec::new(),
            batch_part_request_headers: Vec::new(),
            unique_request_name: None,
            adapter: AdapterSelector::default(),
            can_batch_request: None,
            url_must_contain: Vec::new(),
        }
    }

    pub fn with_max_batched_requests(mut self, n: usize) -> Self {
        self.max_batched_request_per_call = n;
        self
    }

    pub fn with_minimum_batch_size(mut self, n: usize) -> Self {
        self.minimum_batch_size = n;
        self
    }

    pub fn with_collection_delay(mut self, delay: Duration) -> Self {
        self.batch_request_collection_delay = delay;
        self
    }

    pub fn with_ignored_verbs(mut self, verbs: Vec<Method>) -> Self {
        self.ignored_verbs = verbs;
        self
    }

    pub fn with_send_cookies(mut self, send: bool) -> Self {
        self.send_cookies = send;
        self
    }

    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.batch_request_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_part_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.batch_part_request_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_unique_request_name(mut self, seed: impl Into<String>) -> Self {
        self.unique_request_name = Some(seed.into());
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterSelector) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Method) -> bool + Send + Sync + 'static,
    {
        self.can_batch_request = Some(Arc::new(f));
        self
    }

    pub fn with_url_must_contain(mut self, fragment: impl Into<String>) -> Self {
        self.url_must_contain.push(fragment.into());
        self
    }

    /// Per-endpoint part of the batchability rule (the endpoint has already been matched).
    pub fn accepts(&self, url: &str, method: &Method) -> bool {
        if !self.enabled || url == self.batch_endpoint_url {
            return false;
        }
        if self.ignored_verbs.iter().any(|v| v == method) {
            return false;
        }
        if let Some(pred) = &self.can_batch_request {
            if !pred(url, method) {
                return false;
            }
        }
        self.url_must_contain.is_empty()
            || self.url_must_contain.iter().any(|frag| url.contains(frag.as_str()))
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("service_url", &self.service_url)
            .field("batch_endpoint_url", &self.batch_endpoint_url)
            .field("max_batched_request_per_call", &self.max_batched_request_per_call)
            .field("minimum_batch_size", &self.minimum_batch_size)
            .field("batch_request_collection_delay", &self.batch_request_collection_delay)
            .field("ignored_verbs", &self.ignored_verbs)
            .field("enabled", &self.enabled)
            .field("send_cookies", &self.send_cookies)
            .field("batch_request_headers", &self.batch_request_headers)
            .field("batch_part_request_headers", &self.batch_part_request_headers)
            .field("unique_request_name", &self.unique_request_name)
            .field("adapter", &self.adapter)
            .field("can_batch_request", &self.can_batch_request.is_some())
            .field("url_must_contain", &self.url_must_contain)
            .finish()
    }
}

/// Registered endpoints in registration order.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    endpoints: Vec<EndpointConfig>,
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_allowed_batch_endpoint(&mut self, endpoint: EndpointConfig) -> &mut Self {
        self.endpoints.push(endpoint);
        self
    }

    /// First registered endpoint whose service URL occurs in `url`.
    pub fn get_batch_config(&self, url: &str) -> Option<&EndpointConfig> {
        self.endpoint_index(url).map(|i| &self.endpoints[i])
    }

    pub(crate) fn endpoint_index(&self, url: &str) -> Option<usize> {
        self.endpoints
            .iter()
            .position(|e| url.contains(e.service_url.as_str()))
    }

    pub fn can_batch_call(&self, url: &str, method: &Method) -> bool {
        self.get_batch_config(url)
            .map(|e| e.accepts(url, method))
            .unwrap_or(false)
    }

    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    /// Parse `<batch-config>` XML. See `load_config`.
    pub fn from_xml(content: &str) -> Result<Self, BatchError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut config = BatchConfig::new();
        let mut current: Option<EndpointConfig> = None;
        // Element whose text we are waiting for, with its `name` attribute for header elements.
        let mut element: Option<(String, Option<String>)> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => return Err(BatchError::Config(format!("XML parse error: {}", e))),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if name == "endpoint" {
                        current = Some(endpoint_from_attributes(&e)?);
                    } else if current.is_some() {
                        element = Some((name, attribute(&e, "name")?));
                    }
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if name == "endpoint" {
                        config.set_allowed_batch_endpoint(endpoint_from_attributes(&e)?);
                    } else if let Some(endpoint) = current.as_mut() {
                        let header_name = attribute(&e, "name")?;
                        apply_element(endpoint, &name, header_name, String::new())?;
                    }
                }
                Ok(Event::Text(e)) => {
                    if let (Some(endpoint), Some((name, header_name))) =
                        (current.as_mut(), element.take())
                    {
                        let text = e
                            .unescape()
                            .map_err(|e| BatchError::Config(e.to_string()))?
                            .trim()
                            .to_string();
                        apply_element(endpoint, &name, header_name, text)?;
                    }
                }
                Ok(Event::End(e)) => {
                    if e.name().as_ref() == b"endpoint" {
                        if let Some(endpoint) = current.take() {
                            config.set_allowed_batch_endpoint(endpoint);
                        }
                    } else if let (Some(endpoint), Some((name, header_name))) =
                        (current.as_mut(), element.take())
                    {
                        // <request-header name="X"></request-header>
                        apply_element(endpoint, &name, header_name, String::new())?;
                    }
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(config)
    }
}

/// Read a batch configuration file.
pub fn load_config(path: &Path) -> Result<BatchConfig, BatchError> {
    let content = fs::read_to_string(path)
        .map_err(|e| BatchError::Config(format!("{}: {}", path.display(), e)))?;
    BatchConfig::from_xml(&content)
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, BatchError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| BatchError::Config(e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| BatchError::Config(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn endpoint_from_attributes(e: &BytesStart<'_>) -> Result<EndpointConfig, BatchError> {
    let service_url = attribute(e, "service-url")?
        .ok_or_else(|| BatchError::Config("endpoint without service-url".to_string()))?;
    let batch_endpoint_url = attribute(e, "batch-endpoint-url")?
        .ok_or_else(|| BatchError::Config("endpoint without batch-endpoint-url".to_string()))?;
    Ok(EndpointConfig::new(service_url, batch_endpoint_url))
}

fn apply_element(
    endpoint: &mut EndpointConfig,
    element: &str,
    header_name: Option<String>,
    text: String,
) -> Result<(), BatchError> {
    match element {
        "max-batched-requests" => endpoint.max_batched_request_per_call = parse_number(element, &text)?,
        "minimum-batch-size" => endpoint.minimum_batch_size = parse_number(element, &text)?,
        "collection-delay-ms" => {
            endpoint.batch_request_collection_delay =
                Duration::from_millis(parse_number(element, &text)? as u64)
        }
        "ignored-verbs" => {
            endpoint.ignored_verbs = text
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(Method::parse)
                .collect()
        }
        "enabled" => endpoint.enabled = parse_bool(element, &text)?,
        "send-cookies" => endpoint.send_cookies = parse_bool(element, &text)?,
        "unique-request-name" => {
            endpoint.unique_request_name = if text.is_empty() { None } else { Some(text) }
        }
        "adapter" => endpoint.adapter = AdapterSelector::Named(text),
        "url-must-contain" => endpoint.url_must_contain.push(text),
        "request-header" | "part-header" => {
            let name = header_name
                .ok_or_else(|| BatchError::Config(format!("<{}> without name", element)))?;
            if element == "request-header" {
                endpoint.batch_request_headers.push((name, text));
            } else {
                endpoint.batch_part_request_headers.push((name, text));
            }
        }
        other => tracing::debug!(element = other, "ignoring unknown endpoint element"),
    }
    Ok(())
}

fn parse_number(element: &str, text: &str) -> Result<usize, BatchError> {
    text.parse()
        .map_err(|_| BatchError::Config(format!("<{}>: not a number: {:?}", element, text)))
}

fn parse_bool(element: &str, text: &str) -> Result<bool, BatchError> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(BatchError::Config(format!("<{}>: not a boolean: {:?}", element, text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatchConfig {
        let mut c = BatchConfig::new();
        c.set_allowed_batch_endpoint(EndpointConfig::new(
            "http://api.myapp.com",
            "http://api.myapp.com/batch",
        ));
        c.set_allowed_batch_endpoint(EndpointConfig::new(
            "http://api.myapp.com/v2",
            "http://api.myapp.com/v2/batch",
        ));
        c
    }

    #[test]
    fn defaults() {
        let e = EndpointConfig::new("s", "b");
        assert_eq!(e.max_batched_request_per_call, 10);
        assert_eq!(e.minimum_batch_size, 2);
        assert_eq!(e.batch_request_collection_delay, Duration::from_millis(100));
        assert_eq!(e.ignored_verbs, vec![Method::Head]);
        assert!(e.enabled);
        assert!(!e.send_cookies);
        assert!(matches!(e.adapter, AdapterSelector::Named(ref n) if n == "httpBatchAdapter"));
    }

    #[test]
    fn first_registered_match_wins() {
        let c = config();
        let e = c.get_batch_config("http://api.myapp.com/v2/resource").unwrap();
        assert_eq!(e.batch_endpoint_url, "http://api.myapp.com/batch");
        assert!(c.get_batch_config("http://other.com/resource").is_none());
    }

    #[test]
    fn batch_endpoint_is_never_batchable() {
        let c = config();
        assert!(c.can_batch_call("http://api.myapp.com/resource", &Method::Get));
        assert!(!c.can_batch_call("http://api.myapp.com/batch", &Method::Post));
    }

    #[test]
    fn ignored_verbs_and_disabled() {
        let mut c = config();
        assert!(!c.can_batch_call("http://api.myapp.com/resource", &Method::Head));
        c.endpoints[0].enabled = false;
        assert!(!c.can_batch_call("http://api.myapp.com/resource", &Method::Get));
    }

    #[test]
    fn predicate_and_url_filter() {
        let mut c = BatchConfig::new();
        c.set_allowed_batch_endpoint(
            EndpointConfig::new("http://h", "http://h/batch")
                .with_predicate(|url, _| !url.ends_with(".html"))
                .with_url_must_contain("/api/")
                .with_url_must_contain("/data/"),
        );
        assert!(c.can_batch_call("http://h/api/items", &Method::Get));
        assert!(c.can_batch_call("http://h/data/x", &Method::Get));
        assert!(!c.can_batch_call("http://h/other/x", &Method::Get));
        assert!(!c.can_batch_call("http://h/api/page.html", &Method::Get));
    }

    #[test]
    fn xml_config() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<batch-config>
  <endpoint service-url="https://api.example.com/" batch-endpoint-url="https://api.example.com/batch">
    <max-batched-requests>5</max-batched-requests>
    <minimum-batch-size>1</minimum-batch-size>
    <collection-delay-ms>250</collection-delay-ms>
    <ignored-verbs>HEAD, options</ignored-verbs>
    <send-cookies>true</send-cookies>
    <unique-request-name>req</unique-request-name>
    <adapter>nodeJsMultiFetchAdapter</adapter>
    <url-must-contain>/api/</url-must-contain>
    <request-header name="X-Client">web &amp; mobile</request-header>
    <part-header name="Content-Disposition">form-data</part-header>
  </endpoint>
  <endpoint service-url="http://b" batch-endpoint-url="http://b/batch"/>
</batch-config>"#;
        let c = BatchConfig::from_xml(xml).unwrap();
        assert_eq!(c.endpoints().len(), 2);
        let e = &c.endpoints()[0];
        assert_eq!(e.max_batched_request_per_call, 5);
        assert_eq!(e.minimum_batch_size, 1);
        assert_eq!(e.batch_request_collection_delay, Duration::from_millis(250));
        assert_eq!(e.ignored_verbs, vec![Method::Head, Method::Options]);
        assert!(e.send_cookies);
        assert_eq!(e.unique_request_name.as_deref(), Some("req"));
        assert!(matches!(e.adapter, AdapterSelector::Named(ref n) if n == "nodeJsMultiFetchAdapter"));
        assert_eq!(e.url_must_contain, vec!["/api/".to_string()]);
        assert_eq!(
            e.batch_request_headers,
            vec![("X-Client".to_string(), "web & mobile".to_string())]
        );
        assert_eq!(
            e.batch_part_request_headers,
            vec![("Content-Disposition".to_string(), "form-data".to_string())]
        );
        assert_eq!(c.endpoints()[1].batch_endpoint_url, "http://b/batch");
    }

    #[test]
    fn xml_errors() {
        assert!(matches!(
            BatchConfig::from_xml(r#"<batch-config><endpoint service-url="x"/></batch-config>"#),
            Err(BatchError::Config(_))
        ));
        let bad_number = r#"<batch-config><endpoint service-url="a" batch-endpoint-url="b">
            <minimum-batch-size>two</minimum-batch-size></endpoint></batch-config>"#;
        assert!(matches!(BatchConfig::from_xml(bad_number), Err(BatchError::Config(_))));
    }
}
