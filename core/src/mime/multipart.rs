/*
 * multipart.rs
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

//! `multipart/mixed` batch framing: one `application/http` part per request on the way out,
//! one per response on the way back. CRLF line endings throughout.

use crate::config::EndpointConfig;
use crate::environment::Environment;
use crate::error::BatchError;
use crate::http::find_header;
use crate::request::{LogicalRequest, ResponseBody};
use crate::uri::{encode_relative_url, get_url_info};

use super::content_type::{is_json, parse_content_type};

pub const CRLF: &str = "\r\n";
pub const HTTP_VERSION: &str = "HTTP/1.1";
pub const REQUEST_PART_CONTENT_TYPE: &str = "application/http; msgtype=request";
const JSON_VULNERABILITY_PREFIX: &str = ")]}',";

// ── Encoding ──────────────────────────────────────────────────────────

/// Build the multipart body for `requests`, in order, delimited by `boundary`.
pub fn encode_batch(
    requests: &[LogicalRequest],
    config: &EndpointConfig,
    env: &dyn Environment,
    boundary: &str,
) -> String {
    let cookies = if config.send_cookies { env.cookies() } else { None };
    let location = env.location();
    let mut lines: Vec<String> = Vec::new();

    for (i, request) in requests.iter().enumerate() {
        let info = get_url_info(&request.url, location);
        lines.push(format!("--{}", boundary));
        for (name, value) in &config.batch_part_request_headers {
            let mut header = format!("{}: {}", name, value);
            if let Some(seed) = &config.unique_request_name {
                if name.eq_ignore_ascii_case("content-disposition") {
                    header.push_str(&format!("; name={}{}", seed, i));
                }
            }
            lines.push(header);
        }
        lines.push(format!("Content-Type: {}", REQUEST_PART_CONTENT_TYPE));
        lines.push(String::new());
        lines.push(format!(
            "{} {} {}",
            request.method,
            encode_relative_url(&info.relative_url),
            HTTP_VERSION
        ));
        lines.push(format!("Host: {}", info.host));
        for (name, value) in &request.headers {
            lines.push(format!("{}: {}", name, value));
        }
        if let Some(cookies) = &cookies {
            lines.push(format!("Cookie: {}", cookies));
        }
        lines.push(String::new());
        if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
            lines.push(body.to_string());
        }
        lines.push(String::new());
    }

    lines.push(format!("--{}--", boundary));
    lines.join(CRLF)
}

// ── Decoding ──────────────────────────────────────────────────────────

/// Boundary from a response Content-Type value: text after `boundary=` up to the next `;`,
/// quotes removed.
pub fn find_response_boundary(content_type: &str) -> Option<String> {
    const KEY: &str = "boundary=";
    let start = content_type.to_ascii_lowercase().find(KEY)? + KEY.len();
    let rest = &content_type[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    let boundary: String = rest[..end].trim().chars().filter(|&c| c != '"').collect();
    if boundary.is_empty() {
        None
    } else {
        Some(boundary)
    }
}

/// One decoded response part.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePart {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

/// Split a multipart batch response into its parts, in order. Text before the first
/// delimiter is preamble and is skipped.
pub fn decode_batch(boundary: &str, body: &str) -> Result<Vec<ResponsePart>, BatchError> {
    let delimiter = format!("--{}{}", boundary, CRLF);
    let closing = format!("--{}--", boundary);
    let mut parts = Vec::new();

    for (i, fragment) in body.split(delimiter.as_str()).enumerate() {
        let trimmed = fragment.trim();
        if i == 0 {
            if !trimmed.is_empty() {
                tracing::trace!(len = fragment.len(), "skipping multipart preamble");
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(&closing) {
            continue;
        }
        let mut parser = PartParser::new(&closing);
        for line in fragment.split(CRLF) {
            parser.process_line(line)?;
        }
        parts.push(parser.finish()?);
    }
    Ok(parts)
}

/// Convert a part body by its declared content type: JSON (prefix stripped) or text.
pub fn convert_body(content_type: Option<&str>, text: &str) -> Result<ResponseBody, BatchError> {
    if text.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    match content_type {
        Some(ct) if is_json(ct) => {
            let json = strip_json_prefix(text);
            Ok(ResponseBody::Json(serde_json::from_str(json)?))
        }
        _ => Ok(ResponseBody::Text(text.to_string())),
    }
}

fn strip_json_prefix(text: &str) -> &str {
    match text.strip_prefix(JSON_VULNERABILITY_PREFIX) {
        Some(rest) => rest
            .strip_prefix(CRLF)
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest),
        None => text,
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PartState {
    /// MIME headers of the part (the `application/http` marker) up to the first blank line.
    PartHeaders,
    StatusLine,
    Headers,
    Body,
    /// Closing delimiter seen; the rest of the fragment is epilogue.
    Closed,
}

/// Line-at-a-time parser for one `application/http` response part.
struct PartParser<'a> {
    closing: &'a str,
    state: PartState,
    status: Option<(u16, String)>,
    headers: Vec<(String, String)>,
    body_lines: Vec<&'a str>,
}

impl<'a> PartParser<'a> {
    fn new(closing: &'a str) -> Self {
        Self {
            closing,
            state: PartState::PartHeaders,
            status: None,
            headers: Vec::new(),
            body_lines: Vec::new(),
        }
    }

    fn is_closing(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(self.closing)
    }

    fn process_line(&mut self, line: &'a str) -> Result<(), BatchError> {
        match self.state {
            PartState::PartHeaders => {
                if line.is_empty() {
                    self.state = PartState::StatusLine;
                } else if line.starts_with("HTTP/") {
                    // Part without MIME headers.
                    self.status = Some(parse_status_line(line)?);
                    self.state = PartState::Headers;
                } else if let Some((name, value)) = line.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("content-type") {
                        let is_http = parse_content_type(value)
                            .map(|ct| ct.is_mime_type("application", "http"))
                            .unwrap_or(false);
                        if !is_http {
                            tracing::warn!(content_type = value.trim(), "unexpected batch part content type");
                        }
                    }
                }
            }
            PartState::StatusLine => {
                if self.is_closing(line) {
                    self.state = PartState::Closed;
                } else if !line.is_empty() {
                    self.status = Some(parse_status_line(line)?);
                    self.state = PartState::Headers;
                }
            }
            PartState::Headers => {
                if line.is_empty() {
                    self.state = PartState::Body;
                } else if self.is_closing(line) {
                    self.state = PartState::Closed;
                } else if let Some((name, value)) = line.split_once(':') {
                    self.headers
                        .push((name.trim().to_string(), value.trim().to_string()));
                }
            }
            PartState::Body => {
                if self.is_closing(line) {
                    self.state = PartState::Closed;
                } else {
                    self.body_lines.push(line);
                }
            }
            PartState::Closed => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ResponsePart, BatchError> {
        let (status, status_text) = self
            .status
            .take()
            .ok_or_else(|| BatchError::Protocol("batch part without status line".to_string()))?;
        while self.body_lines.last() == Some(&"") {
            self.body_lines.pop();
        }
        let text = self.body_lines.join(CRLF);
        let body = convert_body(find_header(&self.headers, "Content-Type"), &text)?;
        Ok(ResponsePart {
            status,
            status_text,
            headers: self.headers,
            body,
        })
    }
}

/// `HTTP/1.1 <code> <reason text>`: reason is everything after the code.
fn parse_status_line(line: &str) -> Result<(u16, String), BatchError> {
    let invalid = || BatchError::Protocol(format!("invalid status line: {:?}", line));
    let rest = line.strip_prefix("HTTP/").ok_or_else(invalid)?;
    let (_version, rest) = rest.split_once(' ').ok_or_else(invalid)?;
    let (code, reason) = match rest.split_once(' ') {
        Some((code, reason)) => (code, reason),
        None => (rest, ""),
    };
    let code = code.trim().parse::<u16>().map_err(|_| invalid())?;
    Ok((code, reason.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;
    use serde_json::json;

    fn endpoint() -> EndpointConfig {
        EndpointConfig::new("http://host", "http://host/batch").with_minimum_batch_size(1)
    }

    fn env() -> StaticEnvironment {
        StaticEnvironment::new("http://localhost:9876/")
    }

    #[test]
    fn single_get_framing() {
        let body = encode_batch(&[LogicalRequest::get("http://host/resource")], &endpoint(), &env(), "B");
        assert_eq!(
            body,
            "--B\r\nContent-Type: application/http; msgtype=request\r\n\r\nGET /resource HTTP/1.1\r\nHost: host\r\n\r\n\r\n--B--"
        );
    }

    #[test]
    fn headers_body_cookies_and_part_names() {
        let config = endpoint()
            .with_send_cookies(true)
            .with_part_header("Content-Disposition", "form-data")
            .with_unique_request_name("req");
        let env = env().with_cookies("session=abc");
        let requests = vec![
            LogicalRequest::post("api/items", "{\"a\":1}").with_header("Accept", "application/json"),
            LogicalRequest::get("api/some method?x=1"),
        ];
        let body = encode_batch(&requests, &config, &env, "B");
        let expected = [
            "--B",
            "Content-Disposition: form-data; name=req0",
            "Content-Type: application/http; msgtype=request",
            "",
            "POST api/items HTTP/1.1",
            "Host: localhost:9876",
            "Accept: application/json",
            "Cookie: session=abc",
            "",
            "{\"a\":1}",
            "",
            "--B",
            "Content-Disposition: form-data; name=req1",
            "Content-Type: application/http; msgtype=request",
            "",
            "GET api/some%20method?x=1 HTTP/1.1",
            "Host: localhost:9876",
            "Cookie: session=abc",
            "",
            "",
            "--B--",
        ]
        .join("\r\n");
        assert_eq!(body, expected);
    }

    #[test]
    fn cookies_only_when_enabled() {
        let env = env().with_cookies("session=abc");
        let body = encode_batch(&[LogicalRequest::get("http://host/r")], &endpoint(), &env, "B");
        assert!(!body.contains("Cookie:"));
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(find_response_boundary("multipart/mixed; boundary=abc").as_deref(), Some("abc"));
        assert_eq!(
            find_response_boundary("multipart/mixed; boundary=\"boundary123\"; charset=UTF-8").as_deref(),
            Some("boundary123")
        );
        assert_eq!(find_response_boundary("Multipart/Mixed; Boundary=X").as_deref(), Some("X"));
        assert_eq!(find_response_boundary("application/json"), None);
        assert_eq!(find_response_boundary("multipart/mixed; boundary="), None);
    }

    #[test]
    fn decode_json_part() {
        let body = "--B\r\nContent-Type: application/http; msgtype=response\r\n\r\n\
                    HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\n\r\n\
                    [{\"Id\":1}]\r\n--B--\r\n";
        let parts = decode_batch("B", body).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].status, 200);
        assert_eq!(parts[0].status_text, "OK");
        assert_eq!(parts[0].body, ResponseBody::Json(json!([{"Id": 1}])));
        assert_eq!(
            parts[0].headers,
            vec![("Content-Type".to_string(), "application/json; charset=utf-8".to_string())]
        );
    }

    #[test]
    fn decode_two_parts_in_order() {
        let body = "--B\r\nContent-Type: application/http; msgtype=response\r\n\r\n\
                    HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nfirst\r\n\
                    --B\r\nContent-Type: application/http; msgtype=response\r\n\r\n\
                    HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\r\nsecond\r\n--B--";
        let parts = decode_batch("B", body).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, ResponseBody::Text("first".to_string()));
        assert_eq!(parts[1].status, 404);
        assert_eq!(parts[1].status_text, "Not Found");
        assert_eq!(parts[1].body, ResponseBody::Text("second".to_string()));
    }

    #[test]
    fn body_containing_dashes_is_not_truncated() {
        let body = "--B\r\nContent-Type: application/http; msgtype=response\r\n\r\n\
                    HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n\
                    line one -- still going\r\n--not the boundary\r\n--B-x\r\nend\r\n--B--\r\n";
        let parts = decode_batch("B", body).unwrap();
        assert_eq!(
            parts[0].body,
            ResponseBody::Text("line one -- still going\r\n--not the boundary\r\n--B-x\r\nend".to_string())
        );
    }

    #[test]
    fn json_prefix_is_stripped() {
        assert_eq!(
            convert_body(Some("application/json"), ")]}',\n{\"a\":1}").unwrap(),
            ResponseBody::Json(json!({"a": 1}))
        );
        assert_eq!(convert_body(Some("application/json"), "").unwrap(), ResponseBody::Empty);
        assert!(matches!(
            convert_body(Some("application/json"), "not json"),
            Err(BatchError::Json(_))
        ));
    }

    #[test]
    fn part_without_status_line_is_protocol_error() {
        let body = "--B\r\nContent-Type: application/http; msgtype=response\r\n\r\n--B--";
        assert!(matches!(decode_batch("B", body), Err(BatchError::Protocol(_))));
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status_line("HTTP/1.1 204 No Content").unwrap(), (204, "No Content".to_string()));
        assert_eq!(parse_status_line("HTTP/1.1 200").unwrap(), (200, String::new()));
        assert!(parse_status_line("garbage").is_err());
    }
}
