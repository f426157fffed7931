/*
 * content_type.rs
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

//! Content-Type header (RFC 2045).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    primary_type: String,
    sub_type: String,
    /// Names lower-cased, in header order.
    parameters: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(primary_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            primary_type: primary_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    pub fn primary_type(&self) -> &str {
        &self.primary_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    pub fn is_mime_type(&self, primary: &str, sub: &str) -> bool {
        self.primary_type.eq_ignore_ascii_case(primary) && self.sub_type.eq_ignore_ascii_case(sub)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.parameters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// RFC 2045 token characters.
pub fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b > 0x20 && b < 0x7f && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

/// Parse a Content-Type header value. None if there is no valid `type/subtype`.
pub fn parse_content_type(value: &str) -> Option<ContentType> {
    let value = value.trim();
    let (type_part, params_part) = match value.split_once(';') {
        Some((a, b)) => (a.trim(), b),
        None => (value, ""),
    };
    let (primary, sub) = type_part.split_once('/')?;
    let (primary, sub) = (primary.trim(), sub.trim());
    if !is_token(primary) || !is_token(sub) {
        return None;
    }
    let mut ct = ContentType::new(primary, sub);
    ct.parameters = parse_parameter_list(params_part);
    Some(ct)
}

/// Parse a semicolon-separated parameter list (`name=value; name="value"`). Malformed entries are skipped.
pub fn parse_parameter_list(params_part: &str) -> Vec<(String, String)> {
    let mut parameters = Vec::new();
    let bytes = params_part.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        while pos < len && (bytes[pos] == b';' || bytes[pos].is_ascii_whitespace()) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        let eq = match bytes[pos..].iter().position(|&b| b == b'=' || b == b';') {
            Some(i) if bytes[pos + i] == b'=' => pos + i,
            Some(i) => {
                pos += i + 1;
                continue;
            }
            None => break,
        };
        let name = params_part[pos..eq].trim().to_ascii_lowercase();
        pos = eq + 1;
        let value = if pos < len && bytes[pos] == b'"' {
            pos += 1;
            let mut v = Vec::new();
            while pos < len {
                match bytes[pos] {
                    b'\\' if pos + 1 < len => {
                        v.push(bytes[pos + 1]);
                        pos += 2;
                    }
                    b'"' => {
                        pos += 1;
                        break;
                    }
                    c => {
                        v.push(c);
                        pos += 1;
                    }
                }
            }
            String::from_utf8_lossy(&v).into_owned()
        } else {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b';')
                .map(|i| pos + i)
                .unwrap_or(len);
            let v = params_part[pos..end].trim().to_string();
            pos = end;
            v
        };
        if is_token(&name) {
            parameters.push((name, value));
        }
    }
    parameters
}

/// True if a body of this content type is JSON (the type mentions "json" anywhere).
pub fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_parameters() {
        let ct = parse_content_type("multipart/mixed; boundary=\"b 1\"; charset=UTF-8").unwrap();
        assert!(ct.is_mime_type("Multipart", "MIXED"));
        assert_eq!(ct.parameter("boundary"), Some("b 1"));
        assert_eq!(ct.parameter("Charset"), Some("UTF-8"));
        assert_eq!(ct.parameter("missing"), None);
    }

    #[test]
    fn part_marker() {
        let ct = parse_content_type("application/http; msgtype=response").unwrap();
        assert!(ct.is_mime_type("application", "http"));
        assert_eq!(ct.parameter("msgtype"), Some("response"));
    }

    #[test]
    fn invalid_types() {
        assert!(parse_content_type("").is_none());
        assert!(parse_content_type("text").is_none());
        assert!(parse_content_type("te xt/plain").is_none());
    }

    #[test]
    fn json_detection() {
        assert!(is_json("application/json; charset=utf-8"));
        assert!(is_json("application/vnd.api+JSON"));
        assert!(!is_json("text/plain"));
    }
}
