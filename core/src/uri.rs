/*
 * uri.rs
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

//! URL handling for batch parts: host/path split, relative resolution against the current
//! location, percent-encoding with the browser's `encodeURI` / `encodeURIComponent` sets,
//! and batch endpoint parsing for the transport.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::environment::Location;

/// `encodeURI` set: everything except alphanumerics, marks, and reserved URI characters.
const URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// `encodeURIComponent` set: everything except alphanumerics and marks.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode like `encodeURI` (reserved characters such as `/ ? & =` survive, `%` does not).
pub fn encode_uri(s: &str) -> String {
    utf8_percent_encode(s, URI).to_string()
}

/// Percent-encode like `encodeURIComponent`.
pub fn encode_uri_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

/// True if `s` contains a `%XX` escape (hex digits, either case).
pub fn has_percent_escape(s: &str) -> bool {
    s.as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}

/// Encode a part's request target. A query string that already carries escapes was encoded
/// by the caller and is kept verbatim (only the path is encoded); otherwise the whole target
/// is encoded once.
pub fn encode_relative_url(relative_url: &str) -> String {
    match relative_url.split_once('?') {
        Some((path, query)) if has_percent_escape(query) => {
            format!("{}?{}", encode_uri(path), query)
        }
        _ => encode_uri(relative_url),
    }
}

/// Host and request target of a logical request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlInfo {
    /// Scheme with `://` for absolute URLs, the location's protocol otherwise.
    pub protocol: String,
    pub host: String,
    pub relative_url: String,
}

/// Split a logical URL into host and relative target. `./` and `../` forms are resolved
/// against the current location first; other relative URLs keep their text and take the
/// location's host.
pub fn get_url_info(url: &str, location: &Location) -> UrlInfo {
    let resolved;
    let url = if url.contains("./") {
        resolved = resolve_url(&location.href, url);
        resolved.as_str()
    } else {
        url
    };
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            let (host, relative_url) = match rest.find('/') {
                Some(slash) => (&rest[..slash], &rest[slash..]),
                None => (rest, "/"),
            };
            UrlInfo {
                protocol: url[..i + 3].to_string(),
                host: host.to_string(),
                relative_url: relative_url.to_string(),
            }
        }
        None => UrlInfo {
            protocol: location.protocol.clone(),
            host: location.host.clone(),
            relative_url: url.to_string(),
        },
    }
}

/// Resolve `reference` against the absolute URL `base` (RFC 3986 merge + dot-segment removal).
pub fn resolve_url(base: &str, reference: &str) -> String {
    if reference.contains("://") {
        return reference.to_string();
    }
    let scheme_end = match base.find("://") {
        Some(i) => i + 3,
        None => return reference.to_string(),
    };
    let authority_end = base[scheme_end..]
        .find(|c| c == '/' || c == '?' || c == '#')
        .map(|i| scheme_end + i)
        .unwrap_or(base.len());
    let origin = &base[..authority_end];

    if let Some(rest) = reference.strip_prefix("//") {
        return format!("{}{}", &base[..scheme_end], rest);
    }

    let (ref_path, ref_tail) = split_path_tail(reference);
    let merged = if ref_path.starts_with('/') {
        ref_path.to_string()
    } else {
        let (base_path, _) = split_path_tail(&base[authority_end..]);
        let dir = match base_path.rfind('/') {
            Some(i) => &base_path[..=i],
            None => "/",
        };
        format!("{}{}", dir, ref_path)
    };
    format!("{}{}{}", origin, remove_dot_segments(&merged), ref_tail)
}

/// Split at the first `?` or `#`: (path, query-and-fragment).
fn split_path_tail(s: &str) -> (&str, &str) {
    let i = s.find(|c| c == '?' || c == '#').unwrap_or(s.len());
    s.split_at(i)
}

fn remove_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, seg) in segments.iter().enumerate() {
        match *seg {
            "." => {
                if i == last {
                    out.push("");
                }
            }
            ".." => {
                if out.len() > 1 {
                    out.pop();
                }
                if i == last {
                    out.push("");
                }
            }
            s => out.push(s),
        }
    }
    let joined = out.join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}

// ── Batch endpoint URL ────────────────────────────────────────────────

/// Where the transport connects for a batch endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Request target: path plus query, always starting with `/`.
    pub target: String,
}

impl EndpointUrl {
    /// Host header value: host, plus port when it is not the scheme default.
    pub fn authority(&self) -> String {
        if (self.secure && self.port != 443) || (!self.secure && self.port != 80) {
            format!("{}:{}", self.host, self.port)
        } else {
            self.host.clone()
        }
    }
}

/// Parse an absolute `http` or `https` URL. Returns None for other schemes or a missing host.
pub fn parse_endpoint_url(url: &str) -> Option<EndpointUrl> {
    let (scheme, rest) = url.split_once("://")?;
    let secure = if scheme.eq_ignore_ascii_case("https") {
        true
    } else if scheme.eq_ignore_ascii_case("http") {
        false
    } else {
        return None;
    };
    let authority_end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    let target = rest[authority_end..].split('#').next().unwrap_or("");
    let target = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{}", target)
    };
    let default_port = if secure { 443 } else { 80 };
    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
        let (h, after) = v6.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None => default_port,
        };
        (h.to_string(), port)
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.parse().ok()?),
            None => (authority.to_string(), default_port),
        }
    };
    if host.is_empty() {
        return None;
    }
    Some(EndpointUrl {
        secure,
        host,
        port,
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn location() -> Location {
        Location::parse("http://localhost:9876/app/index.html")
    }

    #[test]
    fn absolute_url_splits_host_and_path() {
        let info = get_url_info("http://www.gogle.com/resource?a=1", &location());
        assert_eq!(info.protocol, "http://");
        assert_eq!(info.host, "www.gogle.com");
        assert_eq!(info.relative_url, "/resource?a=1");
    }

    #[test]
    fn plain_relative_url_keeps_text_and_takes_location_host() {
        let info = get_url_info("api/some-method?params=123", &location());
        assert_eq!(info.host, "localhost:9876");
        assert_eq!(info.relative_url, "api/some-method?params=123");
    }

    #[test]
    fn dot_relative_urls_resolve_against_location() {
        let info = get_url_info("./api/products", &location());
        assert_eq!(info.host, "localhost:9876");
        assert_eq!(info.relative_url, "/app/api/products");
        let info = get_url_info("../api/products?x=1", &location());
        assert_eq!(info.relative_url, "/api/products?x=1");
    }

    #[test]
    fn resolve_url_handles_absolute_path_and_scheme_relative() {
        let base = "https://h.example/a/b/c";
        assert_eq!(resolve_url(base, "/x/./y"), "https://h.example/x/y");
        assert_eq!(resolve_url(base, "../../../z"), "https://h.example/z");
        assert_eq!(resolve_url(base, "//other/p"), "https://other/p");
    }

    #[test]
    fn raw_query_is_encoded() {
        assert_eq!(
            encode_relative_url("api/some method?params=123&some filter=1"),
            "api/some%20method?params=123&some%20filter=1"
        );
    }

    #[test]
    fn encoded_query_is_not_encoded_again() {
        assert_eq!(
            encode_relative_url("api/some-method?params=123&filter=abc%3D1"),
            "api/some-method?params=123&filter=abc%3D1"
        );
        assert_eq!(
            encode_relative_url("api/some method?params=123&filter=abc%3d1"),
            "api/some%20method?params=123&filter=abc%3d1"
        );
    }

    #[test]
    fn path_without_query_is_encoded() {
        assert_eq!(encode_relative_url("api/some-method"), "api/some-method");
        assert_eq!(encode_relative_url("api/caf\u{e9}"), "api/caf%C3%A9");
    }

    #[test]
    fn component_encoding_escapes_reserved() {
        assert_eq!(encode_uri_component("params=123&a=b c"), "params%3D123%26a%3Db%20c");
    }

    #[test]
    fn endpoint_url_parsing() {
        let e = parse_endpoint_url("https://api.example.com/batch?v=2").unwrap();
        assert!(e.secure);
        assert_eq!(e.host, "api.example.com");
        assert_eq!(e.port, 443);
        assert_eq!(e.target, "/batch?v=2");
        assert_eq!(e.authority(), "api.example.com");

        let e = parse_endpoint_url("http://127.0.0.1:8080").unwrap();
        assert_eq!(e.port, 8080);
        assert_eq!(e.target, "/");
        assert_eq!(e.authority(), "127.0.0.1:8080");

        assert!(parse_endpoint_url("ftp://x/y").is_none());
        assert!(parse_endpoint_url("/relative/batch").is_none());
    }

    proptest! {
        #[test]
        fn query_encoding_is_idempotent(path in "[a-z0-9/]{1,12}", query in "[a-z0-9 =&]{1,12}") {
            let once = encode_relative_url(&format!("{}?{}", path, query));
            let twice = encode_relative_url(&once);
            prop_assert_eq!(&twice, &once);
            let (_, encoded_query) = once.split_once('?').unwrap();
            let decoded = percent_encoding::percent_decode_str(encoded_query).decode_utf8_lossy();
            prop_assert_eq!(decoded.as_ref(), query.as_str());
        }
    }
}
