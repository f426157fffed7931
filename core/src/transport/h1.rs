/*
 * h1.rs
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

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length, chunked, or
//! until close).

use std::io;

use bytes::{Buf, BytesMut};

use crate::http::HttpResponse;

/// Receives response events as the parser completes tokens.
pub trait H1ResponseHandler {
    fn status(&mut self, code: u16, reason: Option<&str>);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: &[u8]);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    StatusLine,
    Headers,
    Body,
    /// Body delimited by connection close.
    BodyUntilClose,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
    Done,
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Push parser for one HTTP/1.1 response. Feed bytes via `receive`; call `eof` when the peer
/// closes the connection.
pub struct ResponseParser {
    state: ParseState,
    /// Whether a body may follow the headers (false for responses to HEAD).
    expect_body: bool,
    status: u16,
    content_length: Option<u64>,
    chunked: bool,
    remaining: u64,
}

impl ResponseParser {
    pub fn new(expect_body: bool) -> Self {
        Self {
            state: ParseState::StatusLine,
            expect_body,
            status: 0,
            content_length: None,
            chunked: false,
            remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParseState::Done
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    /// Take one CRLF-terminated line off the front of `buf`, without the CRLF.
    fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
        let end = Self::find_crlf(buf)?;
        let line = buf.split_to(end);
        buf.advance(2);
        Some(line)
    }

    /// Consume as much of `buf` as forms complete tokens. Partial data stays in `buf`.
    pub fn receive<H: H1ResponseHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> io::Result<()> {
        loop {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line) = Self::take_line(buf) else { return Ok(()) };
                    let line = std::str::from_utf8(&line).map_err(|_| invalid("invalid status line UTF-8"))?;
                    let mut parts = line.splitn(3, ' ');
                    let version = parts.next().unwrap_or("");
                    if !version.starts_with("HTTP/") {
                        return Err(invalid("invalid status line"));
                    }
                    let code = parts
                        .next()
                        .and_then(|s| s.parse::<u16>().ok())
                        .ok_or_else(|| invalid("invalid status code"))?;
                    let reason = parts.next().map(str::trim).filter(|s| !s.is_empty());
                    // 1xx interim responses are skipped entirely.
                    self.status = code;
                    if !(100..200).contains(&code) {
                        handler.status(code, reason);
                    }
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = Self::take_line(buf) else { return Ok(()) };
                    if line.is_empty() {
                        if (100..200).contains(&self.status) {
                            self.state = ParseState::StatusLine;
                            continue;
                        }
                        self.start_body(handler);
                        continue;
                    }
                    if (100..200).contains(&self.status) {
                        continue;
                    }
                    let line = std::str::from_utf8(&line).map_err(|_| invalid("invalid header UTF-8"))?;
                    if let Some((name, value)) = line.split_once(':') {
                        let (name, value) = (name.trim(), value.trim());
                        if name.eq_ignore_ascii_case("content-length") {
                            self.content_length =
                                Some(value.parse().map_err(|_| invalid("invalid Content-Length"))?);
                        } else if name.eq_ignore_ascii_case("transfer-encoding")
                            && value.to_ascii_lowercase().contains("chunked")
                        {
                            self.chunked = true;
                        }
                        handler.header(name, value);
                    }
                }
                ParseState::Body => {
                    let n = (self.remaining as usize).min(buf.len());
                    if n > 0 {
                        let chunk = buf.split_to(n);
                        handler.body_chunk(&chunk);
                        self.remaining -= n as u64;
                    }
                    if self.remaining == 0 {
                        self.finish(handler);
                    } else {
                        return Ok(());
                    }
                }
                ParseState::BodyUntilClose => {
                    if !buf.is_empty() {
                        let chunk = buf.split_to(buf.len());
                        handler.body_chunk(&chunk);
                    }
                    return Ok(());
                }
                ParseState::ChunkSize => {
                    let Some(line) = Self::take_line(buf) else { return Ok(()) };
                    let line = std::str::from_utf8(&line).map_err(|_| invalid("invalid chunk size"))?;
                    let hex = line.split(';').next().unwrap_or(line).trim();
                    self.remaining = u64::from_str_radix(hex, 16).map_err(|_| invalid("invalid chunk size"))?;
                    self.state = if self.remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let n = (self.remaining as usize).min(buf.len());
                    if n > 0 {
                        let chunk = buf.split_to(n);
                        handler.body_chunk(&chunk);
                        self.remaining -= n as u64;
                    }
                    if self.remaining > 0 || buf.len() < 2 {
                        return Ok(());
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let Some(line) = Self::take_line(buf) else { return Ok(()) };
                    if line.is_empty() {
                        self.finish(handler);
                    }
                }
                ParseState::Done => return Ok(()),
            }
        }
    }

    fn start_body<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        let no_body = !self.expect_body || self.status == 204 || self.status == 304;
        if no_body {
            self.finish(handler);
        } else if self.chunked {
            self.state = ParseState::ChunkSize;
        } else if let Some(len) = self.content_length {
            self.remaining = len;
            self.state = ParseState::Body;
        } else {
            self.state = ParseState::BodyUntilClose;
        }
    }

    fn finish<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        self.state = ParseState::Done;
        handler.complete();
    }

    /// Peer closed the connection. Completes a close-delimited body; anything else is truncated.
    pub fn eof<H: H1ResponseHandler>(&mut self, handler: &mut H) -> io::Result<()> {
        match self.state {
            ParseState::BodyUntilClose => {
                self.finish(handler);
                Ok(())
            }
            ParseState::Done => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before response was complete",
            )),
        }
    }
}

/// Collects parser events into an [`HttpResponse`].
#[derive(Debug, Default)]
pub struct ResponseCollector {
    response: Option<HttpResponse>,
    complete: bool,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn into_response(self) -> Option<HttpResponse> {
        self.response
    }
}

impl H1ResponseHandler for ResponseCollector {
    fn status(&mut self, code: u16, reason: Option<&str>) {
        self.response = Some(match reason {
            Some(r) => HttpResponse::with_reason(code, r),
            None => HttpResponse::new(code),
        });
    }

    fn header(&mut self, name: &str, value: &str) {
        if let Some(r) = self.response.as_mut() {
            r.headers.push((name.to_string(), value.to_string()));
        }
    }

    fn body_chunk(&mut self, data: &[u8]) {
        if let Some(r) = self.response.as_mut() {
            r.body.extend_from_slice(data);
        }
    }

    fn complete(&mut self) {
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(chunks: &[&[u8]], close: bool) -> io::Result<HttpResponse> {
        let mut parser = ResponseParser::new(true);
        let mut collector = ResponseCollector::new();
        let mut buf = BytesMut::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            parser.receive(&mut buf, &mut collector)?;
        }
        if close {
            parser.eof(&mut collector)?;
        }
        assert!(collector.is_complete());
        Ok(collector.into_response().unwrap())
    }

    #[test]
    fn content_length_split_across_reads() {
        let r = parse(
            &[b"HTTP/1.1 200 OK\r\nContent-Ty", b"pe: text/plain\r\nContent-Length: 5\r\n\r\nhe", b"llo"],
            false,
        )
        .unwrap();
        assert_eq!(r.code, 200);
        assert_eq!(r.reason.as_deref(), Some("OK"));
        assert_eq!(r.get_header("content-type"), Some("text/plain"));
        assert_eq!(r.body, b"hello");
    }

    #[test]
    fn chunked_body() {
        let r = parse(
            &[b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2;x=y\r\nde\r\n0\r\n\r\n"],
            false,
        )
        .unwrap();
        assert_eq!(r.body, b"abcde");
    }

    #[test]
    fn body_until_close() {
        let r = parse(&[b"HTTP/1.0 500 Internal Server Error\r\n\r\noops"], true).unwrap();
        assert_eq!(r.code, 500);
        assert_eq!(r.reason.as_deref(), Some("Internal Server Error"));
        assert_eq!(r.body, b"oops");
    }

    #[test]
    fn interim_response_is_skipped() {
        let r = parse(
            &[b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\nX-A: 1\r\n\r\n"],
            false,
        )
        .unwrap();
        assert_eq!(r.code, 204);
        assert!(r.body.is_empty());
        assert_eq!(r.get_header("x-a"), Some("1"));
    }

    #[test]
    fn truncated_response_is_error() {
        let mut parser = ResponseParser::new(true);
        let mut collector = ResponseCollector::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]);
        parser.receive(&mut buf, &mut collector).unwrap();
        assert_eq!(parser.state(), ParseState::Body);
        assert!(parser.eof(&mut collector).is_err());
    }

    #[test]
    fn garbage_status_line_is_error() {
        let mut parser = ResponseParser::new(true);
        let mut collector = ResponseCollector::new();
        let mut buf = BytesMut::from(&b"SMTP ready\r\n"[..]);
        assert!(parser.receive(&mut buf, &mut collector).is_err());
    }
}
