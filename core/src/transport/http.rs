/*
 * http.rs
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

//! Default transport: one HTTP/1.1 exchange per batch over a fresh TCP or TLS connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

use super::h1::{ResponseCollector, ResponseParser};
use super::{tls, Transport, TransportFailure, TransportFuture};
use crate::http::{HttpRequest, HttpResponse, Method};
use crate::uri::{parse_endpoint_url, EndpointUrl};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Plain TCP or TLS.
enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// HTTP/1.1 client transport. Non-2xx responses are returned as `Ok`; connection and
/// protocol errors become a [`TransportFailure`] with status 0.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, t: Duration) -> Self {
        self.connect_timeout = t;
        self
    }

    pub fn with_response_timeout(mut self, t: Duration) -> Self {
        self.response_timeout = t;
        self
    }

    async fn connect(&self, endpoint: &EndpointUrl) -> io::Result<HttpStream> {
        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        let tcp = timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TCP connect timed out"))??;
        if endpoint.secure {
            let tls = timeout(self.connect_timeout, tls::connect(&endpoint.host, tcp))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))??;
            Ok(HttpStream::Tls(Box::new(tls)))
        } else {
            Ok(HttpStream::Plain(tcp))
        }
    }

    async fn exchange(&self, request: HttpRequest) -> io::Result<HttpResponse> {
        let endpoint = parse_endpoint_url(&request.url).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not an http(s) URL: {}", request.url),
            )
        })?;
        let mut stream = self.connect(&endpoint).await?;
        stream.write_all(&serialize_request(&endpoint, &request)).await?;
        stream.flush().await?;
        let expect_body = request.method != Method::Head;
        timeout(self.response_timeout, read_response(&mut stream, expect_body))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "response timed out"))?
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture {
        let transport = self.clone();
        Box::pin(async move {
            tracing::debug!(method = %request.method, url = %request.url, "sending batch request");
            match transport.exchange(request).await {
                Ok(response) => {
                    tracing::debug!(status = response.code, len = response.body.len(), "batch response");
                    Ok(response)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "batch request failed");
                    Err(TransportFailure::from_io(&e))
                }
            }
        })
    }
}

/// Request head and body. Host, Content-Length and Connection are always ours.
fn serialize_request(endpoint: &EndpointUrl, request: &HttpRequest) -> Vec<u8> {
    let mut head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\n",
        request.method,
        endpoint.target,
        endpoint.authority()
    );
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("connection")
        {
            continue;
        }
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    if let Some(body) = &request.body {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");
    let mut out = head.into_bytes();
    if let Some(body) = &request.body {
        out.extend_from_slice(body.as_bytes());
    }
    out
}

async fn read_response<S: AsyncRead + Unpin>(stream: &mut S, expect_body: bool) -> io::Result<HttpResponse> {
    let mut parser = ResponseParser::new(expect_body);
    let mut collector = ResponseCollector::new();
    let mut buf = BytesMut::with_capacity(8192);
    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            parser.eof(&mut collector)?;
            break;
        }
        parser.receive(&mut buf, &mut collector)?;
        if parser.is_done() {
            break;
        }
    }
    collector
        .into_response()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no response received"))
}
