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

//! The batching engine: routes submitted requests into one open window per batch endpoint
//! and flushes windows on size, timer, or request.
//!
//! A window is removed from the registry before its batch is sent, so requests arriving
//! while a batch is in flight open a new window instead of joining the departing one.

mod accumulator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use accumulator::{Batch, BatchAccumulator, Endpoint, FlushTrigger, Pending};

use crate::adapter::{Adapter, WireAdapter};
use crate::config::BatchConfig;
use crate::environment::Environment;
use crate::error::BatchError;
use crate::request::{BatchOutcome, LogicalRequest, ResponseFuture};
use crate::transport::Transport;

/// Batching engine. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct BatchEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: BatchConfig,
    /// Parallel to `config.endpoints()`.
    endpoints: Vec<Arc<Endpoint>>,
    transport: Arc<dyn Transport>,
    runtime_handle: Handle,
    /// Open windows keyed by batch endpoint URL.
    registry: Mutex<HashMap<String, BatchAccumulator>>,
    next_id: AtomicU64,
}

impl BatchEngine {
    /// Engine on the current tokio runtime.
    pub fn new(
        config: BatchConfig,
        transport: Arc<dyn Transport>,
        env: Arc<dyn Environment>,
    ) -> Result<Self, BatchError> {
        let handle = Handle::try_current().map_err(|e| BatchError::Config(e.to_string()))?;
        Self::with_runtime_handle(config, transport, env, handle)
    }

    /// Engine spawning its timers and sends on `handle`. Adapters are resolved here, so an
    /// unknown adapter name fails now rather than at first use.
    pub fn with_runtime_handle(
        config: BatchConfig,
        transport: Arc<dyn Transport>,
        env: Arc<dyn Environment>,
        handle: Handle,
    ) -> Result<Self, BatchError> {
        let mut endpoints = Vec::with_capacity(config.endpoints().len());
        for endpoint in config.endpoints() {
            if endpoint.service_url.is_empty() || endpoint.batch_endpoint_url.is_empty() {
                return Err(BatchError::Config(
                    "endpoint needs a service URL and a batch endpoint URL".to_string(),
                ));
            }
            let adapter = Adapter::resolve(&endpoint.adapter, &env)?;
            endpoints.push(Arc::new(Endpoint {
                config: endpoint.clone(),
                adapter,
            }));
        }
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                endpoints,
                transport,
                runtime_handle: handle,
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Whether `submit` would batch this request: endpoint rules plus the adapter's guard.
    pub fn can_batch_request(&self, request: &LogicalRequest) -> bool {
        self.inner.batchable_endpoint(request).is_some()
    }

    /// Queue a request. The future resolves once its batch is answered or failed, or at once
    /// with `ContinueNormally` when the request is not batchable.
    pub fn submit(&self, request: LogicalRequest) -> ResponseFuture {
        let Some(endpoint) = self.inner.batchable_endpoint(&request) else {
            tracing::trace!(url = %request.url, method = %request.method, "not batchable");
            return Box::pin(std::future::ready(Ok(BatchOutcome::ContinueNormally(request))));
        };
        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(endpoint, Pending { request, reply: tx });
        Box::pin(async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(BatchError::Cancelled),
            }
        })
    }

    /// Send open windows now, regardless of size: the one for `endpoint_url` (case-insensitive)
    /// or all of them. Returns the number of batches dispatched.
    pub fn flush(&self, endpoint_url: Option<&str>) -> usize {
        let batches: Vec<Batch> = {
            let mut registry = self.inner.lock_registry();
            let keys: Vec<String> = registry
                .keys()
                .filter(|k| endpoint_url.map_or(true, |u| k.eq_ignore_ascii_case(u)))
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|k| registry.remove(k))
                .map(|acc| acc.close(FlushTrigger::Explicit))
                .collect()
        };
        let count = batches.len();
        for batch in batches {
            self.inner.dispatch(batch);
        }
        count
    }

    /// Batch endpoint URLs with an open window.
    pub fn pending_endpoints(&self) -> Vec<String> {
        self.inner.lock_registry().keys().cloned().collect()
    }

    /// Requests waiting in the open window for `endpoint_url`.
    pub fn pending_requests(&self, endpoint_url: &str) -> usize {
        self.inner
            .lock_registry()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(endpoint_url))
            .map(|(_, acc)| acc.len())
            .unwrap_or(0)
    }
}

impl EngineInner {
    fn lock_registry(&self) -> MutexGuard<'_, HashMap<String, BatchAccumulator>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batchable_endpoint(&self, request: &LogicalRequest) -> Option<Arc<Endpoint>> {
        let index = self.config.endpoint_index(&request.url)?;
        let endpoint = self.endpoints.get(index)?;
        let ok = endpoint.config.accepts(&request.url, &request.method)
            && endpoint.adapter.can_batch_request(request, &endpoint.config);
        ok.then(|| Arc::clone(endpoint))
    }

    fn enqueue(self: &Arc<Self>, endpoint: Arc<Endpoint>, pending: Pending) {
        let key = endpoint.config.batch_endpoint_url.clone();
        let max = endpoint.config.max_batched_request_per_call;
        let delay = endpoint.config.batch_request_collection_delay;

        let mut registry = self.lock_registry();
        let acc = registry.entry(key.clone()).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(batch = id, endpoint = %key, "opening batch window");
            BatchAccumulator::new(id, endpoint)
        });
        let len = acc.push(pending);
        if len >= max {
            if let Some(acc) = registry.remove(&key) {
                drop(registry);
                self.dispatch(acc.close(FlushTrigger::Size));
            }
        } else if !acc.has_timer() {
            let timer = self.spawn_timer(key, acc.id(), delay);
            acc.set_timer(timer);
        }
    }

    fn spawn_timer(self: &Arc<Self>, key: String, id: u64, delay: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        self.runtime_handle.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_timer(&key, id).await;
        })
    }

    /// Collection delay elapsed. A window that already left the registry (size or explicit
    /// flush) has a different id or no entry, and nothing happens.
    async fn on_timer(&self, key: &str, id: u64) {
        let batch = {
            let mut registry = self.lock_registry();
            if registry.get(key).map(|acc| acc.id()) == Some(id) {
                registry.remove(key).map(|acc| acc.close(FlushTrigger::Timer))
            } else {
                None
            }
        };
        let Some(batch) = batch else { return };
        if batch.len() < batch.endpoint().minimum_batch_size {
            batch.release();
        } else {
            batch.send(Arc::clone(&self.transport)).await;
        }
    }

    fn dispatch(&self, batch: Batch) {
        let transport = Arc::clone(&self.transport);
        self.runtime_handle.spawn(batch.send(transport));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::environment::StaticEnvironment;
    use crate::http::HttpRequest;
    use crate::transport::{TransportFailure, TransportFuture};

    struct NeverCalled;

    impl Transport for NeverCalled {
        fn send(&self, _request: HttpRequest) -> TransportFuture {
            Box::pin(std::future::ready(Err(TransportFailure::new(0, "unexpected send"))))
        }
    }

    fn engine(endpoint: EndpointConfig) -> BatchEngine {
        let mut config = BatchConfig::new();
        config.set_allowed_batch_endpoint(endpoint);
        BatchEngine::new(
            config,
            Arc::new(NeverCalled),
            Arc::new(StaticEnvironment::new("http://localhost/")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_adapter_fails_fast() {
        let mut config = BatchConfig::new();
        config.set_allowed_batch_endpoint(
            EndpointConfig::new("http://a", "http://a/batch")
                .with_adapter(crate::config::AdapterSelector::Named("soapAdapter".to_string())),
        );
        let err = BatchEngine::new(
            config,
            Arc::new(NeverCalled),
            Arc::new(StaticEnvironment::new("http://localhost/")),
        )
        .err();
        assert_eq!(err, Some(BatchError::UnknownAdapter("soapAdapter".to_string())));
    }

    #[test]
    fn new_outside_runtime_is_config_error() {
        let result = BatchEngine::new(
            BatchConfig::new(),
            Arc::new(NeverCalled),
            Arc::new(StaticEnvironment::new("http://localhost/")),
        );
        assert!(matches!(result.err(), Some(BatchError::Config(_))));
    }

    #[tokio::test]
    async fn non_batchable_continues_at_once() {
        let engine = engine(EndpointConfig::new("http://a", "http://a/batch"));
        let head = LogicalRequest::new(crate::http::Method::Head, "http://a/x");
        assert!(!engine.can_batch_request(&head));
        let outcome = engine.submit(head.clone()).await.unwrap();
        assert_eq!(outcome, BatchOutcome::ContinueNormally(head));
        assert!(engine.pending_endpoints().is_empty());
    }

    #[tokio::test]
    async fn adapter_guard_applies() {
        let engine = engine(
            EndpointConfig::new("http://a", "http://a/batch")
                .with_adapter(crate::config::AdapterSelector::Named("nodeJsMultiFetchAdapter".to_string())),
        );
        assert!(engine.can_batch_request(&LogicalRequest::get("http://a/x")));
        assert!(!engine.can_batch_request(&LogicalRequest::post("http://a/x", "{}")));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_flush_of_unknown_endpoint_is_noop() {
        let engine = engine(EndpointConfig::new("http://a", "http://a/batch"));
        let _pending = engine.submit(LogicalRequest::get("http://a/x"));
        assert_eq!(engine.pending_requests("HTTP://A/BATCH"), 1);
        assert_eq!(engine.flush(Some("http://b/batch")), 0);
        assert_eq!(engine.pending_endpoints(), vec!["http://a/batch".to_string()]);
    }
}
