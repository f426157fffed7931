/*
 * accumulator.rs
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

//! One batch window. A [`BatchAccumulator`] is collecting while it sits in the engine's
//! registry; taking it out with [`BatchAccumulator::close`] yields a [`Batch`], which is either
//! sent or released exactly once because both consume it.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::adapter::{Adapter, WireAdapter};
use crate::config::EndpointConfig;
use crate::error::BatchError;
use crate::request::{BatchOutcome, BatchResponse, LogicalRequest};
use crate::transport::{Transport, TransportFailure};

/// A configured endpoint with its resolved adapter.
#[derive(Debug)]
pub(crate) struct Endpoint {
    pub config: EndpointConfig,
    pub adapter: Adapter,
}

pub(crate) type Reply = oneshot::Sender<Result<BatchOutcome, BatchError>>;

/// A buffered request and where its outcome goes.
pub(crate) struct Pending {
    pub request: LogicalRequest,
    pub reply: Reply,
}

/// Why a window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushTrigger {
    /// Reached `max_batched_request_per_call`.
    Size,
    /// Collection delay elapsed.
    Timer,
    /// `BatchEngine::flush`.
    Explicit,
}

pub(crate) struct BatchAccumulator {
    id: u64,
    endpoint: Arc<Endpoint>,
    pending: Vec<Pending>,
    timer: Option<JoinHandle<()>>,
}

impl BatchAccumulator {
    pub fn new(id: u64, endpoint: Arc<Endpoint>) -> Self {
        Self {
            id,
            endpoint,
            pending: Vec::new(),
            timer: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Append in submission order; returns the new length.
    pub fn push(&mut self, pending: Pending) -> usize {
        self.pending.push(pending);
        self.pending.len()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        self.timer = Some(timer);
    }

    /// Leave the collecting state. The timer is aborted unless it is the one closing us (a task
    /// must not abort itself), in which case the handle is just dropped.
    pub fn close(mut self, trigger: FlushTrigger) -> Batch {
        if let Some(timer) = self.timer.take() {
            if trigger != FlushTrigger::Timer {
                timer.abort();
            }
        }
        Batch {
            id: self.id,
            endpoint: self.endpoint,
            trigger,
            pending: self.pending,
        }
    }
}

/// A closed window: sent (or released) exactly once.
pub(crate) struct Batch {
    id: u64,
    endpoint: Arc<Endpoint>,
    trigger: FlushTrigger,
    pending: Vec<Pending>,
}

fn deliver(reply: Reply, outcome: Result<BatchOutcome, BatchError>) {
    if reply.send(outcome).is_err() {
        tracing::trace!("caller dropped its response future");
    }
}

impl Batch {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint.config
    }

    /// Not worth batching: hand every request back to its caller.
    pub fn release(self) {
        tracing::debug!(
            batch = self.id,
            endpoint = %self.endpoint.config.batch_endpoint_url,
            size = self.pending.len(),
            minimum = self.endpoint.config.minimum_batch_size,
            "below minimum batch size, releasing requests"
        );
        for p in self.pending {
            deliver(p.reply, Ok(BatchOutcome::ContinueNormally(p.request)));
        }
    }

    /// Build, send and demultiplex. Every caller gets exactly one outcome.
    pub async fn send(self, transport: Arc<dyn Transport>) {
        let Batch {
            id,
            endpoint,
            trigger,
            pending,
        } = self;
        let config = &endpoint.config;
        let (requests, replies): (Vec<LogicalRequest>, Vec<Reply>) =
            pending.into_iter().map(|p| (p.request, p.reply)).unzip();
        tracing::debug!(
            batch = id,
            endpoint = %config.batch_endpoint_url,
            adapter = endpoint.adapter.key(),
            ?trigger,
            size = requests.len(),
            "sending batch"
        );

        let physical = match endpoint.adapter.build_request(&requests, config) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(batch = id, error = %e, "could not build batch request");
                return fail_all(replies, e);
            }
        };

        let response = match transport.send(physical).await {
            Ok(r) if r.is_success() => r,
            Ok(r) => return fail_with(id, replies, TransportFailure::from_response(&r)),
            Err(failure) => return fail_with(id, replies, failure),
        };

        let results = match endpoint.adapter.parse_response(&requests, &response, config) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(batch = id, error = %e, "could not parse batch response");
                return fail_all(replies, e);
            }
        };

        let mut slots: Vec<Option<BatchResponse>> = vec![None; requests.len()];
        for data in results {
            match requests.iter().position(|r| std::ptr::eq(r, data.request)) {
                Some(i) if slots[i].is_none() => slots[i] = Some(data.into_response()),
                _ => tracing::warn!(batch = id, "ignoring result that matches no pending request"),
            }
        }
        for (index, (reply, slot)) in replies.into_iter().zip(slots).enumerate() {
            match slot {
                Some(response) => deliver(reply, Ok(BatchOutcome::Completed(response))),
                None => {
                    tracing::warn!(batch = id, index, "no response for request");
                    deliver(reply, Err(BatchError::MissingResponse { index }));
                }
            }
        }
    }
}

fn fail_all(replies: Vec<Reply>, err: BatchError) {
    for reply in replies {
        deliver(reply, Err(err.clone()));
    }
}

/// Same failure response for every caller; no retry.
fn fail_with(id: u64, replies: Vec<Reply>, failure: TransportFailure) {
    tracing::warn!(batch = id, status = failure.status, "{}", failure);
    let response = failure.to_response();
    for reply in replies {
        deliver(reply, Ok(BatchOutcome::Completed(response.clone())));
    }
}
