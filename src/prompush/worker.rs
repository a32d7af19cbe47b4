// prompush - Push weather station records to a Prometheus Pushgateway
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{PushClient, PushResult, PushTarget};
use crate::config::{RetryPolicy, MAX_BACKLOG};
use crate::encoder::{encode, TypeLookup};
use crate::metrics::{DropReason, PushMetrics};
use crate::record::Record;
use crate::registry::MetricTypeRegistry;
use std::error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug)]
pub enum SubmitError {
    Backlog(Record),
    Closed(Record),
}

impl SubmitError {
    /// Get back the record that could not be submitted.
    pub fn into_record(self) -> Record {
        match self {
            Self::Backlog(r) => r,
            Self::Closed(r) => r,
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backlog(_) => write!(f, "too many records waiting to be pushed"),
            Self::Closed(_) => write!(f, "push worker has stopped"),
        }
    }
}

impl error::Error for SubmitError {}

/// What happened to a record taken from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The record was encoded and handed to the Pushgateway client `tries` times.
    Pushed { result: PushResult, tries: u32 },
    /// The record was older than the stale limit and was dropped.
    Stale,
}

/// Everything a worker needs to encode and push records, besides the records.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub client: PushClient,
    pub target: Arc<PushTarget>,
    pub registry: Arc<MetricTypeRegistry>,
    pub lookup: TypeLookup,
    pub policy: RetryPolicy,
    pub metrics: PushMetrics,
}

/// Create a connected handle and worker.
///
/// Records submitted via the handle are processed by the worker one at a time in the
/// order they were submitted. At most `policy.max_backlog` records may be waiting.
pub fn channel(context: WorkerContext) -> (WorkerHandle, PushWorker) {
    let (tx, rx) = mpsc::channel(context.policy.max_backlog.clamp(1, MAX_BACKLOG));
    let handle = WorkerHandle {
        tx,
        metrics: context.metrics.clone(),
    };

    (handle, PushWorker { rx, context })
}

/// Sending side of a push worker.
#[derive(Debug)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Record>,
    metrics: PushMetrics,
}

impl WorkerHandle {
    /// Queue a record for pushing without waiting.
    pub fn submit(&self, record: Record) -> Result<(), SubmitError> {
        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(r) => {
                self.metrics.dropped(DropReason::Backlog);
                SubmitError::Backlog(r)
            }
            TrySendError::Closed(r) => SubmitError::Closed(r),
        })
    }

    /// Stop accepting records. Records already queued are still pushed.
    pub fn shutdown(self) {
        tracing::debug!(message = "closing push worker queue");
    }
}

/// Receiving side of a push worker, encodes and pushes each record.
#[derive(Debug)]
pub struct PushWorker {
    rx: mpsc::Receiver<Record>,
    context: WorkerContext,
}

impl PushWorker {
    /// Wait for the next record and push it.
    ///
    /// Returns `None` once the handle has been shut down (or dropped) and every queued
    /// record has been processed.
    pub async fn run_once(&mut self) -> Option<Outcome> {
        let record = self.rx.recv().await?;
        Some(self.process(record).await)
    }

    /// Push records until the handle has been shut down and the queue is empty.
    pub async fn run(mut self) {
        tracing::info!(message = "push worker started", url = %self.context.target.url());
        while self.run_once().await.is_some() {}
        tracing::info!(message = "push worker stopped");
    }

    async fn process(&self, record: Record) -> Outcome {
        let ctx = &self.context;
        ctx.metrics.record_received();

        if let Some(age) = self.stale_age(&record) {
            tracing::info!(
                message = "dropping stale record",
                age_secs = age.as_secs(),
                date_time = ?record.date_time(),
            );
            ctx.metrics.dropped(DropReason::Stale);
            return Outcome::Stale;
        }

        let payload = encode(&record, &ctx.registry, ctx.lookup);
        let mut tries = 0;

        let result = loop {
            tries += 1;

            let res = ctx.client.push(payload.clone(), &ctx.target).await;
            if res != PushResult::Skipped {
                ctx.metrics.attempt();
            }

            if !res.is_retryable() || tries >= ctx.policy.max_tries {
                break res;
            }

            tracing::debug!(
                message = "retrying push",
                tries = tries,
                max_tries = ctx.policy.max_tries,
                wait_secs = ctx.policy.retry_wait.as_secs_f64(),
            );
            tokio::time::sleep(ctx.policy.retry_wait).await;
        };

        tracing::debug!(message = "processed record", outcome = result.outcome(), tries = tries);
        ctx.metrics.pushed(&result);
        Outcome::Pushed { result, tries }
    }

    /// How old the record is if it's older than the configured stale limit.
    fn stale_age(&self, record: &Record) -> Option<Duration> {
        let limit = self.context.policy.stale?;
        let ts = record.date_time()?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        let age = now.checked_sub(Duration::try_from_secs_f64(ts).ok()?)?;
        if age > limit {
            Some(age)
        } else {
            None
        }
    }
}
