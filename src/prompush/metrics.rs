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

use crate::client::PushResult;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReasonLabels {
    reason: &'static str,
}

/// Why a record was discarded without being pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Stale,
    Backlog,
}

impl DropReason {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Backlog => "backlog",
        }
    }
}

/// Holder for metrics about pushing records to the Pushgateway.
///
/// All metrics are created and registered upon call to `PushMetrics::new()` and share
/// the prefix "prompush_". Cloning is cheap and clones update the same metrics.
#[derive(Debug, Clone)]
pub struct PushMetrics {
    records: Counter,
    attempts: Counter,
    pushes: Family<OutcomeLabels, Counter>,
    dropped: Family<ReasonLabels, Counter>,
    last_success: Gauge<f64, AtomicU64>,
}

impl PushMetrics {
    /// Create a new `PushMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let records = Counter::default();
        let attempts = Counter::default();
        let pushes = Family::<OutcomeLabels, Counter>::default();
        let dropped = Family::<ReasonLabels, Counter>::default();
        let last_success = Gauge::<f64, AtomicU64>::default();

        reg.register("prompush_records", "Records received for pushing", records.clone());
        reg.register("prompush_attempts", "Requests made to the Pushgateway", attempts.clone());
        reg.register("prompush_pushes", "Final outcome of pushing each record", pushes.clone());
        reg.register("prompush_dropped", "Records dropped without being pushed", dropped.clone());
        reg.register(
            "prompush_last_success_timestamp_seconds",
            "UNIX timestamp of the last successful push",
            last_success.clone(),
        );

        Self {
            records,
            attempts,
            pushes,
            dropped,
            last_success,
        }
    }

    pub fn record_received(&self) {
        self.records.inc();
    }

    pub fn attempt(&self) {
        self.attempts.inc();
    }

    /// Count the final outcome of a record, updating the last success time if it was pushed.
    pub fn pushed(&self, result: &PushResult) {
        self.pushes
            .get_or_create(&OutcomeLabels {
                outcome: result.outcome(),
            })
            .inc();

        if result.is_success() {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            self.last_success.set(now);
        }
    }

    pub fn dropped(&self, reason: DropReason) {
        self.dropped
            .get_or_create(&ReasonLabels {
                reason: reason.as_str(),
            })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::{DropReason, PushMetrics};
    use crate::client::PushResult;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use reqwest::StatusCode;

    #[test]
    fn test_metrics_encoded() {
        let mut reg = Registry::default();
        let metrics = PushMetrics::new(&mut reg);

        metrics.record_received();
        metrics.record_received();
        metrics.attempt();
        metrics.pushed(&PushResult::Success(StatusCode::OK));
        metrics.dropped(DropReason::Stale);

        let mut buf = String::new();
        encode(&mut buf, &reg).unwrap();

        assert!(buf.contains("prompush_records_total 2"));
        assert!(buf.contains("prompush_attempts_total 1"));
        assert!(buf.contains("prompush_pushes_total{outcome=\"success\"} 1"));
        assert!(buf.contains("prompush_dropped_total{reason=\"stale\"} 1"));

        let last_success = buf
            .lines()
            .find_map(|l| l.strip_prefix("prompush_last_success_timestamp_seconds "))
            .map(|v| v.parse::<f64>().unwrap())
            .unwrap();
        assert!(last_success > 0.0);
    }

    #[test]
    fn test_last_success_unset_after_failure() {
        let mut reg = Registry::default();
        let metrics = PushMetrics::new(&mut reg);

        metrics.pushed(&PushResult::TransportFailure("connection refused".to_owned()));

        let mut buf = String::new();
        encode(&mut buf, &reg).unwrap();

        assert!(buf.contains("prompush_pushes_total{outcome=\"transport_failure\"} 1"));
        assert!(buf.contains("prompush_last_success_timestamp_seconds 0.0\n"));
    }
}
