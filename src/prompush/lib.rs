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

//! Push weather station records to a Prometheus Pushgateway
//!
//! ## Features
//!
//! `prompush` takes flat records of weather station readings (one record per sampling
//! interval) and pushes each of them to a [Prometheus Pushgateway] using the text
//! exposition format. Every reading in a record becomes a metric named `weather_$KEY`,
//! for example a record like the following
//!
//! ```text
//! {"dateTime": 1466708460.0, "outTemp": 32.4567414016, "rain": 0.0}
//! ```
//!
//! is pushed as
//!
//! ```text
//! weather_outTemp 32.4567414016
//! weather_rain 0.0
//! ```
//!
//! to `http://localhost:9091/metrics/job/weather/instance/Vantage`. The `dateTime`
//! field is the time of the record and is never pushed. Readings without a value are
//! pushed as `0.0`.
//!
//! Readings known to the [`registry::MetricTypeRegistry`] are annotated with a
//! `# TYPE` line. By default the registry is consulted with the plain record key
//! (`outTemp`) so only unprefixed entries such as `co2` or `pm10` are annotated and
//! everything else is left for the Pushgateway to mark `untyped`. Use
//! `--type-lookup prefixed` to look up the full metric name (`weather_outTemp`)
//! instead.
//!
//! [Prometheus Pushgateway]: https://github.com/prometheus/pushgateway
//!
//! ## Build
//!
//! `prompush` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! `prompush` reads records from standard input, one JSON object per line, and pushes
//! each of them as it arrives. Values must be numbers or `null`.
//!
//! ```text
//! weather_station_reader | ./prompush --host pushgw.example.com --instance Vantage
//! ```
//!
//! Failed pushes are retried up to `--max-tries` times when the Pushgateway can't be
//! reached. Pushes rejected by the Pushgateway are logged and not retried. Records
//! older than `--stale-secs` (60 seconds by default, `0` to keep every record) are
//! dropped. Use `--skip-post` to encode records without making any requests.
//!
//! ### Prometheus
//!
//! When started with `--bind`, metrics about `prompush` itself are exposed at `/metrics`
//! on the given address.
//!
//! * `prompush_records_total` - Records received for pushing.
//! * `prompush_attempts_total` - Requests made to the Pushgateway.
//! * `prompush_pushes_total{outcome=$OUTCOME}` - Final outcome of pushing each record.
//! * `prompush_dropped_total{reason=$REASON}` - Records dropped without being pushed.
//! * `prompush_last_success_timestamp_seconds` - UNIX timestamp of the last successful push.
//!

pub mod client;
pub mod config;
pub mod encoder;
pub mod http;
pub mod metrics;
pub mod record;
pub mod registry;
pub mod worker;
