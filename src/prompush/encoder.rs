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

use crate::record::{Record, Value, DATE_TIME};
use crate::registry::MetricTypeRegistry;
use std::fmt::Write;
use std::str::FromStr;

/// Prefix applied to every key of a record to build the metric name.
pub const METRIC_PREFIX: &str = "weather_";

/// How record keys are looked up in a `MetricTypeRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeLookup {
    /// Look up the key exactly as it appears in the record (`outTemp`).
    ///
    /// Registry entries stored with the `weather_` prefix never match this way,
    /// only unprefixed entries such as `co2` do.
    #[default]
    Literal,
    /// Look up the prefixed metric name (`weather_outTemp`).
    Prefixed,
}

impl FromStr for TypeLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "literal" => Ok(Self::Literal),
            "prefixed" => Ok(Self::Prefixed),
            _ => Err(format!("unknown type lookup '{}', expected 'literal' or 'prefixed'", s)),
        }
    }
}

/// Encode a record in the Prometheus text exposition format.
///
/// Every key other than `dateTime` becomes a single sample named `weather_$KEY`, in
/// record order. Missing values are written as `0.0`. Keys with an entry in the registry
/// are preceded by a `# TYPE` line. Metric names are not validated.
pub fn encode(record: &Record, registry: &MetricTypeRegistry, lookup: TypeLookup) -> String {
    let mut out = String::new();

    for (key, value) in record.iter().filter(|(k, _)| *k != DATE_TIME) {
        let value = value.unwrap_or(Value::Float(0.0));
        let name = format!("{}{}", METRIC_PREFIX, key);

        let lookup_key = match lookup {
            TypeLookup::Literal => key,
            TypeLookup::Prefixed => name.as_str(),
        };

        // Writing to a String cannot fail
        if let Some(metric_type) = registry.get(lookup_key) {
            let _ = writeln!(out, "# TYPE {} {}", name, metric_type);
        }

        let _ = writeln!(out, "{} {}", name, value);
    }

    out
}
