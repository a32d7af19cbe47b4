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

use std::collections::HashMap;
use std::fmt;

/// Metric types understood by the Prometheus text exposition format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Counter,
    Histogram,
    Summary,
    Untyped,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        };

        f.write_str(s)
    }
}

// Readings from a Vantage station and auxiliary air quality sensors. Fields like
// usUnits and ET have no entry and end up untyped.
const WEATHER_GAUGES: &[&str] = &[
    "weather_outHumidity",
    "weather_maxSolarRad",
    "weather_altimeter",
    "weather_heatindex",
    "weather_radiation",
    "weather_inDewpoint",
    "weather_inTemp",
    "weather_barometer",
    "weather_extraTemp1",
    "weather_extraTemp2",
    "weather_extraTemp3",
    "weather_windchill",
    "weather_dewpoint",
    "weather_rain",
    "weather_humidex",
    "weather_pressure",
    "weather_rainRate",
    "weather_appTemp",
    "weather_UV",
    "weather_windDir",
    "weather_outTemp",
    "weather_windSpeed",
    "weather_inHumidity",
    "weather_windGust",
    "weather_windGustDir",
    "weather_cloudbase",
    "co2",
    "pm10",
    "pm2_5",
    "windrun",
];

/// Read-only mapping of metric names to the type announced for them.
///
/// Names missing from the registry are pushed without a `# TYPE` line and the
/// Pushgateway will treat them as `untyped`.
#[derive(Debug, Clone, Default)]
pub struct MetricTypeRegistry {
    types: HashMap<String, MetricType>,
}

impl MetricTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every known weather station reading marked as a gauge.
    pub fn weather() -> Self {
        WEATHER_GAUGES.iter().map(|name| (*name, MetricType::Gauge)).collect()
    }

    pub fn get(&self, name: &str) -> Option<MetricType> {
        self.types.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, MetricType)> for MetricTypeRegistry {
    fn from_iter<T: IntoIterator<Item = (S, MetricType)>>(iter: T) -> Self {
        Self {
            types: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
