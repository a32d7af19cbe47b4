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

use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use std::fmt;

/// Key of the record timestamp, in UNIX seconds. Never emitted as a metric.
pub const DATE_TIME: &str = "dateTime";

/// A single reading from a weather station record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl fmt::Display for Value {
    /// Format the value as a Prometheus sample value.
    ///
    /// Floats always carry a fractional part or an exponent (`0.0`, `1466708460.0`)
    /// while integers are written as-is (`1`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) if v.is_nan() => write!(f, "NaN"),
            Self::Float(v) if v.is_infinite() && v.is_sign_positive() => write!(f, "+Inf"),
            Self::Float(v) if v.is_infinite() => write!(f, "-Inf"),
            Self::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// One flat record of station readings, in the order the host delivered them.
///
/// Values may be missing (`None`) for sensors that did not report during the
/// interval. Inserting a key that already exists replaces its value without
/// changing its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Option<Value>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K, V>(&mut self, key: K, value: Option<V>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let key = key.into();
        let value = value.map(Into::into);

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder style version of `insert` for a value that is present.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.insert(key, Some(value));
        self
    }

    /// Builder style version of `insert` for a missing value.
    pub fn with_null<K: Into<String>>(mut self, key: K) -> Self {
        self.insert::<K, f64>(key, None);
        self
    }

    pub fn get(&self, key: &str) -> Option<Option<Value>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// Timestamp of the record in UNIX seconds, if it has one.
    pub fn date_time(&self) -> Option<f64> {
        self.get(DATE_TIME).flatten().map(|v| v.as_f64())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<Value>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map(Value::Integer).unwrap_or(Value::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of metric names to numbers or null")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::new();
        while let Some((key, value)) = access.next_entry::<String, Option<Value>>()? {
            record.insert(key, value);
        }

        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}
