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

use crate::client::PushTarget;
use crate::encoder::TypeLookup;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9091;
pub const DEFAULT_JOB: &str = "weather";
pub const DEFAULT_INSTANCE: &str = "Vantage";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_TRIES: u32 = 3;
pub const DEFAULT_RETRY_WAIT_SECS: u64 = 5;
pub const DEFAULT_STALE_SECS: u64 = 60;

/// Largest number of pending records a worker will hold.
pub const MAX_BACKLOG: usize = usize::MAX >> 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(String),
    Invalid { key: String, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required option {}", key),
            Self::Invalid { key, value, reason } => write!(f, "invalid value '{}' for {}: {}", value, key, reason),
        }
    }
}

impl error::Error for ConfigError {}

/// Settings used by a worker to decide if and how often a record is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub retry_wait: Duration,
    pub max_backlog: usize,
    pub stale: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_tries: DEFAULT_MAX_TRIES,
            retry_wait: Duration::from_secs(DEFAULT_RETRY_WAIT_SECS),
            max_backlog: MAX_BACKLOG,
            stale: stale_limit(DEFAULT_STALE_SECS),
        }
    }
}

/// Every option recognized for pushing to a Pushgateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    pub host: String,
    pub port: String,
    pub job: String,
    pub instance: String,
    pub skip_post: bool,
    pub timeout: Duration,
    pub type_lookup: TypeLookup,
    pub policy: RetryPolicy,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT.to_string(),
            job: DEFAULT_JOB.to_owned(),
            instance: DEFAULT_INSTANCE.to_owned(),
            skip_post: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            type_lookup: TypeLookup::default(),
            policy: RetryPolicy::default(),
        }
    }
}

impl PushConfig {
    /// Build a configuration from string options supplied by a host.
    ///
    /// Options that are absent keep their default. Durations are whole seconds and
    /// booleans may be given as `true/false`, `yes/no`, `on/off`, or `1/0`. A `stale`
    /// of `0` or `none` keeps every record regardless of age. Unknown options are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in options {
            match key.as_str() {
                "host" => config.host = value.trim().to_owned(),
                "port" => config.port = value.trim().to_owned(),
                "job" => config.job = value.clone(),
                "instance" => config.instance = value.clone(),
                "skip_post" => config.skip_post = parse_bool(key, value)?,
                "timeout" => config.timeout = Duration::from_secs(parse_value(key, value)?),
                "type_lookup" => config.type_lookup = parse_value(key, value)?,
                "max_tries" => config.policy.max_tries = parse_value(key, value)?,
                "retry_wait" => config.policy.retry_wait = Duration::from_secs(parse_value(key, value)?),
                "max_backlog" => config.policy.max_backlog = parse_value(key, value)?,
                "stale" => config.policy.stale = parse_stale(key, value)?,
                other => tracing::debug!(message = "ignoring unknown option", option = %other),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that required options are present and that numeric options are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target()?;

        if self.policy.max_tries == 0 {
            return Err(invalid("max_tries", "0", "must be at least 1"));
        }

        if self.policy.max_backlog == 0 || self.policy.max_backlog > MAX_BACKLOG {
            return Err(invalid(
                "max_backlog",
                &self.policy.max_backlog.to_string(),
                &format!("must be between 1 and {}", MAX_BACKLOG),
            ));
        }

        Ok(())
    }

    /// Build the Pushgateway target described by this configuration.
    pub fn target(&self) -> Result<PushTarget, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Missing("host".to_owned()));
        }

        if self.port.is_empty() {
            return Err(ConfigError::Missing("port".to_owned()));
        }

        let port = parse_value("port", &self.port)?;
        PushTarget::new(&self.host, port, &self.job, &self.instance, self.skip_post)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| invalid(key, value, &e.to_string()))
}

/// Records older than `secs` are stale, zero means records are never stale.
pub fn stale_limit(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn parse_stale(key: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    if value.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    parse_value(key, value).map(stale_limit)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PushConfig, DEFAULT_MAX_TRIES, DEFAULT_STALE_SECS};
    use crate::encoder::TypeLookup;
    use std::collections::HashMap;
    use std::time::Duration;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_from_options_defaults() {
        let config = PushConfig::from_options(&HashMap::new()).unwrap();
        assert_eq!(PushConfig::default(), config);

        let target = config.target().unwrap();
        assert_eq!("http://localhost:9091/metrics/job/weather/instance/Vantage", target.url().as_str());
        assert_eq!(DEFAULT_MAX_TRIES, config.policy().max_tries);
        assert_eq!(Some(Duration::from_secs(DEFAULT_STALE_SECS)), config.policy().stale);
        assert_eq!(Some(Duration::from_secs(60)), config.policy().stale);
    }

    #[test]
    fn test_from_options_stale_disabled() {
        let config = PushConfig::from_options(&options(&[("stale", "0")])).unwrap();
        assert_eq!(None, config.policy().stale);

        let config = PushConfig::from_options(&options(&[("stale", "None")])).unwrap();
        assert_eq!(None, config.policy().stale);
    }

    #[test]
    fn test_from_options_invalid_stale() {
        let res = PushConfig::from_options(&options(&[("stale", "-5")]));
        assert!(matches!(res, Err(ConfigError::Invalid { key, .. }) if key == "stale"));
    }

    #[test]
    fn test_from_options_overrides() {
        let config = PushConfig::from_options(&options(&[
            ("host", "pushgw.example.com"),
            ("port", "9191"),
            ("job", "station"),
            ("instance", ""),
            ("skip_post", "Yes"),
            ("timeout", "3"),
            ("max_tries", "5"),
            ("retry_wait", "1"),
            ("max_backlog", "100"),
            ("stale", "300"),
            ("type_lookup", "prefixed"),
            ("log_success", "true"),
        ]))
        .unwrap();

        assert!(config.skip_post);
        assert_eq!(Duration::from_secs(3), config.timeout);
        assert_eq!(TypeLookup::Prefixed, config.type_lookup);
        assert_eq!(5, config.policy.max_tries);
        assert_eq!(Duration::from_secs(1), config.policy.retry_wait);
        assert_eq!(100, config.policy.max_backlog);
        assert_eq!(Some(Duration::from_secs(300)), config.policy.stale);

        let target = config.target().unwrap();
        assert_eq!("http://pushgw.example.com:9191/metrics/job/station", target.url().as_str());
        assert!(target.skip_post());
    }

    #[test]
    fn test_from_options_missing_host() {
        let res = PushConfig::from_options(&options(&[("host", "")]));
        assert_eq!(Err(ConfigError::Missing("host".to_owned())), res);
    }

    #[test]
    fn test_from_options_missing_port() {
        let res = PushConfig::from_options(&options(&[("port", " ")]));
        assert_eq!(Err(ConfigError::Missing("port".to_owned())), res);
    }

    #[test]
    fn test_from_options_invalid_port() {
        let res = PushConfig::from_options(&options(&[("port", "pushgw")]));
        assert!(matches!(res, Err(ConfigError::Invalid { key, .. }) if key == "port"));
    }

    #[test]
    fn test_from_options_invalid_bool() {
        let res = PushConfig::from_options(&options(&[("skip_post", "maybe")]));
        assert!(matches!(res, Err(ConfigError::Invalid { key, .. }) if key == "skip_post"));
    }

    #[test]
    fn test_from_options_zero_tries() {
        let res = PushConfig::from_options(&options(&[("max_tries", "0")]));
        assert!(matches!(res, Err(ConfigError::Invalid { key, .. }) if key == "max_tries"));
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!("missing required option host", ConfigError::Missing("host".to_owned()).to_string());
    }
}
