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

use crate::config::ConfigError;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};

// Characters that can't appear as-is in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Where, and whether, records are pushed.
///
/// The Pushgateway URL is built once when the target is created so that an
/// invalid host or port is caught at startup instead of on every push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    skip_post: bool,
    url: Url,
}

impl PushTarget {
    pub fn new(host: &str, port: u16, job: &str, instance: &str, skip_post: bool) -> Result<Self, ConfigError> {
        if host.is_empty() {
            return Err(ConfigError::Missing("host".to_owned()));
        }

        let mut raw = format!(
            "http://{}:{}/metrics/job/{}",
            host,
            port,
            utf8_percent_encode(job, PATH_SEGMENT)
        );

        if !instance.is_empty() {
            raw.push_str("/instance/");
            raw.push_str(&utf8_percent_encode(instance, PATH_SEGMENT).to_string());
        }

        let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            key: "host".to_owned(),
            value: host.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(PushTarget { skip_post, url })
    }

    pub fn skip_post(&self) -> bool {
        self.skip_post
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Outcome of a single attempt to push a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Success(StatusCode),
    Rejected(StatusCode, String),
    TransportFailure(String),
    Skipped,
}

impl PushResult {
    /// Label describing the outcome, used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Rejected(_, _) => "rejected",
            Self::TransportFailure(_) => "transport_failure",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Only failures to reach the Pushgateway are worth trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

/// Client for pushing encoded metrics to a Prometheus Pushgateway.
///
/// Each call to `push` makes at most one request. Timeouts are whatever the
/// underlying `reqwest::Client` was built with.
#[derive(Debug, Clone)]
pub struct PushClient {
    client: Client,
}

impl PushClient {
    const USER_AGENT: &'static str = concat!("prompush/", env!("CARGO_PKG_VERSION"));
    const OCTET_STREAM: &'static str = "application/octet-stream";

    pub fn new(client: Client) -> Self {
        PushClient { client }
    }

    pub async fn push(&self, payload: String, target: &PushTarget) -> PushResult {
        let url = target.url();
        if target.skip_post() {
            tracing::info!(message = "skipping post", url = %url, num_bytes = payload.len());
            return PushResult::Skipped;
        }

        let res = match self
            .client
            .post(url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(CONTENT_TYPE, Self::OCTET_STREAM)
            .body(payload)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                tracing::error!(message = "pushgateway post error", url = %url, error = %e);
                return PushResult::TransportFailure(e.to_string());
            }
        };

        let status = res.status();
        if status.is_success() {
            tracing::info!(message = "pushgateway post succeeded", url = %url, status = status.as_u16());
            return PushResult::Success(status);
        }

        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(message = "unable to read pushgateway response", error = %e);
                String::new()
            }
        };

        tracing::error!(
            message = "pushgateway post rejected",
            url = %url,
            status = status.as_u16(),
            body = %body,
        );
        PushResult::Rejected(status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::{PushClient, PushResult, PushTarget};
    use crate::config::ConfigError;
    use reqwest::{Client, StatusCode};

    #[test]
    fn test_target_url_with_instance() {
        let target = PushTarget::new("localhost", 9091, "weather", "Vantage", false).unwrap();
        assert_eq!("http://localhost:9091/metrics/job/weather/instance/Vantage", target.url().as_str());
    }

    #[test]
    fn test_target_url_without_instance() {
        let target = PushTarget::new("10.0.0.5", 9091, "weather", "", false).unwrap();
        assert_eq!("http://10.0.0.5:9091/metrics/job/weather", target.url().as_str());
    }

    #[test]
    fn test_target_url_encodes_segments() {
        let target = PushTarget::new("localhost", 9091, "back yard", "a/b", false).unwrap();
        assert_eq!(
            "http://localhost:9091/metrics/job/back%20yard/instance/a%2Fb",
            target.url().as_str()
        );
    }

    #[test]
    fn test_target_missing_host() {
        let res = PushTarget::new("", 9091, "weather", "", false);
        assert_eq!(Err(ConfigError::Missing("host".to_owned())), res);
    }

    #[test]
    fn test_target_invalid_host() {
        let res = PushTarget::new("bad host", 9091, "weather", "", false);
        assert!(matches!(res, Err(ConfigError::Invalid { key, .. }) if key == "host"));
    }

    #[test]
    fn test_push_result_classification() {
        assert!(PushResult::Success(StatusCode::ACCEPTED).is_success());
        assert!(!PushResult::Rejected(StatusCode::BAD_REQUEST, String::new()).is_retryable());
        assert!(PushResult::TransportFailure("refused".to_owned()).is_retryable());
        assert_eq!("skipped", PushResult::Skipped.outcome());
    }

    #[tokio::test]
    async fn test_push_skip_post() {
        // Nothing listens on this port, a request would fail
        let target = PushTarget::new("127.0.0.1", 1, "weather", "", true).unwrap();
        let client = PushClient::new(Client::new());

        let res = client.push("weather_outTemp 1.0\n".to_owned(), &target).await;
        assert_eq!(PushResult::Skipped, res);
    }
}
