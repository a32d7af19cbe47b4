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

use clap::Parser;
use prompush::client::PushClient;
use prompush::config::{self, PushConfig, RetryPolicy};
use prompush::encoder::TypeLookup;
use prompush::http::RequestContext;
use prompush::metrics::PushMetrics;
use prompush::record::Record;
use prompush::registry::MetricTypeRegistry;
use prompush::worker::{self, WorkerContext, WorkerHandle};
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;

#[derive(Debug, Parser)]
#[clap(name = "prompush", version = clap::crate_version!())]
struct PromPushApplication {
    /// Pushgateway hostname or IP address
    #[clap(long, default_value_t = config::DEFAULT_HOST.into())]
    host: String,

    /// Pushgateway port
    #[clap(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Job label to push metrics under
    #[clap(long, default_value_t = config::DEFAULT_JOB.into())]
    job: String,

    /// Instance label to push metrics under. An empty instance leaves the label
    /// out of the Pushgateway URL entirely.
    #[clap(long, default_value_t = config::DEFAULT_INSTANCE.into())]
    instance: String,

    /// Encode records but don't make any requests to the Pushgateway
    #[clap(long)]
    skip_post: bool,

    /// Timeout for requests to the Pushgateway, in seconds.
    #[clap(long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Number of attempts for each record when the Pushgateway can't be reached
    #[clap(long, default_value_t = config::DEFAULT_MAX_TRIES)]
    max_tries: u32,

    /// Time to wait between attempts to push a record, in seconds.
    #[clap(long, default_value_t = config::DEFAULT_RETRY_WAIT_SECS)]
    retry_wait_secs: u64,

    /// Maximum number of records waiting to be pushed. Records that arrive when
    /// this many are waiting are dropped.
    #[clap(long, default_value_t = config::MAX_BACKLOG)]
    max_backlog: usize,

    /// Drop records with a `dateTime` older than this many seconds. Use 0 to push
    /// records regardless of age.
    #[clap(long, default_value_t = config::DEFAULT_STALE_SECS)]
    stale_secs: u64,

    /// How to look up record keys in the metric type table. Allowed values are
    /// 'literal' (the key as-is) and 'prefixed' (the key with the "weather_" prefix)
    #[clap(long, default_value = "literal")]
    type_lookup: TypeLookup,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to expose metrics about prompush itself on. By default, no metrics
    /// are exposed.
    #[clap(long)]
    bind: Option<SocketAddr>,
}

impl PromPushApplication {
    fn push_config(&self) -> PushConfig {
        PushConfig {
            host: self.host.clone(),
            port: self.port.to_string(),
            job: self.job.clone(),
            instance: self.instance.clone(),
            skip_post: self.skip_post,
            timeout: Duration::from_secs(self.timeout_secs),
            type_lookup: self.type_lookup,
            policy: RetryPolicy {
                max_tries: self.max_tries,
                retry_wait: Duration::from_secs(self.retry_wait_secs),
                max_backlog: self.max_backlog,
                stale: config::stale_limit(self.stale_secs),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = PromPushApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = opts.push_config();
    if let Err(e) = config.validate() {
        tracing::error!(message = "invalid configuration", error = %e);
        process::exit(1);
    }

    let target = config.target()?;
    let http_client = Client::builder().timeout(config.timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let mut registry = prometheus_client::registry::Registry::default();
    let metrics = PushMetrics::new(&mut registry);
    let (handle, worker) = worker::channel(WorkerContext {
        client: PushClient::new(http_client),
        target: Arc::new(target),
        registry: Arc::new(MetricTypeRegistry::weather()),
        lookup: config.type_lookup,
        policy: config.policy(),
        metrics,
    });

    tracing::info!(
        message = "data will be sent to pushgateway",
        host = %config.host,
        port = %config.port,
        skip_post = config.skip_post,
    );

    let pusher = tokio::spawn(worker.run());

    if let Some(bind) = opts.bind {
        let context = Arc::new(RequestContext::new(registry));
        let app = prompush::http::metrics_router(context);
        let server = axum::Server::try_bind(&bind).unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %bind, error = %e);
            process::exit(1)
        });

        tokio::spawn(async move {
            tracing::info!(message = "server started", address = %bind);
            if let Err(e) = server.serve(app.into_make_service()).await {
                tracing::error!(message = "server error", error = %e);
            }
        });
    }

    tokio::select! {
        res = read_records(&handle) => {
            if let Err(e) = res {
                tracing::error!(message = "error reading records", error = %e);
            }
        }
        _ = sigterm() => {}
        _ = sigint() => {}
    }

    // Stop accepting new records and wait for any queued ones to be pushed
    handle.shutdown();
    pusher.await?;

    tracing::info!("prompush shutdown");

    // A blocked read of stdin can't be cancelled and would hang runtime shutdown
    process::exit(0)
}

/// Submit newline delimited JSON records from stdin until it's closed.
async fn read_records(handle: &WorkerHandle) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = match serde_json::from_str::<Record>(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(message = "skipping malformed record", error = %e);
                continue;
            }
        };

        tracing::debug!(message = "read record", num_fields = record.len(), date_time = ?record.date_time());
        if let Err(e) = handle.submit(record) {
            tracing::warn!(message = "unable to queue record", error = %e);
        }
    }

    tracing::info!("reached end of input");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
