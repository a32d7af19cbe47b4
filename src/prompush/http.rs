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

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TEXT_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by every request for self-metrics.
#[derive(Debug)]
pub struct RequestContext {
    registry: Registry,
}

impl RequestContext {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

/// Router serving `GET /metrics` in the OpenMetrics text format.
///
/// Other methods for `/metrics` are answered with a 405 and any other path with a 404.
pub fn metrics_router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, TEXT_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{metrics_router, RequestContext};
    use crate::metrics::PushMetrics;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use prometheus_client::registry::Registry;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> axum::Router {
        let mut reg = Registry::default();
        let metrics = PushMetrics::new(&mut reg);
        metrics.record_received();
        metrics_router(Arc::new(RequestContext::new(reg)))
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let res = router().oneshot(req).await.unwrap();
        assert_eq!(StatusCode::OK, res.status());

        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("prompush_records_total 1"));
    }

    #[tokio::test]
    async fn test_post_metrics_not_allowed() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let res = router().oneshot(req).await.unwrap();
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let req = Request::builder().uri("/other").body(Body::empty()).unwrap();
        let res = router().oneshot(req).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }
}
