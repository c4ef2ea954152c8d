//! HTTP middleware for Axum.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use super::metrics::{HttpLabels, HttpLabelsWithStatus, HttpMethod, Metrics};

const KNOWN_ENDPOINTS: [&str; 6] = [
    "/api/v1/txlog/submit",
    "/api/v1/txlog/read",
    "/api/v1/txlog/latest",
    "/metrics",
    "/-/healthy",
    "/-/ready",
];

/// Layer that wraps services with metrics collection.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<Metrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Service that collects HTTP metrics.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<Metrics>,
}

impl<S, ResBody> Service<Request<Body>> for MetricsService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ResBody: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = HttpMethod::from(request.method());
        let endpoint = normalize_endpoint(request.uri().path());
        let metrics = self.metrics.clone();

        metrics.http_requests_in_flight.inc();
        let start = Instant::now();
        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;
            metrics.http_requests_in_flight.dec();
            let response = result?;

            metrics
                .http_request_duration_seconds
                .get_or_create(&HttpLabels {
                    method: method.clone(),
                    endpoint: endpoint.clone(),
                })
                .observe(start.elapsed().as_secs_f64());
            metrics
                .http_requests_total
                .get_or_create(&HttpLabelsWithStatus {
                    method,
                    endpoint,
                    status: response.status().as_u16(),
                })
                .inc();

            Ok(response)
        })
    }
}

/// Collapses unknown paths into one label value to bound cardinality.
fn normalize_endpoint(path: &str) -> String {
    if KNOWN_ENDPOINTS.contains(&path) {
        path.to_string()
    } else {
        "other".to_string()
    }
}

/// Layer that wraps services with request tracing.
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

/// Service that logs HTTP requests and responses at debug level.
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S, ResBody> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ResBody: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let http_method = request.method().clone();
        let uri = request.uri().clone();
        let content_length = request
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        tracing::debug!(
            method = %http_method,
            uri = %uri,
            content_length = %content_length,
            "HTTP request received"
        );

        let start_time = Instant::now();
        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;
            tracing::debug!(
                method = %http_method,
                uri = %uri,
                status = %response.status().as_u16(),
                duration_ms = %start_time.elapsed().as_millis(),
                "HTTP request completed"
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use tower::service_fn;

    #[test]
    fn should_preserve_api_endpoints() {
        assert_eq!(normalize_endpoint("/api/v1/txlog/read"), "/api/v1/txlog/read");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
    }

    #[test]
    fn should_collapse_unknown_endpoints() {
        assert_eq!(normalize_endpoint("/api/v1/txlog/read/42"), "other");
    }

    #[tokio::test]
    async fn should_count_requests_with_metrics_middleware() {
        // given
        let metrics = Arc::new(Metrics::new());
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(200).body(Body::empty()).unwrap(),
            )
        });
        let mut service = MetricsLayer::new(metrics.clone()).layer(inner);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/txlog/latest")
            .body(Body::empty())
            .unwrap();

        // when
        let response = service.call(request).await.unwrap();

        // then
        assert_eq!(response.status().as_u16(), 200);
        let count = metrics
            .http_requests_total
            .get_or_create(&HttpLabelsWithStatus {
                method: HttpMethod::Get,
                endpoint: "/api/v1/txlog/latest".to_string(),
                status: 200,
            })
            .get();
        assert_eq!(count, 1);
        assert_eq!(metrics.http_requests_in_flight.get(), 0);
    }

    #[tokio::test]
    async fn should_pass_through_tracing_middleware() {
        // given
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(
                Response::builder().status(204).body(Body::empty()).unwrap(),
            )
        });
        let mut service = TracingLayer::new().layer(inner);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/txlog/submit")
            .header("content-length", "0")
            .body(Body::empty())
            .unwrap();

        // when
        let response = service.call(request).await.unwrap();

        // then
        assert_eq!(response.status().as_u16(), 204);
    }
}
