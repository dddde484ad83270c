//! Metrics and stats HTTP server.
//!
//! Serves Prometheus metrics, a liveness probe and a JSON dump of every
//! backend record.

use crate::backend::{BackendRouter, BackendSnapshot};
use crate::metrics::MetricsCollector;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Metrics and stats HTTP server.
pub struct MetricsServer {
    /// Address to bind.
    address: SocketAddr,
    /// Shared request context.
    context: Arc<ServerContext>,
}

struct ServerContext {
    /// Path for metrics endpoint.
    path: String,
    /// Metrics collector.
    collector: MetricsCollector,
    /// Source of the `/stats` snapshot.
    router: Arc<BackendRouter>,
}

/// Body of `GET /stats`.
#[derive(Debug, Serialize)]
struct Stats {
    strategy: &'static str,
    backends: Vec<BackendSnapshot>,
}

impl MetricsServer {
    /// Create a new metrics server.
    pub fn new(
        address: SocketAddr,
        path: String,
        collector: MetricsCollector,
        router: Arc<BackendRouter>,
    ) -> Self {
        Self {
            address,
            context: Arc::new(ServerContext {
                path,
                collector,
                router,
            }),
        }
    }

    /// Run the metrics server.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(self.address).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, address = %self.address, "failed to bind metrics server");
                return;
            }
        };

        info!(address = %self.address, path = %self.context.path, "metrics server started");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let context = Arc::clone(&self.context);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let context = Arc::clone(&context);
                                    async move { handle_request(req, &context).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle an incoming metrics request.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    context: &ServerContext,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(path = %req.uri().path(), method = %req.method(), "metrics request");
    Ok(route(req.method(), req.uri().path(), context))
}

fn route(method: &Method, path: &str, context: &ServerContext) -> Response<Full<Bytes>> {
    if method != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
    }

    if path == context.path {
        // Encode metrics in Prometheus text format
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, context.collector.registry()) {
            error!(error = %e, "failed to encode metrics");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n");
        }
        respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(buffer),
        )
    } else if path == "/stats" {
        let stats = Stats {
            strategy: context.router.strategy_name(),
            backends: context
                .router
                .registry()
                .snapshot()
                .iter()
                .map(|b| b.snapshot())
                .collect(),
        };
        match serde_json::to_vec_pretty(&stats) {
            Ok(body) => respond(StatusCode::OK, "application/json", Bytes::from(body)),
            Err(e) => {
                error!(error = %e, "failed to serialize stats");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize stats\n")
            }
        }
    } else if path == "/health" || path == "/healthz" {
        text(StatusCode::OK, "OK\n")
    } else if path == "/" {
        let body = format!(
            "tcplb metrics server\n\nEndpoints:\n  {} - Prometheus metrics\n  /stats - Backend records (JSON)\n  /health - Health check\n",
            context.path
        );
        text(StatusCode::OK, body)
    } else {
        text(StatusCode::NOT_FOUND, "Not found\n")
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    respond(status, "text/plain", body.into())
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::config::Strategy;
    use http_body_util::BodyExt;

    fn context() -> ServerContext {
        let registry = Arc::new(BackendRegistry::with_backends([
            ("localhost", 9081),
            ("localhost", 9082),
        ]));
        ServerContext {
            path: "/metrics".to_string(),
            collector: MetricsCollector::new(),
            router: Arc::new(BackendRouter::new(registry, &Strategy::RoundRobin)),
        }
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_metrics_server_new() {
        let ctx = context();
        let server = MetricsServer::new(
            "127.0.0.1:9090".parse().unwrap(),
            "/metrics".to_string(),
            ctx.collector,
            ctx.router,
        );
        assert_eq!(server.address, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(server.context.path, "/metrics");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let ctx = context();
        ctx.collector.backend_request("localhost:9081");

        let response = route(&Method::GET, "/metrics", &ctx);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("tcplb_backend_requests"));
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let ctx = context();
        ctx.router.registry().snapshot()[1].record_request();

        let response = route(&Method::GET, "/stats", &ctx);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["strategy"], "round_robin");
        assert_eq!(body["backends"].as_array().unwrap().len(), 2);
        assert_eq!(body["backends"][1]["address"], "localhost:9082");
        assert_eq!(body["backends"][1]["total_requests"], 1);
        assert_eq!(body["backends"][0]["healthy"], true);
    }

    #[test]
    fn test_other_routes() {
        let ctx = context();
        assert_eq!(route(&Method::GET, "/health", &ctx).status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/", &ctx).status(), StatusCode::OK);
        assert_eq!(
            route(&Method::GET, "/nope", &ctx).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            route(&Method::POST, "/metrics", &ctx).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
