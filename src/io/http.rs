//! Relay HTTP server
//!
//! Routes:
//! - `GET /metrics` - current record with derived fields
//! - `POST /metrics` - partial update from a producer
//! - `OPTIONS /metrics` - CORS preflight
//! - `GET /health` - liveness
//! - `GET /stats` - relay self-metrics (Prometheus text format)
//!
//! One tokio task per connection; every handler shares the same store.

use crate::infra::config::Config;
use crate::infra::metrics::RelayMetrics;
use crate::io::prometheus::{format_relay_stats, PROMETHEUS_CONTENT_TYPE};
use crate::services::ingest::{IngestRejection, IngestService};
use crate::services::query::QueryService;
use crate::services::store::MetricStore;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Response header carrying the store revision
pub const REVISION_HEADER: &str = "X-Metrics-Revision";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server-side request limits
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    /// Deadline for reading a request body
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl ServerLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.server_request_timeout_ms()),
            max_body_bytes: config.max_body_bytes(),
        }
    }
}

/// Everything a request handler needs
pub struct AppState {
    store: Arc<MetricStore>,
    ingest: IngestService,
    query: QueryService,
    metrics: Arc<RelayMetrics>,
    limits: ServerLimits,
}

impl AppState {
    pub fn new(
        store: Arc<MetricStore>,
        metrics: Arc<RelayMetrics>,
        default_threshold: f64,
        limits: ServerLimits,
    ) -> Self {
        Self {
            ingest: IngestService::new(store.clone(), metrics.clone()),
            query: QueryService::new(store.clone(), metrics.clone(), default_threshold),
            store,
            metrics,
            limits,
        }
    }

    pub fn from_config(store: Arc<MetricStore>, metrics: Arc<RelayMetrics>, config: &Config) -> Self {
        Self::new(store, metrics, config.default_threshold(), ServerLimits::from_config(config))
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, revision: u64) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CACHE_CONTROL, "no-store")
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(REVISION_HEADER, revision)
            .body(Full::new(Bytes::from(bytes)))
            .expect("static response should not fail"),
        Err(e) => {
            error!(error = %e, "response_serialize_failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn rejection_response(status: StatusCode, error: impl Into<String>, revision: u64) -> Response<Full<Bytes>> {
    let body = IngestRejection { status: "rejected", error: error.into() };
    json_response(status, &body, revision)
}

/// Read the whole body within the size and time limits
async fn read_body<B>(body: B, limits: ServerLimits) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let limited = Limited::new(body, limits.max_body_bytes);
    match tokio::time::timeout(limits.request_timeout, limited.collect()).await {
        Err(_) => {
            warn!(timeout_ms = %limits.request_timeout.as_millis(), "ingest_body_timeout");
            Err(text_response(StatusCode::REQUEST_TIMEOUT, "request body timed out"))
        }
        Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(max_bytes = %limits.max_body_bytes, "ingest_body_too_large");
            Err(text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
        }
        Ok(Err(e)) => {
            warn!(error = %e, "ingest_body_read_failed");
            Err(text_response(StatusCode::BAD_REQUEST, "could not read request body"))
        }
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
    }
}

fn declared_length(headers: &hyper::HeaderMap) -> Option<usize> {
    headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

async fn handle_ingest<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    if declared_length(req.headers()).is_some_and(|len| len > state.limits.max_body_bytes) {
        state.metrics.record_ingest_rejected();
        warn!(max_bytes = %state.limits.max_body_bytes, "ingest_body_too_large");
        return text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
    }

    let body = match read_body(req.into_body(), state.limits).await {
        Ok(body) => body,
        Err(response) => {
            state.metrics.record_ingest_rejected();
            return response;
        }
    };

    match state.ingest.ingest(&body) {
        Ok(ack) => json_response(StatusCode::OK, &ack, ack.revision),
        Err(e) => rejection_response(StatusCode::BAD_REQUEST, e.to_string(), state.store.revision()),
    }
}

/// Route one request
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let current = state.query.current();
            debug!(revision = %current.revision, "query_served");
            json_response(StatusCode::OK, &current.record, current.revision)
        }
        (&Method::POST, "/metrics") => handle_ingest(req, &state).await,
        (&Method::OPTIONS, "/metrics") => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
            .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
            .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, REVISION_HEADER)
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/stats") => {
            let body = format_relay_stats(&state.metrics.snapshot(), state.store.revision());
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        (_, "/metrics") => {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET, POST, OPTIONS"));
            response
        }
        (method, path) => {
            state.metrics.record_not_found();
            debug!(method = %method, path = %path, "route_not_found");
            text_response(StatusCode::NOT_FOUND, "Not Found")
        }
    }
}

/// Bind the listening socket
pub async fn bind(bind_address: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((bind_address, port)).await
}

/// Accept connections until shutdown is signalled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let local_addr: SocketAddr = listener.local_addr()?;
    info!(addr = %local_addr, "relay_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();
                        let mut conn_shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move {
                                    let start = Instant::now();
                                    let response = handle_request(req, state.clone()).await;
                                    state.metrics.record_request(start.elapsed().as_micros() as u64);
                                    Ok::<_, Infallible>(response)
                                }
                            });

                            let conn = http1::Builder::new().serve_connection(io, service);
                            tokio::pin!(conn);

                            // Finish the request in flight, then close keep-alive connections
                            let result = tokio::select! {
                                result = conn.as_mut() => result,
                                _ = conn_shutdown.changed() => {
                                    conn.as_mut().graceful_shutdown();
                                    conn.await
                                }
                            };
                            if let Err(e) = result {
                                debug!(error = %e, peer = %peer, "relay_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "relay_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("relay_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind from config and serve until shutdown
pub async fn start_server(
    config: &Config,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let listener = bind(config.bind_address(), config.port()).await?;
    serve(listener, state, shutdown).await
}
