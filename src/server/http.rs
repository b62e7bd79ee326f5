//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. One task per
//! connection; routing is a plain match on method and path.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::HeaderValue;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::db::Store;
use crate::ledger::LedgerPool;
use crate::routes;
use crate::server::TokenBucket;
use crate::types::Result;
use crate::worker::WorkerPool;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn Store>,
    pub ledger: Arc<LedgerPool>,
    pub workers: Arc<WorkerPool>,
    /// Global request budget for /api endpoints
    pub limiter: TokenBucket,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn Store>,
        ledger: Arc<LedgerPool>,
        workers: Arc<WorkerPool>,
    ) -> Self {
        let limiter = TokenBucket::new(args.tokens_per_second, args.token_max);
        Self {
            args,
            store,
            ledger,
            workers,
            limiter,
            started_at: Instant::now(),
        }
    }
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn run<F>(state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "chain-relay listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    serve(listener, state, shutdown).await
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Open connections are closed before returning, so the caller holds the
/// last reference to anything they shared through `state`.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    connections.spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
        }
    }

    let open = connections.len();
    connections.shutdown().await;
    info!("Server stopped, closed {} open connection(s)", open);
    Ok(())
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state),

        (Method::GET, "/version") => routes::version_info(),

        (_, p) if p.starts_with("/api/") => routes::handle_api_request(state, req).await,

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });
    routes::json_response(StatusCode::NOT_FOUND, &body)
}
