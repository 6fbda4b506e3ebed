//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use chrono::{SecondsFormat, Utc};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{rate_limit, RateLimitState};
use crate::error::{Result, YarlError};

/// HTTP server exposing rate limited routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Middleware state shared by all routes
    state: RateLimitState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: RateLimitState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            YarlError::Io(e)
        })
    }
}

/// Routes served behind the rate limit middleware.
pub fn router(state: RateLimitState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .layer(from_fn_with_state(state, rate_limit))
}

async fn ping() -> String {
    format!(
        "pong - {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    )
}
