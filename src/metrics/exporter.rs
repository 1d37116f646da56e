use crate::metrics::collector::Aggregator;
use crate::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Serves the aggregator's counters on `GET /metrics`
pub struct PrometheusExporter {
    listener: TcpListener,
    aggregator: Arc<Aggregator>,
}

impl PrometheusExporter {
    pub async fn bind(addr: SocketAddr, aggregator: Arc<Aggregator>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            aggregator,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(aggregator: Arc<Aggregator>) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(aggregator)
    }

    /// Serve until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let addr = self.listener.local_addr().ok();
        let app = Self::router(self.aggregator);

        tokio::spawn(async move {
            if let Some(addr) = addr {
                info!("Serving Prometheus metrics on {}", addr);
            }

            let server = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });

            if let Err(e) = server.await {
                error!(error = %e, "metrics server error");
            }
        })
    }
}

async fn metrics_handler(State(aggregator): State<Arc<Aggregator>>) -> Response {
    match aggregator.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
