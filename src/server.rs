//! Manual trigger endpoints.
//!
//! Both answer immediately with a plain acknowledgment and run the work in
//! the background; outcomes only show up in the logs.

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{error, info};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::ingest::Ingestor;

pub const CHECK_PATH: &str = "/email/check";
pub const LEGACY_DOWNLOAD_PATH: &str = "/email/download/fastQ";

pub async fn serve(addr: SocketAddr, ingestor: Arc<Ingestor>) -> Result<()> {
    let make_service = make_service_fn(move |_conn| {
        let ingestor = Arc::clone(&ingestor);
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle_request(request, Arc::clone(&ingestor))
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Unable to bind trigger endpoints on {}", addr))?
        .serve(make_service);

    info!("Trigger endpoints listening on http://{}", addr);

    server.await.context("Trigger endpoint server stopped")?;
    Ok(())
}

pub async fn handle_request(
    request: Request<Body>,
    ingestor: Arc<Ingestor>,
) -> Result<Response<Body>, Infallible> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, CHECK_PATH) => {
            info!("Manual ingestion cycle requested");
            tokio::spawn(async move {
                if let Some(Err(e)) = ingestor.try_run_cycle().await {
                    error!("Manual ingestion cycle failed: {}", e);
                }
            });
            plain(StatusCode::OK, "Checked inbox for new emails")
        }
        (&Method::GET, LEGACY_DOWNLOAD_PATH) => {
            info!("Legacy fastQ download requested");
            tokio::spawn(async move {
                // Failures are already logged by the ingestor
                let _ = ingestor.try_download_latest().await;
            });
            plain(StatusCode::OK, "Downloaded fastQ files")
        }
        _ => plain(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
