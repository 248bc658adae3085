use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Client, Uri};
use hyper_rustls::HttpsConnector;
use log::debug;
use std::time::Duration;

use crate::error::RoutingError;

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The services answer 400 (and sometimes 404) for identifiers they do not know.
    pub fn is_unregistered(&self) -> bool {
        self.status == 400 || self.status == 404
    }
}

/// Plain GET against the directory, name and run services.
///
/// An `Err` always means the exchange did not complete; any status code the
/// server sends back is an `Ok`.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply, RoutingError>;
}

pub struct HyperFetch {
    client: Client<HttpsConnector<HttpConnector>>,
    timeout: Duration,
}

impl HyperFetch {
    pub fn new(timeout: Duration) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        HyperFetch {
            client: Client::builder().build(connector),
            timeout,
        }
    }
}

#[async_trait]
impl HttpFetch for HyperFetch {
    async fn get(&self, url: &str) -> Result<HttpReply, RoutingError> {
        let transport_error = |reason: String| RoutingError::Transport {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| transport_error(format!("invalid URL: {}", e)))?;

        let exchange = async {
            let response = self.client.get(uri).await?;
            let status = response.status().as_u16();
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>(HttpReply {
                status,
                body: body.to_vec(),
            })
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| transport_error(format!("no answer within {:?}", self.timeout)))?
            .map_err(|e| transport_error(e.to_string()))?;

        debug!("GET {} -> {}", url, reply.status);
        Ok(reply)
    }
}
