//! Routing resolution: where a message's attachments go and what they are called.
pub mod http;

use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RoutingError;
use crate::message::Identifier;

pub use http::{HttpFetch, HttpReply, HyperFetch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    Resolved {
        directory: PathBuf,
        /// At least one name per attachment, extras are ignored
        file_names: Vec<String>,
    },
    Unregistered,
}

pub struct RoutingResolver {
    http: Arc<dyn HttpFetch>,
    base_url: String,
}

impl RoutingResolver {
    pub fn new(http: Arc<dyn HttpFetch>, base_url: &str) -> Self {
        RoutingResolver {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn resolve(
        &self,
        identifier: &Identifier,
        attachment_count: usize,
    ) -> Result<Routing, RoutingError> {
        let directory_url = format!("{}/fastq/directory/{}", self.base_url, identifier.url_path());
        let reply = self.http.get(&directory_url).await?;
        if reply.is_unregistered() {
            info!("'{}' is not registered with the directory service", identifier);
            return Ok(Routing::Unregistered);
        }
        let directory = parse_directory(&directory_url, &reply)?;

        // Nothing to name, and the name service may reject a zero pair count
        if attachment_count == 0 {
            debug!("'{}' has no attachments, names lookup skipped", identifier);
            return Ok(Routing::Resolved {
                directory,
                file_names: Vec::new(),
            });
        }

        // The name service counts read pairs, not files
        let pairs = attachment_count.div_ceil(2);
        let names_url = format!(
            "{}/fastq/names/{}/{}",
            self.base_url,
            pairs,
            identifier.url_path()
        );
        let reply = self.http.get(&names_url).await?;
        if reply.is_unregistered() {
            info!("'{}' is not registered with the name service", identifier);
            return Ok(Routing::Unregistered);
        }
        let file_names = parse_names(&names_url, &reply)?;

        if file_names.len() < attachment_count {
            return Err(RoutingError::NameShortfall {
                expected: attachment_count,
                got: file_names.len(),
            });
        }

        debug!(
            "'{}' resolved to {} with names {:?}",
            identifier,
            directory.display(),
            file_names
        );

        Ok(Routing::Resolved {
            directory,
            file_names,
        })
    }
}

fn parse_directory(url: &str, reply: &HttpReply) -> Result<PathBuf, RoutingError> {
    if !reply.is_success() {
        return Err(RoutingError::UnexpectedStatus {
            url: url.to_string(),
            status: reply.status,
        });
    }

    let directory = String::from_utf8_lossy(&reply.body).trim().to_string();
    if directory.is_empty() {
        return Err(RoutingError::EmptyDirectory { url: url.to_string() });
    }

    Ok(PathBuf::from(directory))
}

fn parse_names(url: &str, reply: &HttpReply) -> Result<Vec<String>, RoutingError> {
    if !reply.is_success() {
        return Err(RoutingError::UnexpectedStatus {
            url: url.to_string(),
            status: reply.status,
        });
    }

    let names: Vec<String> =
        serde_json::from_slice(&reply.body).map_err(|source| RoutingError::InvalidNames {
            url: url.to_string(),
            source,
        })?;

    // A name must not climb out of the resolved directory
    if let Some(name) = names
        .iter()
        .find(|name| Path::new(name.as_str()).file_name() != Some(std::ffi::OsStr::new(name.as_str())))
    {
        return Err(RoutingError::InvalidFileName { name: name.clone() });
    }

    Ok(names)
}
