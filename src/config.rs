use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub services: ServicesConfig,
    pub poll_interval_secs: u64,
    pub unregistered_policy: UnregisteredPolicy,
    pub http_bind: SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    pub timeout_secs: u64,
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    /// Base URL of the directory, name and run services
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What to do with a message whose identifier the directory service does not know.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnregisteredPolicy {
    /// Leave the message unseen; it is looked up again on every cycle.
    #[default]
    Retry,
    /// Mark the message seen but never deleted, so it stays in the inbox for manual inspection.
    Park,
}

impl FromStr for UnregisteredPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(UnregisteredPolicy::Retry),
            "park" => Ok(UnregisteredPolicy::Park),
            other => anyhow::bail!("Unknown UNREGISTERED_POLICY '{}' (expected 'retry' or 'park')", other),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        // Fail early with the full list of what is missing
        Self::check_required_env_vars()?;

        Ok(Config {
            mail: MailConfig {
                host: std::env::var("MAIL_HOST").context("MAIL_HOST must be set")?,
                port: std::env::var("MAIL_PORT")
                    .unwrap_or_else(|_| "993".to_string())
                    .parse()
                    .unwrap_or(993),
                username: std::env::var("MAIL_USERNAME").context("MAIL_USERNAME must be set")?,
                password: std::env::var("MAIL_PASSWORD").context("MAIL_PASSWORD must be set")?,
                folder: std::env::var("MAIL_FOLDER")
                    .unwrap_or_else(|_| "INBOX".to_string()),
                timeout_secs: std::env::var("IMAP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            services: ServicesConfig {
                base_url: std::env::var("SERVICE_BASE_URL")
                    .context("SERVICE_BASE_URL must be set")?
                    .trim_end_matches('/')
                    .to_string(),
                timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            unregistered_policy: match std::env::var("UNREGISTERED_POLICY") {
                Ok(value) => value.parse()?,
                Err(_) => UnregisteredPolicy::default(),
            },
            http_bind: std::env::var("HTTP_BIND")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .context("HTTP_BIND must be a socket address such as 0.0.0.0:8080")?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        // Zero would make tokio's interval panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    fn check_required_env_vars() -> Result<()> {
        let required_vars = [
            "MAIL_HOST",
            "MAIL_USERNAME",
            "MAIL_PASSWORD",
            "SERVICE_BASE_URL",
        ];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| std::env::var(var).is_err())
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 Either create a .env file next to the binary:\n\
                    MAIL_HOST=imap.example.org\n\
                    MAIL_USERNAME=fastq@example.org\n\
                    MAIL_PASSWORD=...\n\
                    SERVICE_BASE_URL=http://miracum.example.org/api\n\
                 \n\
                 or export them in the environment before starting.",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}
