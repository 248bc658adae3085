use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use fastq_mail_ingest::config::Config;
use fastq_mail_ingest::ingest::Ingestor;
use fastq_mail_ingest::mailbox::ImapConnector;
use fastq_mail_ingest::routing::{HttpFetch, HyperFetch};
use fastq_mail_ingest::{scheduler, server};

#[derive(Parser)]
#[command(name = "fastq-mail-ingest")]
#[command(about = "Polls a mailbox for fastQ attachments and files them for the sequencing pipeline")]
#[command(version = "0.1.0")]
struct Args {
    /// Run a single ingestion cycle and exit
    #[arg(long)]
    once: bool,

    /// Download the attachments of the most recent message only (deprecated) and exit
    #[arg(long, conflicts_with = "once")]
    legacy_download: bool,

    /// Do not expose the manual trigger endpoints
    #[arg(long)]
    no_server: bool,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::init();

    let config = Config::new()?;

    if args.check_config {
        println!("Configuration OK");
        println!("Mailbox: {}@{}:{}/{}", config.mail.username, config.mail.host, config.mail.port, config.mail.folder);
        println!("Password: {}", "*".repeat(config.mail.password.len().min(8)));
        println!("Services: {}", config.services.base_url);
        println!("Poll interval: {} seconds", config.poll_interval().as_secs());
        println!("Unregistered identifiers: {:?}", config.unregistered_policy);
        println!("Trigger endpoints: http://{}", config.http_bind);
        return Ok(());
    }

    info!("Starting fastQ mail ingestion");

    let http: Arc<dyn HttpFetch> = Arc::new(HyperFetch::new(config.services.timeout()));
    let connector = Arc::new(ImapConnector::new(config.mail.clone()));
    let ingestor = Arc::new(Ingestor::new(
        connector,
        http,
        &config.services.base_url,
        config.unregistered_policy,
    ));

    if args.once {
        return match ingestor.try_run_cycle().await {
            Some(Ok(report)) => {
                info!("Done: {} message(s) saved, {} file(s) written", report.saved, report.files_written);
                Ok(())
            }
            Some(Err(e)) => {
                error!("Ingestion cycle failed: {}", e);
                Err(e.into())
            }
            None => Ok(()),
        };
    }

    if args.legacy_download {
        return match ingestor.try_download_latest().await {
            Some(Err(e)) => Err(e.into()),
            _ => Ok(()),
        };
    }

    let poller = scheduler::start_polling(Arc::clone(&ingestor), config.poll_interval());

    if args.no_server {
        poller.await?;
        return Ok(());
    }

    tokio::select! {
        result = server::serve(config.http_bind, ingestor) => result?,
        result = poller => result?,
    }

    Ok(())
}
