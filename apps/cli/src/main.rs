//! MediaVault command-line client.
//!
//! Server settings come from `~/.config/mediavault/config.json` and can be
//! overridden per invocation. The password is read from
//! `MEDIAVAULT_PASSWORD`.

mod config;
mod progress;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mediavault_protocol::{NaiveDate, UploadMetadata};
use mediavault_stream_proxy::{LoadingRequest, SchemeMapping, StreamingProxyLoader};
use mediavault_transfer::{ChunkSource, checksum_file};
use mediavault_transport::HttpTransport;
use mediavault_upload::{
    RecordStore, UploadOrchestrator, UploadOutcome, UploadStrategy, default_records_path,
};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::{ClientConfig, password_from_env};
use crate::progress::{format_bytes, progress_printer};
use crate::sink::FileSink;

#[derive(Parser)]
#[command(name = "mediavault", version, about = "MediaVault archive client")]
struct Cli {
    /// Server root URL, overriding the configured one
    #[arg(long, global = true)]
    server: Option<String>,

    /// Username, overriding the configured one
    #[arg(long, global = true)]
    user: Option<String>,

    /// Accept self-signed or otherwise invalid server certificates
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Chunked resumable upload followed by finalize
    Resumable,
    /// Single streamed multipart POST
    Direct,
}

impl From<StrategyArg> for UploadStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Resumable => UploadStrategy::Resumable,
            StrategyArg::Direct => UploadStrategy::DirectMultipart,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a recording with its metadata
    Upload {
        /// Path to the media file
        file: PathBuf,
        /// Recording title
        #[arg(long)]
        label: String,
        /// Organization the recording belongs to
        #[arg(long = "org")]
        org_name: String,
        /// Event type, e.g. lecture or concert
        #[arg(long)]
        event_type: String,
        /// Event date (YYYY-MM-DD)
        #[arg(long)]
        event_date: NaiveDate,
        #[arg(long)]
        participants: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Star rating, 0 to 5
        #[arg(long)]
        rating: Option<u8>,
        /// Transfer strategy, overriding the configured one
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Continue an interrupted resumable upload at this location
        #[arg(long)]
        resume: Option<String>,
    },
    /// List records uploaded to the current server
    Records,
    /// Delete a record using its stored delete token
    Delete {
        /// Record id
        id: String,
    },
    /// Stream a byte range of a media URL through the authenticated relay
    Fetch {
        /// Media URL (https://, http:// or proxy://)
        url: String,
        /// First byte to fetch
        #[arg(long, default_value = "0")]
        offset: u64,
        /// Number of bytes, 0 for everything from the offset
        #[arg(long, default_value = "0")]
        length: u64,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compare a local file's checksum with a stored record
    Verify {
        /// Local file
        file: PathBuf,
        /// Record id
        id: String,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration back to disk
        #[arg(long)]
        save: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{out}");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mediavault=debug")),
        )
        .init();
}

fn open_records() -> anyhow::Result<Arc<RecordStore>> {
    let path = default_records_path().context("cannot determine data directory")?;
    let store = RecordStore::new(path.clone())
        .with_context(|| format!("opening record store {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ClientConfig::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(user) = cli.user {
        config.username = user;
    }
    if cli.insecure {
        config.trust_all_certificates = true;
    }

    match cli.command {
        Commands::Upload {
            file,
            label,
            org_name,
            event_type,
            event_date,
            participants,
            keywords,
            location,
            notes,
            rating,
            strategy,
            resume,
        } => {
            let mut metadata = UploadMetadata::new(event_date, org_name, event_type, label);
            metadata.participants = participants;
            metadata.keywords = keywords;
            metadata.location = location;
            metadata.notes = notes;
            metadata.rating = rating;

            if let Some(strategy) = strategy {
                config.upload_strategy = strategy.into();
            }
            let transport = HttpTransport::new(config.transport_config(password_from_env())?)?;
            let orchestrator =
                UploadOrchestrator::new(transport, config.orchestrator_config(), Some(open_records()?));

            let cancel = orchestrator.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, cancelling upload");
                    cancel.cancel();
                }
            });

            let source = ChunkSource::new(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let progress = Some(progress_printer());
            let outcome = match resume {
                Some(location) => orchestrator.resume(source, &location, &metadata, progress).await?,
                None => orchestrator.upload(source, &metadata, progress).await?,
            };

            match outcome {
                UploadOutcome::Stored(record) => print_json(&json!({
                    "status": "stored",
                    "record": record,
                }))?,
                UploadOutcome::Merged(record) => print_json(&json!({
                    "status": "merged",
                    "record": record,
                }))?,
                UploadOutcome::Cancelled => {
                    print_json(&json!({ "status": "cancelled" }))?;
                    std::process::exit(130);
                }
            }
        }
        Commands::Records => {
            // Listing is local; only the host key is needed.
            let anonymous = ClientConfig {
                username: String::new(),
                ..config
            };
            let transport = HttpTransport::new(anonymous.transport_config(None)?)?;
            let records = open_records()?;
            print_json(&records.list(&transport.host_key()))?;
        }
        Commands::Delete { id } => {
            let transport = HttpTransport::new(config.transport_config(password_from_env())?)?;
            let records = open_records()?;
            let record = records
                .get(&transport.host_key(), &id)
                .with_context(|| format!("no stored record {id} for {}", transport.host_key()))?;
            let orchestrator = UploadOrchestrator::new(
                transport,
                config.orchestrator_config(),
                Some(Arc::clone(&records)),
            );
            let response = orchestrator.delete(&record).await?;
            print_json(&response)?;
        }
        Commands::Fetch {
            url,
            offset,
            length,
            output,
        } => {
            let synthetic_default = SchemeMapping::default().synthetic;
            let upstream_scheme = url
                .split_once("://")
                .map(|(scheme, _)| scheme.to_ascii_lowercase())
                .filter(|scheme| *scheme != synthetic_default)
                .unwrap_or_else(|| "https".to_string());
            let mapping = SchemeMapping::new(synthetic_default, upstream_scheme);
            let synthetic = if mapping.is_synthetic(&url) {
                url.clone()
            } else {
                mapping.to_synthetic(&url)?
            };

            if config.server_url.trim().is_empty() {
                config.server_url = mapping.to_upstream(&synthetic)?.to_string();
            }
            let transport = HttpTransport::new(config.transport_config(password_from_env())?)?;
            let loader = StreamingProxyLoader::new(transport, mapping);

            let (sink, done) = FileSink::create(&output)
                .with_context(|| format!("cannot create {}", output.display()))?;
            let sink = Arc::new(sink);
            let id = loader.start_loading(LoadingRequest::new(synthetic, offset, length, sink.clone()));

            let result = tokio::select! {
                r = done => r.context("loader dropped the request")?,
                _ = tokio::signal::ctrl_c() => {
                    loader.cancel_request(id);
                    anyhow::bail!("interrupted");
                }
            };
            result?;
            if let Some(e) = sink.take_write_error() {
                return Err(e).with_context(|| format!("writing {}", output.display()));
            }

            let info = sink.content_info();
            print_json(&json!({
                "output": output,
                "bytes": sink.bytes_written(),
                "size": format_bytes(sink.bytes_written()),
                "content_length": info.as_ref().map(|i| i.content_length),
                "content_type": info.as_ref().map(|i| i.content_type.clone()),
                "byte_range_supported": info.as_ref().map(|i| i.byte_range_supported),
            }))?;
        }
        Commands::Verify { file, id } => {
            let records = open_records()?;
            let record = records
                .hosts()
                .iter()
                .find_map(|host| records.get(host, &id))
                .with_context(|| format!("no stored record {id}"))?;
            let path = file.clone();
            let local = tokio::task::spawn_blocking(move || checksum_file(&path)).await??;
            let matches = local.eq_ignore_ascii_case(&record.checksum_sha256);
            print_json(&json!({
                "record": record.id,
                "local_sha256": local,
                "stored_sha256": record.checksum_sha256,
                "matches": matches,
            }))?;
            if !matches {
                std::process::exit(1);
            }
        }
        Commands::Config { save } => {
            if save {
                let path = config.save()?;
                tracing::info!(path = %path.display(), "configuration written");
            }
            print_json(&config)?;
        }
    }

    Ok(())
}
