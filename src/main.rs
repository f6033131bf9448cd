use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tunnel_upload::config::Config;
use tunnel_upload::core::{
    ChannelObserver, SourceFile, TransportAdapter, UploadEvent, UploadOutcome, UploadSession,
};
use tunnel_upload::media::{ImageFrameSampler, MediaProcessor};
use tunnel_upload::transport::{HttpTransport, MemoryTransport};
use tunnel_upload::utils::{format_bytes, format_duration, format_speed};
use tunnel_upload::validation::FileValidator;

/// Upload one file in resumable chunks
#[derive(Parser)]
#[command(name = "tunnel-upload")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Upload into an in-memory store instead of the configured endpoint
    #[arg(long)]
    dry_run: bool,

    /// Use chunked transfer even for small files
    #[arg(long)]
    chunked: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let transport: Arc<dyn TransportAdapter> = if cli.dry_run {
        tracing::info!("Dry run, uploading to memory");
        Arc::new(MemoryTransport::new().with_latency(Duration::from_millis(20)))
    } else {
        Arc::new(HttpTransport::new(&config.endpoint, config.token.clone())?)
    };

    let (observer, mut events) = ChannelObserver::new();
    let sampler = Arc::new(ImageFrameSampler::new());
    let processor = MediaProcessor::new(sampler, config.thumbnail.clone());
    let session = UploadSession::builder(transport)
        .config(config.upload.clone())
        .media_processor(processor)
        .validator(FileValidator::new(config.validation.clone()))
        .observer(Arc::new(observer))
        .build()?;

    let source = SourceFile::open(&config.file_path)
        .await
        .with_context(|| format!("Failed to open {}", config.file_path.display()))?;
    let descriptor = session.select_file(source, &[]).await?;
    tracing::info!(
        file = %descriptor.name,
        size = %format_bytes(descriptor.size_bytes),
        mime_type = %descriptor.mime_type,
        preview = descriptor.preview.is_some(),
        "Selected file"
    );

    let started = Instant::now();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::Progress { percent, descriptor } => {
                    let sent = descriptor.size_bytes * percent as u64 / 100;
                    tracing::info!(
                        "{}% ({} / {}, {})",
                        percent,
                        format_bytes(sent),
                        format_bytes(descriptor.size_bytes),
                        format_speed(sent, started.elapsed())
                    );
                }
                UploadEvent::StateChanged { from, to } => {
                    tracing::debug!(%from, %to, "State changed")
                }
                UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => {}
            }
        }
    });

    let canceller = session.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling upload");
            if let Err(err) = canceller.cancel() {
                tracing::error!(error = %err, "Cancel failed");
            }
        }
    });

    let outcome = session.start(cli.chunked).await;
    interrupt.abort();
    let _ = interrupt.await;
    drop(session);
    let _ = reporter.await;

    match outcome? {
        UploadOutcome::Completed(remote) => {
            tracing::info!(
                file_id = %remote.file_id,
                url = %remote.file_url,
                elapsed = %format_duration(started.elapsed()),
                "Upload finished"
            );
            Ok(())
        }
        UploadOutcome::Cancelled => bail!("Upload cancelled"),
    }
}
