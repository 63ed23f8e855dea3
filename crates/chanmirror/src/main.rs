use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chanmirror_core::MirrorConfig;
use chanmirror_discord::{webhook, DiscordSession};
use chanmirror_export::{
    AttachmentRouter, DeliveryClient, ExportOutcome, Exporter, FileHost, ProgressTracker,
    RetryPolicy,
};

/// Replay a Discord channel's history into another channel through a webhook.
#[derive(Debug, Parser)]
#[command(name = "chanmirror", version)]
struct Cli {
    /// TOML config file (default: $CHANMIRROR_CONFIG, then ./chanmirror.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `export.progress_path`.
    #[arg(long)]
    progress_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chanmirror=info,chanmirror_export=info,chanmirror_discord=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // .env is optional, as are its individual keys.
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "loaded environment file");
    }

    // config: --config > CHANMIRROR_CONFIG > ./chanmirror.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("CHANMIRROR_CONFIG").map(PathBuf::from));
    let mut config = MirrorConfig::load(config_path.as_deref())?;
    if let Some(path) = cli.progress_file {
        config.export.progress_path = path;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the in-flight request");
            on_signal.cancel();
        }
    });

    let discord = DiscordSession::connect(&config.discord)
        .await
        .context("Discord login failed")?;
    let source = discord
        .text_channel(config.discord.source_channel_id, "source")
        .await?;
    let target = discord
        .text_channel(config.discord.target_channel_id, "target")
        .await?;
    let webhook_url = webhook::ensure_webhook(discord.http(), target.id, &config.discord.webhook_name)
        .await
        .context("could not obtain target webhook")?;

    // One HTTP session for webhook posts, file host uploads and CDN downloads.
    let http = reqwest::Client::builder()
        .user_agent(concat!("chanmirror/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let exporter = Exporter::new(
        discord.history(&source, config.export.page_size, http.clone()),
        DeliveryClient::new(
            http.clone(),
            webhook_url,
            RetryPolicy::from_config(&config.export),
            cancel.clone(),
        ),
        AttachmentRouter::new(
            FileHost::new(http, &config.file_host),
            config.export.inline_max_bytes,
            config.file_host.max_bytes,
        ),
        ProgressTracker::new(config.export.progress_path.clone()),
        &config.export,
        cancel,
    );

    info!("Discord connected, starting export");
    let outcome = match exporter.run().await {
        Ok(outcome) => outcome,
        Err(e) if e.is_delivery() => {
            return Err(anyhow::Error::new(e).context(format!(
                "webhook delivery failed; {} still points at the last completed batch",
                config.export.progress_path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };
    match outcome {
        ExportOutcome::Finished(summary) => {
            info!(
                batches = summary.batches,
                messages = summary.messages,
                attachments = summary.attachments,
                "export complete"
            );
        }
        ExportOutcome::Interrupted(summary) => {
            info!(
                last_saved = ?summary.last_saved,
                "export stopped early; the next run resumes after the last saved batch"
            );
        }
    }
    Ok(())
}
