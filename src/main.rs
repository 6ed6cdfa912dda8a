use anyhow::{Context, Result};
use clap::Parser;
use issue_digest::archive::bigquery::BigQueryExecutor;
use issue_digest::config::Config;
use issue_digest::delivery::mailer::OutboxMailer;
use issue_digest::delivery::render::TextRenderer;
use issue_digest::delivery::store::{JsonFileStore, JsonLinesRecorder};
use issue_digest::delivery::DigestMailer;
use issue_digest::github::rest::GithubRest;
use issue_digest::pipeline::DigestPipeline;
use issue_digest::subscription::Frequency;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Email digests of GitHub issue and comment activity.
#[derive(Parser)]
#[command(name = "issue-digest", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    /// Cadence to run: daily, weekly or monthly
    #[arg(long, short, env = "DIGEST_FREQUENCY")]
    frequency: Frequency,

    /// Only deliver to this user (by login)
    #[arg(long, short)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("issue_digest=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    Config::load_env_file();
    let config = Config::load(&cli.config)?;

    let executor = BigQueryExecutor::new(
        &config.archive.api_base,
        &config.archive.project_id,
        Config::bigquery_token()?,
        config.archive.page_size,
        config.archive.timeout_ms,
    );
    let github = GithubRest::new(
        &config.github.api_base,
        &config.github.user_agent,
        Config::github_token(),
    )?;

    let pipeline = DigestPipeline::new(Arc::new(executor), Arc::new(github))
        .with_row_limit(config.archive.row_limit.unwrap_or(0))
        .with_utc_offset(config.archive.utc_offset_hours);

    let mailer = DigestMailer::new(
        pipeline,
        Arc::new(JsonFileStore::new(&config.delivery.store_path)),
        Arc::new(JsonLinesRecorder::new(&config.delivery.notification_log)),
        Arc::new(TextRenderer),
        Arc::new(OutboxMailer::new(&config.delivery.outbox_dir, config.delivery.dry_run)),
        &config.delivery.sender,
    )
    .allow_partial(config.delivery.allow_partial);

    if config.delivery.dry_run {
        tracing::warn!("dry run: digests are logged, not written to the outbox");
    }

    let report = match &cli.user {
        Some(login) => mailer
            .deliver_user(login, cli.frequency)
            .await
            .with_context(|| format!("digest delivery for {} failed", login))?,
        None => mailer.deliver_all(cli.frequency).await?,
    };

    tracing::info!(
        frequency = %cli.frequency,
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "done"
    );
    Ok(())
}
