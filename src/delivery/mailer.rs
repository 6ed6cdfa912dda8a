use super::Mailer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::{AsyncFileTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;

/// Drops each digest as an `.eml` file into an outbox directory for a relay
/// to pick up. In dry-run mode the message is built but only logged.
pub struct OutboxMailer {
    outbox: PathBuf,
    transport: AsyncFileTransport<Tokio1Executor>,
    dry_run: bool,
}

impl OutboxMailer {
    pub fn new(outbox: impl Into<PathBuf>, dry_run: bool) -> Self {
        let outbox = outbox.into();
        Self {
            transport: AsyncFileTransport::<Tokio1Executor>::new(&outbox),
            outbox,
            dry_run,
        }
    }
}

fn build_message(from: &str, to: &str, subject: &str, body: &str) -> Result<Message> {
    let from: Mailbox = from.parse().context("Invalid sender address")?;
    let to: Mailbox = to
        .parse()
        .with_context(|| format!("Invalid recipient address: {:?}", to))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .context("Failed to build digest message")
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = build_message(from, to, subject, body)?;

        if self.dry_run {
            tracing::info!(
                from = %from,
                to = %to,
                subject = %subject,
                bytes = body.len(),
                "DRY RUN: would send digest"
            );
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.outbox)
            .await
            .with_context(|| format!("failed to create outbox: {}", self.outbox.display()))?;
        let id = self
            .transport
            .send(message)
            .await
            .context("Failed to write digest to outbox")?;

        tracing::info!(to = %to, id = %id, outbox = %self.outbox.display(), "digest queued");
        Ok(())
    }
}
