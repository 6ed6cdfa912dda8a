pub mod mailer;
pub mod render;
pub mod store;

use crate::pipeline::{DigestPipeline, EmailPayload};
use crate::subscription::{Frequency, User};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("failed to read subscription store {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed subscription store {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of users and their subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn user(&self, login: &str) -> Result<User, StoreError>;
    async fn users(&self) -> Result<Vec<User>, StoreError>;
}

/// Persists a record of every digest that went out.
#[async_trait]
pub trait NotificationRecorder: Send + Sync {
    async fn record(&self, notification: &Notification) -> Result<()>;
}

pub trait Renderer: Send + Sync {
    fn render(&self, user: &User, digest: &EmailPayload, frequency: Frequency) -> Result<String>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub repo: String,
    pub open_issues: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: u64,
    pub email: String,
    pub frequency: Frequency,
    pub repos: Vec<RepoSummary>,
    pub created_at: DateTime<Utc>,
}

/// Counts for one delivery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Digests with nothing to report.
    pub skipped: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for DeliveryReport {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Generates digests for users and hands them to the mailer.
pub struct DigestMailer {
    pipeline: DigestPipeline,
    store: Arc<dyn SubscriptionStore>,
    recorder: Arc<dyn NotificationRecorder>,
    renderer: Arc<dyn Renderer>,
    mailer: Arc<dyn Mailer>,
    sender: String,
    allow_partial: bool,
}

impl DigestMailer {
    pub fn new(
        pipeline: DigestPipeline,
        store: Arc<dyn SubscriptionStore>,
        recorder: Arc<dyn NotificationRecorder>,
        renderer: Arc<dyn Renderer>,
        mailer: Arc<dyn Mailer>,
        sender: &str,
    ) -> Self {
        Self {
            pipeline,
            store,
            recorder,
            renderer,
            mailer,
            sender: sender.to_string(),
            allow_partial: false,
        }
    }

    /// Send whatever could be fetched even when some event kinds failed.
    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    #[tracing::instrument(skip(self), fields(frequency = %frequency))]
    pub async fn deliver_user(&self, login: &str, frequency: Frequency) -> Result<DeliveryReport> {
        let user = self.store.user(login).await?;
        self.deliver(&user, frequency).await
    }

    /// Deliver to every user in the store. A failing user is counted and skipped.
    #[tracing::instrument(skip(self), fields(frequency = %frequency))]
    pub async fn deliver_all(&self, frequency: Frequency) -> Result<DeliveryReport> {
        let users = self.store.users().await?;
        let mut report = DeliveryReport::default();
        for user in &users {
            match self.deliver(user, frequency).await {
                Ok(r) => report += r,
                Err(e) => {
                    tracing::error!(user = %user.login, error = %format!("{:#}", e), "digest run failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            users = users.len(),
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "delivery run finished"
        );
        Ok(report)
    }

    async fn deliver(&self, user: &User, frequency: Frequency) -> Result<DeliveryReport> {
        let outcome = self
            .pipeline
            .generate_digests(&user.subscriptions, frequency)
            .await;
        let digests = match outcome.error {
            Some(e) if self.allow_partial => {
                tracing::warn!(user = %user.login, error = %e, "sending partial digests");
                outcome.payloads
            }
            Some(e) => return Err(e.into()),
            None => outcome.payloads,
        };

        let subject = render::subject(self.pipeline.today());
        let mut report = DeliveryReport::default();

        for digest in &digests {
            if render::is_empty(digest) {
                tracing::debug!(user = %user.login, email = %digest.email, "nothing to send");
                report.skipped += 1;
                continue;
            }

            let body = match self.renderer.render(user, digest, frequency) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(email = %digest.email, error = %e, "render failed");
                    report.failed += 1;
                    continue;
                }
            };
            if let Err(e) = self
                .mailer
                .send(&self.sender, &digest.email, &subject, &body)
                .await
            {
                tracing::error!(email = %digest.email, error = %format!("{:#}", e), "send failed");
                report.failed += 1;
                continue;
            }
            report.sent += 1;

            let notification = Notification {
                user_id: user.id,
                email: digest.email.clone(),
                frequency,
                repos: self.repo_summaries(digest).await,
                created_at: Utc::now(),
            };
            if let Err(e) = self.recorder.record(&notification).await {
                tracing::warn!(email = %digest.email, error = %format!("{:#}", e), "failed to record notification");
            }
        }

        tracing::info!(
            user = %user.login,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "user digests delivered"
        );
        Ok(report)
    }

    async fn repo_summaries(&self, digest: &EmailPayload) -> Vec<RepoSummary> {
        let github = self.pipeline.github();
        let lookups = digest.content.iter().map(|payload| async move {
            match github.open_issue_count(&payload.repo_name).await {
                Ok(open_issues) => Some(RepoSummary {
                    repo: payload.repo_name.clone(),
                    open_issues,
                }),
                Err(e) => {
                    tracing::warn!(repo = %payload.repo_name, error = %format!("{:#}", e), "open issue count unavailable");
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }
}
