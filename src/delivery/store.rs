use super::{Notification, NotificationRecorder, StoreError, SubscriptionStore};
use crate::subscription::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Users and subscriptions kept in one JSON file (an array of users).
/// The file is re-read on every call so edits apply to the next run.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<User>, StoreError> {
        let path = self.path.display().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        let mut users: Vec<User> =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse { path, source })?;

        for user in &mut users {
            for sub in &mut user.subscriptions {
                sub.user_id = user.id;
                if sub.default_email.is_empty() {
                    sub.default_email = user.email.clone();
                }
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn user(&self, login: &str) -> Result<User, StoreError> {
        self.load()
            .await?
            .into_iter()
            .find(|u| u.login == login)
            .ok_or_else(|| StoreError::UserNotFound(login.to_string()))
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        self.load().await
    }
}

/// Appends one JSON object per line for every delivered digest.
pub struct JsonLinesRecorder {
    path: PathBuf,
}

impl JsonLinesRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl NotificationRecorder for JsonLinesRecorder {
    async fn record(&self, notification: &Notification) -> Result<()> {
        let mut line = serde_json::to_string(notification).context("failed to encode notification")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open notification log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
