pub mod rest;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Live repository lookups against the GitHub API.
#[async_trait]
pub trait GithubApi: Send + Sync {
    /// Number of issue comments posted in `repo` (`Org/Name`) since `since`.
    async fn comments_since(&self, repo: &str, since: DateTime<Utc>) -> Result<usize>;

    /// Current count of open issues in `repo`.
    async fn open_issue_count(&self, repo: &str) -> Result<u64>;
}
