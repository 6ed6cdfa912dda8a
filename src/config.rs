use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub github: GithubConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_api_base")]
    pub api_base: String,
    pub project_id: String,
    /// Rows per event kind; the fetchers' default of 10 when unset.
    pub row_limit: Option<u64>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Offset used to decide which day partition is "today".
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_archive_api_base() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}
fn default_page_size() -> u32 { 500 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_utc_offset() -> i32 { crate::query::options::ARCHIVE_UTC_OFFSET_HOURS }

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("issue-digest/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    pub sender: String,
    pub store_path: PathBuf,
    pub notification_log: PathBuf,
    #[serde(default = "default_outbox")]
    pub outbox_dir: PathBuf,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Send digests even when some event kinds failed to fetch.
    #[serde(default)]
    pub allow_partial: bool,
}

fn default_outbox() -> PathBuf {
    PathBuf::from("outbox")
}
fn default_true() -> bool { true }

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read digest config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid digest config {}", path.display()))
    }

    /// Export `.env` entries that the real environment does not already set.
    pub fn load_env_file() {
        let Ok(content) = std::fs::read_to_string(ENV_FILE) else {
            return;
        };
        for (key, value) in env_entries(&content) {
            if std::env::var_os(&key).is_none() {
                std::env::set_var(key, value);
            }
        }
    }

    /// OAuth access token for the BigQuery API. Required.
    pub fn bigquery_token() -> Result<String> {
        match std::env::var("BIGQUERY_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(sanitize_key(&token)),
            _ => anyhow::bail!("BIGQUERY_ACCESS_TOKEN is not set (environment or .env)"),
        }
    }

    /// GitHub token; requests go out anonymously without one.
    pub fn github_token() -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|t| sanitize_key(&t))
            .filter(|t| !t.is_empty())
    }
}

/// `KEY=value` pairs from a dotenv file. Comments and blank lines are
/// skipped; surrounding quotes on values are dropped.
fn env_entries(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(sanitize_key)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Tokens pasted from editors or Windows files carry CR, BOM or zero-width spaces.
fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\r' | '\u{feff}' | '\u{200b}'))
        .collect::<String>()
        .trim()
        .to_string()
}
