use crate::archive::Row;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Bodies this long (in characters) or longer are cut down for the digest.
const BODY_TRUNCATE_AT: usize = 120;
const BODY_KEEP: usize = 100;

/// An issue event as recorded in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// GitHub's global issue id; -1 when the archive value was unreadable.
    pub id: i64,
    /// Per-repository issue number.
    pub number: i64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    /// The issue's `updated_at` when the event fired; this is the event time.
    pub updated_at: DateTime<Utc>,
    /// API URL of the owning repository.
    pub repo: String,
    pub url: String,
}

impl Issue {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.int("id"),
            number: row.int("number"),
            title: row.text("title"),
            author: row.text("author"),
            created_at: row.timestamp("created"),
            updated_at: row.timestamp("updated"),
            repo: row.text("repo"),
            url: row.text("url"),
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// `Org/Name` of the owning repository.
    pub fn repo_full_name(&self) -> String {
        repo_full_name(&self.repo)
    }

    pub fn repo_name(&self) -> String {
        repo_name_from_url(&self.repo)
    }
}

/// A comment on an issue, with its body shortened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: i64,
    /// Number of the issue the comment belongs to, taken from the comment URL.
    pub issue_id: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub repo: String,
    pub url: String,
}

impl Comment {
    pub fn from_row(row: &Row) -> Self {
        let url = row.text("url");
        Self {
            id: row.int("id"),
            issue_id: issue_number_from_url(&url),
            body: truncate_body(&row.text("body")),
            author: row.text("author"),
            created_at: row.timestamp("created"),
            updated_at: row.timestamp("updated"),
            repo: row.text("repo"),
            url,
        }
    }

    pub fn repo_full_name(&self) -> String {
        repo_full_name(&self.repo)
    }
}

pub fn truncate_body(body: &str) -> String {
    if body.chars().count() < BODY_TRUNCATE_AT {
        return body.to_string();
    }
    let mut short: String = body.chars().take(BODY_KEEP).collect();
    short.push_str("...");
    short
}

fn path_segments(url: &str) -> Vec<&str> {
    let url = url.split(['#', '?']).next().unwrap_or_default();
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => url,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// `https://api.github.com/repos/Org/Name/issues/42` -> `Org/Name`
pub fn repo_full_name(url: &str) -> String {
    let segments = path_segments(url);
    if let Some(pos) = segments.iter().position(|s| *s == "repos") {
        if let (Some(owner), Some(name)) = (segments.get(pos + 1), segments.get(pos + 2)) {
            return format!("{}/{}", owner, name);
        }
    }
    match segments.as_slice() {
        [.., owner, name] => format!("{}/{}", owner, name),
        [name] => name.to_string(),
        [] => String::new(),
    }
}

/// Repository name without its owner: `.../repos/Org/Name/issues/42` -> `Name`
pub fn repo_name_from_url(url: &str) -> String {
    let full = repo_full_name(url);
    full.rsplit('/').next().unwrap_or_default().to_string()
}

/// `https://github.com/Org/Name/issues/42#issuecomment-7` -> `42`
pub fn issue_number_from_url(url: &str) -> String {
    let segments = path_segments(url);
    if let Some(pos) = segments.iter().position(|s| *s == "issues" || *s == "pull") {
        if let Some(number) = segments.get(pos + 1) {
            return number.to_string();
        }
    }
    segments.last().map(|s| s.to_string()).unwrap_or_default()
}
