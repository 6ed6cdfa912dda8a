use serde::Deserialize;

/// Subset of `GET /repos/{owner}/{repo}` the digest cares about.
#[derive(Debug, Deserialize)]
pub struct RepoResponse {
    pub full_name: String,
    #[serde(default)]
    pub open_issues: u64,
}

/// Element of `GET /repos/{owner}/{repo}/issues/comments`.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct IssueCommentResponse {
    pub id: u64,
    #[serde(default)]
    pub html_url: String,
}
