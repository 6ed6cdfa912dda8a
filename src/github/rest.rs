use super::types::{IssueCommentResponse, RepoResponse};
use super::GithubApi;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};

pub struct GithubRest {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GithubRest {
    pub fn new(base_url: &str, user_agent: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let req = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl GithubApi for GithubRest {
    async fn comments_since(&self, repo: &str, since: DateTime<Utc>) -> Result<usize> {
        let since = since.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let path = format!("repos/{}/issues/comments", repo);
        tracing::debug!(repo, since = %since, "checking for recent comments");

        let resp = self
            .get(&path)
            .query(&[("since", since.as_str())])
            .send()
            .await
            .context("GET issue comments failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed ({}): {}", path, status, body);
        }

        let comments: Vec<IssueCommentResponse> = resp
            .json()
            .await
            .context("failed to parse issue comments response")?;
        Ok(comments.len())
    }

    async fn open_issue_count(&self, repo: &str) -> Result<u64> {
        let path = format!("repos/{}", repo);
        let resp = self
            .get(&path)
            .send()
            .await
            .context("GET repository failed")?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            anyhow::bail!("repository not found: {}", repo);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed ({}): {}", path, status, body);
        }

        let parsed: RepoResponse = resp
            .json()
            .await
            .context("failed to parse repository response")?;
        tracing::debug!(repo = %parsed.full_name, open_issues = parsed.open_issues, "repository refreshed");
        Ok(parsed.open_issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: Option<&str>) -> GithubRest {
        GithubRest::new(&server.uri(), "issue-digest-test", token.map(String::from)).unwrap()
    }

    #[tokio::test]
    async fn test_comments_since_counts_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/issues/comments"))
            .and(query_param("since", "2017-08-01T00:00:10Z"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "html_url": "https://github.com/org/repo/issues/1#issuecomment-1" },
                { "id": 2, "html_url": "https://github.com/org/repo/issues/2#issuecomment-2" }
            ])))
            .mount(&server)
            .await;

        let since = Utc.with_ymd_and_hms(2017, 8, 1, 0, 0, 10).unwrap();
        let count = client(&server, Some("tok"))
            .comments_since("org/repo", since)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_comments_since_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/quiet/issues/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let count = client(&server, None)
            .comments_since("org/quiet", Utc::now())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_comments_since_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/issues/comments"))
            .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .comments_since("org/repo", Utc::now())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("rate limited"));
    }

    #[tokio::test]
    async fn test_open_issue_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "org/repo",
                "open_issues": 37
            })))
            .mount(&server)
            .await;

        let count = client(&server, None).open_issue_count("org/repo").await.unwrap();
        assert_eq!(count, 37);
    }

    #[tokio::test]
    async fn test_open_issue_count_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, None).open_issue_count("org/gone").await.unwrap_err();
        assert!(err.to_string().contains("repository not found"));
    }
}
