use super::{run_query, FetchError, Issue, RecordStream, PAYLOAD_COLUMN};
use crate::archive::QueryExecutor;
use crate::query::{in_list, json_extract, select, Options, SelectBuilder};
use futures_util::TryStreamExt;

const ISSUE_COLUMNS: [(&str, &str); 8] = [
    ("issue.id", "id"),
    ("issue.number", "number"),
    ("issue.title", "title"),
    ("issue.user.login", "author"),
    ("issue.created_at", "created"),
    ("issue.updated_at", "updated"),
    ("issue.repository_url", "repo"),
    ("issue.html_url", "url"),
];

/// Queries `IssuesEvent` rows. Selects "opened" events unless `opts.kinds` says otherwise.
#[derive(Debug, Clone, Default)]
pub struct IssueFetcher {
    pub opts: Options,
}

impl IssueFetcher {
    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    fn conditions(&self) -> Vec<String> {
        if !self.opts.conditions.is_empty() {
            return self.opts.conditions.clone();
        }

        let mut conditions = vec![in_list("type", ["IssuesEvent"])];
        if !self.opts.repositories.is_empty() {
            conditions.push(in_list("repo.name", &self.opts.repositories));
        }
        let action = json_extract(PAYLOAD_COLUMN, "action");
        if self.opts.kinds.is_empty() {
            conditions.push(in_list(&action, ["opened"]));
        } else {
            conditions.push(in_list(&action, &self.opts.kinds));
        }
        conditions
    }

    pub fn query(&self) -> SelectBuilder {
        select(&ISSUE_COLUMNS, Some(PAYLOAD_COLUMN))
            .from(self.opts.tables())
            .and(self.conditions())
            .order_by(self.opts.order())
            .limit(self.opts.limit())
    }

    pub async fn fetch(&self, executor: &dyn QueryExecutor) -> Result<RecordStream<Issue>, FetchError> {
        run_query(executor, &self.query(), Issue::from_row).await
    }

    pub async fn fetch_all(&self, executor: &dyn QueryExecutor) -> Result<Vec<Issue>, FetchError> {
        self.fetch(executor).await?.try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Row;
    use crate::fetch::testing::StaticExecutor;

    fn opts() -> Options {
        Options {
            tables: vec!["githubarchive.day.20170801".to_string()],
            ..Options::default()
        }
    }

    #[test]
    fn test_default_query() {
        let sql = IssueFetcher::new(opts()).query().sql().unwrap();
        assert!(sql.starts_with(
            "SELECT JSON_EXTRACT_SCALAR(payload,'$.issue.id') id, JSON_EXTRACT_SCALAR(payload,'$.issue.number') number"
        ));
        assert!(sql.ends_with(
            "FROM githubarchive.day.20170801 WHERE type IN ('IssuesEvent') \
             AND JSON_EXTRACT_SCALAR(payload,'$.action') IN ('opened') \
             ORDER BY id DESC, author LIMIT 10"
        ));
    }

    #[test]
    fn test_repositories_and_kinds() {
        let fetcher = IssueFetcher::new(Options {
            repositories: vec!["a/b".to_string(), "c/d".to_string()],
            kinds: vec!["closed".to_string()],
            limit: 50,
            ..opts()
        });
        let sql = fetcher.query().sql().unwrap();
        assert!(sql.contains(
            "WHERE type IN ('IssuesEvent') AND repo.name IN ('a/b','c/d') \
             AND JSON_EXTRACT_SCALAR(payload,'$.action') IN ('closed')"
        ));
        assert!(sql.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_default_table_uses_pinned_day() {
        let fetcher = IssueFetcher::new(Options {
            today: chrono::NaiveDate::from_ymd_opt(2017, 8, 3),
            ..Options::default()
        });
        let sql = fetcher.query().sql().unwrap();
        assert!(sql.contains(" FROM githubarchive.day.20170803 WHERE "));
    }

    #[test]
    fn test_condition_override_used_verbatim() {
        let fetcher = IssueFetcher::new(Options {
            conditions: vec!["repo_name = 'x/y'".to_string(), "actor = 'bot'".to_string()],
            kinds: vec!["closed".to_string()],
            ..opts()
        });
        let sql = fetcher.query().sql().unwrap();
        assert!(sql.contains("WHERE repo_name = 'x/y' AND actor = 'bot' ORDER BY"));
        assert!(!sql.contains("IssuesEvent"));
    }

    #[tokio::test]
    async fn test_fetch_maps_rows() {
        let executor = StaticExecutor::new(vec![
            Row::new()
                .with("id", "1001")
                .with("number", "12")
                .with("title", "Crash")
                .with("author", "octocat")
                .with("created", "2017-08-01T10:00:00Z")
                .with("updated", "2017-08-01T10:00:00Z")
                .with("repo", "https://api.github.com/repos/org/repo")
                .with("url", "https://github.com/org/repo/issues/12"),
            Row::new().with("id", "oops").with("number", ""),
        ]);
        let issues = IssueFetcher::new(opts()).fetch_all(&executor).await.unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].id, 1001);
        assert_eq!(issues[0].title, "Crash");
        assert_eq!(issues[1].id, -1);
        assert_eq!(issues[1].number, -1);
        assert_eq!(executor.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_execution_error() {
        let executor = StaticExecutor::failing("quota exceeded");
        let err = IssueFetcher::new(opts()).fetch_all(&executor).await.unwrap_err();
        assert!(matches!(err, FetchError::Execution(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_fetch_without_tables_is_validation_error() {
        let executor = StaticExecutor::new(vec![]);
        let fetcher = IssueFetcher::new(Options {
            tables: vec![String::new()],
            ..Options::default()
        });
        let err = fetcher.fetch_all(&executor).await.unwrap_err();
        assert!(matches!(err, FetchError::Query(_)));
        assert!(executor.queries().is_empty());
    }
}
