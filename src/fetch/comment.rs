use super::{run_query, Comment, FetchError, RecordStream, PAYLOAD_COLUMN};
use crate::archive::QueryExecutor;
use crate::query::{in_list, json_extract, select, Options, SelectBuilder};
use futures_util::TryStreamExt;

const COMMENT_COLUMNS: [(&str, &str); 7] = [
    ("comment.id", "id"),
    ("issue.repository_url", "repo"),
    ("comment.body", "body"),
    ("comment.user.login", "author"),
    ("comment.created_at", "created"),
    ("comment.updated_at", "updated"),
    ("comment.html_url", "url"),
];

/// Queries `IssueCommentEvent` rows.
///
/// With no `opts.kinds` it selects newly "created" comments on issues that
/// are still open; explicit kinds drop the open-issue restriction.
#[derive(Debug, Clone, Default)]
pub struct CommentFetcher {
    pub opts: Options,
}

impl CommentFetcher {
    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    fn conditions(&self) -> Vec<String> {
        if !self.opts.conditions.is_empty() {
            return self.opts.conditions.clone();
        }

        let mut conditions = vec![in_list("type", ["IssueCommentEvent"])];
        if !self.opts.repositories.is_empty() {
            conditions.push(in_list("repo.name", &self.opts.repositories));
        }
        let action = json_extract(PAYLOAD_COLUMN, "action");
        if self.opts.kinds.is_empty() {
            conditions.push(in_list(&json_extract(PAYLOAD_COLUMN, "issue.state"), ["open"]));
            conditions.push(in_list(&action, ["created"]));
        } else {
            conditions.push(in_list(&action, &self.opts.kinds));
        }
        conditions
    }

    pub fn query(&self) -> SelectBuilder {
        select(&COMMENT_COLUMNS, Some(PAYLOAD_COLUMN))
            .from(self.opts.tables())
            .and(self.conditions())
            .order_by(self.opts.order())
            .limit(self.opts.limit())
    }

    pub async fn fetch(&self, executor: &dyn QueryExecutor) -> Result<RecordStream<Comment>, FetchError> {
        run_query(executor, &self.query(), Comment::from_row).await
    }

    pub async fn fetch_all(&self, executor: &dyn QueryExecutor) -> Result<Vec<Comment>, FetchError> {
        self.fetch(executor).await?.try_collect().await
    }
}
