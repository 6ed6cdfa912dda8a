use crate::archive::QueryExecutor;
use crate::fetch::{Comment, CommentFetcher, FetchError, Issue, IssueFetcher};
use crate::github::GithubApi;
use crate::query::options::{archive_today, partition_tables, period_start, ARCHIVE_UTC_OFFSET_HOURS};
use crate::query::{in_list, json_extract, Options};
use crate::subscription::{EventKind, Frequency, Subscription};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Activity for one repository inside a digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub repo_name: String,
    pub open_issues: Vec<Issue>,
    pub closed_issues: Vec<Issue>,
    pub comments: Vec<Comment>,
    /// Nobody commented on the repository during the period.
    pub no_comment: bool,
    pub no_comment_since: Option<DateTime<Utc>>,
}

impl Payload {
    pub fn empty(repo_name: &str) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            ..Self::default()
        }
    }

    /// Nothing worth mailing for this repository.
    pub fn is_empty(&self) -> bool {
        self.open_issues.is_empty()
            && self.closed_issues.is_empty()
            && self.comments.is_empty()
            && !self.no_comment
    }
}

/// Everything one recipient address should receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailPayload {
    pub email: String,
    pub content: Vec<Payload>,
}

/// One event kind that could not be fetched.
#[derive(Debug, Error)]
#[error("Error with {}: {source}", .kind.label())]
pub struct KindFailure {
    pub kind: EventKind,
    #[source]
    pub source: FetchError,
}

/// Every sub-fetch that failed during a digest run, one line per kind.
#[derive(Debug, Error)]
#[error("{}", join_lines(.failures))]
pub struct DigestError {
    pub failures: Vec<KindFailure>,
}

fn join_lines(failures: &[KindFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Payloads that could be assembled plus whatever went wrong on the way.
#[derive(Debug, Default)]
pub struct DigestOutcome {
    pub payloads: Vec<EmailPayload>,
    pub error: Option<DigestError>,
}

impl DigestOutcome {
    pub fn is_partial(&self) -> bool {
        self.error.is_some()
    }

    /// Treat any failed sub-fetch as fatal.
    pub fn into_result(self) -> Result<Vec<EmailPayload>, DigestError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.payloads),
        }
    }
}

// ── Partitioning ─────────────────────────────────────────────────────

/// Repositories to query per event kind, for subscriptions whose preference
/// for that kind equals `frequency`. Repositories are listed once each.
pub fn partition(subscriptions: &[Subscription], frequency: Frequency) -> BTreeMap<EventKind, Vec<String>> {
    let mut repos: BTreeMap<EventKind, Vec<String>> = BTreeMap::new();
    for sub in subscriptions {
        for kind in EventKind::ALL {
            if sub.wants(kind, frequency) {
                let entry = repos.entry(kind).or_default();
                if !entry.contains(&sub.repo) {
                    entry.push(sub.repo.clone());
                }
            }
        }
    }
    repos
}

/// Archive query options for every fetchable kind in `partitions`.
pub fn build_options(
    partitions: &BTreeMap<EventKind, Vec<String>>,
    frequency: Frequency,
    today: NaiveDate,
    limit: u64,
) -> HashMap<EventKind, Options> {
    let action = json_extract("payload", "action");
    let mut options = HashMap::new();

    for (kind, repos) in partitions {
        let conditions = match kind.action() {
            Some(event) => vec![
                in_list("type", ["IssuesEvent"]),
                in_list("repo.name", repos),
                in_list(&action, [event]),
            ],
            None if *kind == EventKind::Comment => vec![
                in_list("type", ["IssueCommentEvent"]),
                in_list("repo.name", repos),
                in_list(&json_extract("payload", "issue.state"), ["open"]),
                in_list(&action, ["created"]),
            ],
            None => continue,
        };
        options.insert(
            *kind,
            Options {
                tables: partition_tables(frequency, today),
                repositories: repos.clone(),
                limit,
                conditions,
                today: Some(today),
                ..Options::default()
            },
        );
    }
    options
}

// ── Reconciliation ───────────────────────────────────────────────────

/// `open` without any issue whose id also appears in `closed`.
pub fn issue_diff(open: Vec<Issue>, closed: &[Issue]) -> Vec<Issue> {
    let closed_ids: HashSet<i64> = closed.iter().map(|i| i.id).collect();
    open.into_iter().filter(|i| !closed_ids.contains(&i.id)).collect()
}

fn latest_close_times(closed: &[Issue]) -> HashMap<i64, DateTime<Utc>> {
    let mut latest: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for issue in closed {
        let at = issue.event_time();
        latest
            .entry(issue.id)
            .and_modify(|t| *t = (*t).max(at))
            .or_insert(at);
    }
    latest
}

/// Reopen events that still stand: never closed, or reopened strictly after
/// the last close. One entry per issue, the latest reopen.
pub fn validate_reopen(reopened: Vec<Issue>, closed: &[Issue]) -> Vec<Issue> {
    let closed_at = latest_close_times(closed);

    let mut latest: Vec<Issue> = Vec::new();
    for issue in reopened {
        match latest.iter_mut().find(|i| i.id == issue.id) {
            Some(existing) if issue.event_time() > existing.event_time() => *existing = issue,
            Some(_) => {}
            None => latest.push(issue),
        }
    }

    latest
        .into_iter()
        .filter(|issue| match closed_at.get(&issue.id) {
            Some(closed) => issue.event_time() > *closed,
            None => true,
        })
        .collect()
}

/// Final open and closed lists for a digest. Closed wins over opened; a
/// later reopen wins over closed. No issue ends up in both lists.
pub fn reconcile(open: Vec<Issue>, closed: Vec<Issue>, reopened: Vec<Issue>) -> (Vec<Issue>, Vec<Issue>) {
    let mut open = issue_diff(open, &closed);
    let reopened = validate_reopen(reopened, &closed);

    let reopened_ids: HashSet<i64> = reopened.iter().map(|i| i.id).collect();
    let mut seen = HashSet::new();
    let closed: Vec<Issue> = closed
        .into_iter()
        .filter(|i| !reopened_ids.contains(&i.id) && seen.insert(i.id))
        .collect();

    for issue in reopened {
        if !open.iter().any(|i| i.id == issue.id) {
            open.push(issue);
        }
    }
    (open, closed)
}

/// Instant from which a repository counts as having no comments.
pub fn comment_check_since(frequency: Frequency, today: NaiveDate) -> DateTime<Utc> {
    let start = period_start(frequency, today).and_time(NaiveTime::MIN) + Duration::seconds(10);
    Utc.from_utc_datetime(&start)
}

// ── Grouping ─────────────────────────────────────────────────────────

fn group_by_repo(
    open: Vec<Issue>,
    closed: Vec<Issue>,
    comments: Vec<Comment>,
    quiet_repos: &[String],
    since: DateTime<Utc>,
) -> HashMap<String, Payload> {
    let mut repos: HashMap<String, Payload> = HashMap::new();

    for issue in open {
        let key = issue.repo_full_name();
        repos
            .entry(key.clone())
            .or_insert_with(|| Payload::empty(&key))
            .open_issues
            .push(issue);
    }
    for issue in closed {
        let key = issue.repo_full_name();
        repos
            .entry(key.clone())
            .or_insert_with(|| Payload::empty(&key))
            .closed_issues
            .push(issue);
    }
    for comment in comments {
        let key = comment.repo_full_name();
        repos
            .entry(key.clone())
            .or_insert_with(|| Payload::empty(&key))
            .comments
            .push(comment);
    }
    for repo in quiet_repos {
        let payload = repos.entry(repo.clone()).or_insert_with(|| Payload::empty(repo));
        payload.no_comment = true;
        payload.no_comment_since = Some(since);
    }
    repos
}

fn group_by_email(subscriptions: &[Subscription], repos: &HashMap<String, Payload>) -> Vec<EmailPayload> {
    let mut by_email: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for sub in subscriptions {
        let list = by_email.entry(sub.recipient()).or_default();
        if !list.contains(&sub.repo.as_str()) {
            list.push(&sub.repo);
        }
    }

    by_email
        .into_iter()
        .map(|(email, repo_names)| EmailPayload {
            email: email.to_string(),
            content: repo_names
                .into_iter()
                .map(|name| repos.get(name).cloned().unwrap_or_else(|| Payload::empty(name)))
                .collect(),
        })
        .collect()
}

// ── Engine ───────────────────────────────────────────────────────────

/// Turns a user's subscriptions into per-recipient digests for one cadence.
pub struct DigestPipeline {
    executor: Arc<dyn QueryExecutor>,
    github: Arc<dyn GithubApi>,
    row_limit: u64,
    utc_offset_hours: i32,
    today: Option<NaiveDate>,
}

impl DigestPipeline {
    pub fn new(executor: Arc<dyn QueryExecutor>, github: Arc<dyn GithubApi>) -> Self {
        Self {
            executor,
            github,
            row_limit: 0,
            utc_offset_hours: ARCHIVE_UTC_OFFSET_HOURS,
            today: None,
        }
    }

    /// Cap on rows per event kind; zero keeps the fetcher default.
    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    /// Pin the digest to a fixed date instead of the current archive day.
    pub fn on_date(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn github(&self) -> &Arc<dyn GithubApi> {
        &self.github
    }

    /// Date the digest window ends on.
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| archive_today(self.utc_offset_hours))
    }

    async fn fetch_issues(&self, options: Option<&Options>, kind: EventKind) -> Result<Vec<Issue>, FetchError> {
        let Some(opts) = options.filter(|o| !o.repositories.is_empty()) else {
            return Ok(Vec::new());
        };
        let issues = IssueFetcher::new(opts.clone()).fetch_all(self.executor.as_ref()).await?;
        tracing::info!(kind = ?kind, count = issues.len(), "fetched issues");
        Ok(issues)
    }

    async fn fetch_comments(&self, options: Option<&Options>) -> Result<Vec<Comment>, FetchError> {
        let Some(opts) = options.filter(|o| !o.repositories.is_empty()) else {
            return Ok(Vec::new());
        };
        let comments = CommentFetcher::new(opts.clone()).fetch_all(self.executor.as_ref()).await?;
        tracing::info!(count = comments.len(), "fetched comments");
        Ok(comments)
    }

    /// Repositories with no comments since `since`. Check failures count as activity.
    async fn quiet_repos(&self, repos: &[String], since: DateTime<Utc>) -> Vec<String> {
        let checks = repos.iter().map(|repo| async move {
            match self.github.comments_since(repo, since).await {
                Ok(0) => Some(repo.clone()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(repo = %repo, error = %format!("{:#}", e), "comment check failed");
                    None
                }
            }
        });
        join_all(checks).await.into_iter().flatten().collect()
    }

    #[tracing::instrument(skip_all, fields(frequency = %frequency, subscriptions = subscriptions.len()))]
    pub async fn generate_digests(&self, subscriptions: &[Subscription], frequency: Frequency) -> DigestOutcome {
        let today = self.today();
        let partitions = partition(subscriptions, frequency);
        tracing::debug!(?partitions, "partitioned subscriptions");
        let options = build_options(&partitions, frequency, today, self.row_limit);

        let (opened, closed, reopened, comments) = tokio::join!(
            self.fetch_issues(options.get(&EventKind::Opened), EventKind::Opened),
            self.fetch_issues(options.get(&EventKind::Closed), EventKind::Closed),
            self.fetch_issues(options.get(&EventKind::Reopened), EventKind::Reopened),
            self.fetch_comments(options.get(&EventKind::Comment)),
        );

        let mut failures = Vec::new();
        let mut collect = |kind: EventKind, result: Result<Vec<Issue>, FetchError>| match result {
            Ok(issues) => issues,
            Err(source) => {
                tracing::error!(kind = ?kind, error = %source, "issue fetch failed");
                failures.push(KindFailure { kind, source });
                Vec::new()
            }
        };
        let opened = collect(EventKind::Opened, opened);
        let closed = collect(EventKind::Closed, closed);
        let reopened = collect(EventKind::Reopened, reopened);
        let comments = match comments {
            Ok(comments) => comments,
            Err(source) => {
                tracing::error!(error = %source, "comment fetch failed");
                failures.push(KindFailure {
                    kind: EventKind::Comment,
                    source,
                });
                Vec::new()
            }
        };
        let error = (!failures.is_empty()).then_some(DigestError { failures });

        let (open, closed) = reconcile(opened, closed, reopened);

        let since = comment_check_since(frequency, today);
        let quiet = match partitions.get(&EventKind::NoComment) {
            Some(repos) => self.quiet_repos(repos, since).await,
            None => Vec::new(),
        };
        tracing::info!(repos = ?quiet, "repositories without comments");

        let total = open.len() + closed.len() + comments.len() + quiet.len();
        if total == 0 {
            if let Some(dropped) = &error {
                tracing::warn!(error = %dropped, "no activity to report; dropping fetch failures");
            } else {
                tracing::info!("no activity to report");
            }
            return DigestOutcome::default();
        }

        let repos = group_by_repo(open, closed, comments, &quiet, since);
        let payloads = group_by_email(subscriptions, &repos);
        tracing::info!(recipients = payloads.len(), "digests assembled");

        DigestOutcome { payloads, error }
    }
}
