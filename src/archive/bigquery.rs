use super::{ExecutionError, QueryExecutor, Row, RowStream};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Poll attempts for a job that is still running after the initial request.
const MAX_COMPLETION_POLLS: u32 = 10;

/// Runs legacy-SQL queries through the BigQuery REST API (`jobs.query`).
pub struct BigQueryExecutor {
    client: Client,
    base_url: String,
    project_id: String,
    token: String,
    page_size: u32,
    timeout_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    use_query_cache: bool,
    max_results: u32,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

/// Handle for reading result pages of one finished (or running) job.
struct JobHandle {
    client: Client,
    results_url: String,
    token: String,
    location: Option<String>,
    page_size: u32,
    timeout_ms: u64,
}

impl JobHandle {
    async fn page(&self, page_token: Option<&str>) -> Result<QueryResponse, ExecutionError> {
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", self.page_size.to_string()),
            ("timeoutMs", self.timeout_ms.to_string()),
        ];
        if let Some(location) = &self.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp = self
            .client
            .get(&self.results_url)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await?;
        parse_response(resp).await
    }
}

struct PageCursor {
    job: JobHandle,
    columns: Vec<String>,
    buffered: VecDeque<Row>,
    next_page: Option<String>,
}

async fn parse_response(resp: reqwest::Response) -> Result<QueryResponse, ExecutionError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ExecutionError::Api {
            status: status.as_u16(),
            body,
        });
    }
    resp.json()
        .await
        .map_err(|e| ExecutionError::Decode(e.to_string()))
}

fn cell_value(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn decode_rows(columns: &[String], rows: Vec<TableRow>) -> Result<Vec<Row>, ExecutionError> {
    rows.into_iter()
        .map(|table_row| {
            if table_row.f.len() != columns.len() {
                return Err(ExecutionError::Decode(format!(
                    "row has {} cells, schema has {} fields",
                    table_row.f.len(),
                    columns.len()
                )));
            }
            let mut row = Row::new();
            for (column, cell) in columns.iter().zip(table_row.f) {
                row.insert(column, cell_value(cell.v));
            }
            Ok(row)
        })
        .collect()
}

impl BigQueryExecutor {
    pub fn new(base_url: &str, project_id: &str, token: String, page_size: u32, timeout_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token,
            page_size,
            timeout_ms,
        }
    }

    fn queries_url(&self) -> String {
        format!("{}/projects/{}/queries", self.base_url, self.project_id)
    }
}

#[async_trait]
impl QueryExecutor for BigQueryExecutor {
    async fn execute(&self, query: &str) -> Result<RowStream, ExecutionError> {
        tracing::debug!(query, "submitting archive query");

        let request = QueryRequest {
            query,
            use_legacy_sql: true,
            use_query_cache: true,
            max_results: self.page_size,
            timeout_ms: self.timeout_ms,
        };
        let resp = self
            .client
            .post(self.queries_url())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        let mut page = match parse_response(resp).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(query, error = %e, "archive query failed");
                return Err(e);
            }
        };

        let job_ref = page
            .job_reference
            .clone()
            .ok_or_else(|| ExecutionError::Decode("response has no jobReference".to_string()))?;
        let job = JobHandle {
            client: self.client.clone(),
            results_url: format!("{}/{}", self.queries_url(), job_ref.job_id),
            token: self.token.clone(),
            location: job_ref.location.clone(),
            page_size: self.page_size,
            timeout_ms: self.timeout_ms,
        };

        let mut polls = 0;
        while !page.job_complete {
            polls += 1;
            if polls > MAX_COMPLETION_POLLS {
                return Err(ExecutionError::Incomplete(job_ref.job_id));
            }
            tracing::debug!(job_id = %job_ref.job_id, polls, "waiting for query job");
            page = job.page(None).await?;
        }

        let columns: Vec<String> = page
            .schema
            .map(|s| s.fields.into_iter().map(|f| f.name).collect())
            .unwrap_or_default();
        let buffered = decode_rows(&columns, page.rows)?;

        let cursor = PageCursor {
            job,
            columns,
            buffered: buffered.into(),
            next_page: page.page_token.filter(|t| !t.is_empty()),
        };

        let rows = stream::try_unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(row) = cursor.buffered.pop_front() {
                    return Ok::<_, ExecutionError>(Some((row, cursor)));
                }
                let Some(token) = cursor.next_page.take() else {
                    return Ok(None);
                };
                let page = cursor.job.page(Some(token.as_str())).await?;
                cursor.buffered.extend(decode_rows(&cursor.columns, page.rows)?);
                cursor.next_page = page.page_token.filter(|t| !t.is_empty());
            }
        });

        Ok(rows.boxed())
    }
}
