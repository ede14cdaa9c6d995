//! Snowflake warehouse source.
//!
//! Password login against the session endpoint, one synchronous query
//! request, then any extra result chunks so the whole bounded result is in
//! memory before returning. A query that outlives the request window is
//! polled through its result URL. JSON result format only.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::{DataSource, ReadRequest, SNOWFLAKE_FORMAT, SNOWFLAKE_SOURCE_NAME};
use crate::error::{Result, SnowsampleError};
use crate::frame::{ColumnInfo, QueryResult, Row, Value};
use crate::provision::{JDBC_DRIVER, SPARK_CONNECTOR};
use crate::query::{epoch_to_naive, json_to_value};

/// Default timeout for warehouse requests; large samples take a while.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Result chunks downloaded concurrently.
const CHUNK_PREFETCH: usize = 4;

/// Delay between result polls of a query still running.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Status codes of a query accepted but not finished yet.
const QUERY_IN_PROGRESS: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

const SNOWFLAKE_ACCEPT: &str = "application/snowflake";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    data: LoginData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
    session_parameters: BTreeMap<&'a str, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Payload of a successful envelope with its status code.
#[derive(Debug)]
struct Reply<T> {
    code: Option<String>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestBody<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    qrmk: Option<String>,
    #[serde(default)]
    get_result_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chunk {
    url: String,
    #[serde(default)]
    row_count: Option<u64>,
}

/// Reads from a Snowflake account over its REST session protocol.
#[derive(Debug, Clone)]
pub struct SnowflakeSource {
    client: Client,
    poll_interval: Duration,
    max_wait: Duration,
}

impl SnowflakeSource {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Uses `timeout_secs` both per request and as the longest time to wait
    /// for a running query.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SnowsampleError::query(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: timeout,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Longest time to keep polling a query that is still running.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    async fn login(&self, base: &Url, request: &ReadRequest) -> Result<String> {
        let mut url = join(base, "session/v1/login-request")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("databaseName", request.require("sfDatabase")?);
            pairs.append_pair("schemaName", request.require("sfSchema")?);
            pairs.append_pair("warehouse", request.require("sfWarehouse")?);
            if let Some(role) = request.option("sfRole").filter(|r| !r.is_empty()) {
                pairs.append_pair("roleName", role);
            }
            pairs.append_pair("requestId", &uuid::Uuid::new_v4().to_string());
        }

        let body = LoginRequest {
            data: LoginData {
                client_app_id: env!("CARGO_PKG_NAME"),
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: request.require("sfAccount")?,
                login_name: request.require("sfUser")?,
                password: request.require("sfPassword")?,
                session_parameters: [("CLIENT_SESSION_KEEP_ALIVE", serde_json::Value::Bool(false))]
                    .into_iter()
                    .collect(),
            },
        };

        debug!(%url, "Logging in");
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SnowsampleError::query(format!("Login request failed: {e}")))?;

        let login: LoginResponse = read_envelope(response, "Login").await?;
        Ok(login.token)
    }

    async fn run_query(&self, base: &Url, token: &str, sql: &str) -> Result<QueryResult> {
        let mut url = join(base, "queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());

        let body = QueryRequestBody {
            sql_text: sql,
            async_exec: false,
            sequence_id: 1,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        debug!(%sql, "Submitting query");
        let response = self
            .client
            .post(url)
            .headers(auth_headers(token)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SnowsampleError::query("Query timed out")
                } else {
                    SnowsampleError::query(format!("Query request failed: {e}"))
                }
            })?;

        let reply: Reply<QueryResponse> = read_reply(response, "Query").await?;
        let mut data = self.wait_for_result(base, token, reply).await?;

        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(SnowsampleError::query(format!(
                    "Unsupported result format '{format}'"
                )));
            }
        }
        if data.rowtype.is_empty() {
            return Err(SnowsampleError::query(format!(
                "Query {} returned no column metadata",
                data.query_id.as_deref().unwrap_or("-")
            )));
        }

        let mut rows = decode_rows(&data.rowtype, std::mem::take(&mut data.rowset))?;
        let chunks = std::mem::take(&mut data.chunks);
        if !chunks.is_empty() {
            let headers = chunk_headers(data.chunk_headers.as_ref(), data.qrmk.as_deref())?;
            let client = self.client.clone();
            // Buffered keeps chunk order while overlapping downloads.
            let raw_chunks: Vec<Vec<Vec<Option<String>>>> = stream::iter(chunks.into_iter().enumerate())
                .map(move |(idx, chunk)| {
                    let client = client.clone();
                    let headers = headers.clone();
                    async move {
                        debug!(chunk = idx, rows = ?chunk.row_count, "Downloading result chunk");
                        fetch_chunk(&client, &chunk.url, headers).await
                    }
                })
                .buffered(CHUNK_PREFETCH)
                .try_collect()
                .await?;
            for raw in raw_chunks {
                rows.extend(decode_rows(&data.rowtype, raw)?);
            }
        }

        info!(
            query_id = data.query_id.as_deref().unwrap_or("-"),
            rows = rows.len(),
            total = ?data.total,
            "Query complete"
        );

        let columns = data
            .rowtype
            .iter()
            .map(|rt| ColumnInfo::new(rt.name.clone(), rt.kind.to_uppercase()))
            .collect();
        let mut result = QueryResult::with_data(columns, rows);
        result.total_rows = data.total.map(|t| t as usize).or(result.total_rows);
        Ok(result)
    }

    /// Polls the result URL while the warehouse reports the query running.
    async fn wait_for_result(
        &self,
        base: &Url,
        token: &str,
        mut reply: Reply<QueryResponse>,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        while is_in_progress(reply.code.as_deref()) {
            let query_id = reply.data.query_id.clone().unwrap_or_else(|| "-".to_string());
            let Some(path) = reply.data.get_result_url.as_deref() else {
                return Err(SnowsampleError::query(format!(
                    "Query {query_id} is still running and no result URL was returned"
                )));
            };
            if started.elapsed() >= self.max_wait {
                return Err(SnowsampleError::query(format!(
                    "Query {query_id} still running after {:?}",
                    self.max_wait
                )));
            }
            let url = join(base, path)?;

            tokio::time::sleep(self.poll_interval).await;
            debug!(%query_id, "Polling query result");
            let response = self
                .client
                .get(url)
                .headers(auth_headers(token)?)
                .send()
                .await
                .map_err(|e| SnowsampleError::query(format!("Result poll failed: {e}")))?;
            reply = read_reply(response, "Query").await?;
        }
        Ok(reply.data)
    }

    async fn logout(&self, base: &Url, token: &str) {
        let url = match join(base, "session/logout-request") {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("delete", "true");
                url
            }
            Err(_) => return,
        };
        let headers = match auth_headers(token) {
            Ok(h) => h,
            Err(_) => return,
        };
        if let Err(e) = self.client.post(url).headers(headers).send().await {
            warn!("Failed to close warehouse session: {e}");
        }
    }
}

#[async_trait]
impl DataSource for SnowflakeSource {
    fn name(&self) -> &str {
        SNOWFLAKE_FORMAT
    }

    fn aliases(&self) -> Vec<String> {
        vec![SNOWFLAKE_SOURCE_NAME.to_string()]
    }

    fn required_products(&self) -> Vec<String> {
        vec![JDBC_DRIVER.to_string(), SPARK_CONNECTOR.to_string()]
    }

    async fn load(&self, request: &ReadRequest) -> Result<QueryResult> {
        let base = base_url(request.require("sfURL")?)?;
        let sql = request.query_text()?;

        let start = Instant::now();
        let token = self.login(&base, request).await?;
        let outcome = self.run_query(&base, &token, sql).await;
        self.logout(&base, &token).await;

        Ok(outcome?.with_execution_time(start.elapsed()))
    }
}

/// Accepts `acme.snowflakecomputing.com`, with or without scheme/port.
fn base_url(sf_url: &str) -> Result<Url> {
    let trimmed = sf_url.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&format!("{with_scheme}/"))
        .map_err(|e| SnowsampleError::query(format!("Invalid sfURL '{sf_url}': {e}")))?;
    if url.host_str().is_none() {
        return Err(SnowsampleError::query(format!("sfURL '{sf_url}' has no host")));
    }
    Ok(url)
}

async fn fetch_chunk(
    client: &Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Vec<Vec<Option<String>>>> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| SnowsampleError::query(format!("Chunk download failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SnowsampleError::query(format!(
            "Chunk download returned {status}"
        )));
    }
    let text = response
        .text()
        .await
        .map_err(|e| SnowsampleError::query(format!("Failed to read chunk: {e}")))?;
    parse_chunk(&text)
}

fn is_in_progress(code: Option<&str>) -> bool {
    matches!(code, Some(QUERY_IN_PROGRESS | QUERY_IN_PROGRESS_ASYNC))
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| SnowsampleError::internal(format!("Failed to build URL for {path}: {e}")))
}

fn auth_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(SNOWFLAKE_ACCEPT));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let auth = HeaderValue::from_str(&format!("Snowflake Token=\"{token}\""))
        .map_err(|e| SnowsampleError::query(format!("Invalid session token: {e}")))?;
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

fn chunk_headers(explicit: Option<&BTreeMap<String, String>>, qrmk: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let pairs: Vec<(String, String)> = match (explicit, qrmk) {
        (Some(map), _) if !map.is_empty() => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        (_, Some(key)) => vec![
            (
                "x-amz-server-side-encryption-customer-algorithm".to_string(),
                "AES256".to_string(),
            ),
            (
                "x-amz-server-side-encryption-customer-key".to_string(),
                key.to_string(),
            ),
        ],
        _ => Vec::new(),
    };
    for (k, v) in pairs {
        let name = HeaderName::from_bytes(k.to_ascii_lowercase().as_bytes())
            .map_err(|e| SnowsampleError::query(format!("Invalid chunk header '{k}': {e}")))?;
        let value = HeaderValue::from_str(&v)
            .map_err(|e| SnowsampleError::query(format!("Invalid chunk header value: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    read_reply(response, what).await.map(|reply| reply.data)
}

async fn read_reply<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<Reply<T>> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| SnowsampleError::query(format!("{what}: failed to read response: {e}")))?;
    parse_reply(status, &text, what)
}

fn parse_reply<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
    what: &str,
) -> Result<Reply<T>> {
    if !status.is_success() {
        return Err(SnowsampleError::query(format!("{what} failed with HTTP {status}")));
    }

    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| SnowsampleError::query(format!("{what}: malformed response: {e}")))?;

    let code = match envelope.code {
        Some(serde_json::Value::String(code)) => Some(code),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    if !envelope.success {
        let message = envelope.message.unwrap_or_else(|| "unknown error".to_string());
        return Err(match code {
            Some(code) => SnowsampleError::query(format!("{what} failed: {message} (code {code})")),
            None => SnowsampleError::query(format!("{what} failed: {message}")),
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| SnowsampleError::query(format!("{what}: response has no data")))?;
    Ok(Reply { code, data })
}

/// Chunk bodies are comma-separated row arrays without enclosing brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<Option<String>>>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let wrapped = if trimmed.starts_with("[[") || trimmed == "[]" {
        trimmed.to_string()
    } else {
        format!("[{trimmed}]")
    };
    serde_json::from_str(&wrapped)
        .map_err(|e| SnowsampleError::query(format!("Malformed result chunk: {e}")))
}

fn decode_rows(rowtype: &[RowType], rowset: Vec<Vec<Option<String>>>) -> Result<Vec<Row>> {
    rowset
        .into_iter()
        .map(|raw| {
            if raw.len() != rowtype.len() {
                return Err(SnowsampleError::query(format!(
                    "Row has {} cells, expected {}",
                    raw.len(),
                    rowtype.len()
                )));
            }
            rowtype
                .iter()
                .zip(raw.iter())
                .map(|(rt, cell)| decode_cell(rt, cell.as_deref()))
                .collect()
        })
        .collect()
}

fn decode_cell(rt: &RowType, cell: Option<&str>) -> Result<Value> {
    let Some(text) = cell else {
        return Ok(Value::Null);
    };
    let bad = || {
        SnowsampleError::query(format!(
            "Cannot decode '{text}' as {} in column {}",
            rt.kind, rt.name
        ))
    };

    let value = match rt.kind.to_ascii_lowercase().as_str() {
        "fixed" => {
            if rt.scale.unwrap_or(0) == 0 {
                match text.parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::Float(text.parse().map_err(|_| bad())?),
                }
            } else {
                Value::Float(text.parse().map_err(|_| bad())?)
            }
        }
        "real" => Value::Float(text.parse().map_err(|_| bad())?),
        "boolean" => match text {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => return Err(bad()),
        },
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => {
            // TIMESTAMP_TZ carries a trailing offset token.
            let epoch = text.split_whitespace().next().unwrap_or(text);
            let secs: f64 = epoch.parse().map_err(|_| bad())?;
            Value::Timestamp(epoch_to_naive(secs).ok_or_else(bad)?)
        }
        "date" => {
            let days: i64 = text.parse().map_err(|_| bad())?;
            let secs = days.checked_mul(86_400).ok_or_else(bad)?;
            let ts = epoch_to_naive(secs as f64).ok_or_else(bad)?;
            Value::String(ts.date().to_string())
        }
        "variant" | "object" | "array" => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => json_to_value(&json),
            Err(_) => Value::String(text.to_string()),
        },
        "binary" => Value::Bytes(hex::decode(text).map_err(|_| bad())?),
        _ => Value::String(text.to_string()),
    };
    Ok(value)
}
