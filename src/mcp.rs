//! HTTP client for the ezBookkeeping MCP tool endpoint.
//!
//! The service exposes a simplified tool-invocation surface: one POST
//! of `{name, arguments}` to `{base}/call` with a bearer token. Typed
//! wrappers cover the tools the assistant uses; `add_transaction`
//! additionally normalizes the record date to UTC before submission.

use core::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::extract::TransactionRecord;
use crate::params::{AddTransactionArgs, ExchangeRatesArgs, QueryTransactionsArgs};

/// Per-call timeout for tool invocations.
const MCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire shape of a tool invocation.
#[derive(Debug, Serialize)]
struct ToolCall<T> {
    /// Tool name, e.g. `add_transaction`.
    name: &'static str,
    /// Tool-specific arguments object.
    arguments: T,
}

/// Errors from MCP tool calls.
#[derive(Debug, thiserror::Error)]
pub(crate) enum McpError {
    /// Network-level failure or timeout.
    #[error("MCP request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-2xx status from the tool endpoint.
    #[error("MCP endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body, best effort.
        body: String,
    },
    /// Transaction date that cannot be parsed as ISO-8601.
    #[error("invalid transaction date '{0}'")]
    InvalidDate(String),
}

/// Client for the remote tool endpoint.
#[derive(Debug, Clone)]
pub(crate) struct McpClient {
    /// Pooled HTTP client with [`MCP_TIMEOUT`] applied.
    http: reqwest::Client,
    /// MCP base URL without a trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
}

impl McpClient {
    /// Creates a client for the given MCP base URL and token.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub(crate) fn new(base_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(MCP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    /// Invokes a tool and returns the raw JSON response.
    ///
    /// Non-JSON 2xx bodies are wrapped as `{"response": <text>}` so the
    /// caller always gets a value to echo into the transcript.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-2xx status. No
    /// retries.
    async fn call<T: Serialize>(&self, name: &'static str, arguments: T) -> Result<Value, McpError> {
        let url = format!("{}/call", self.base_url);
        tracing::debug!(%url, tool = name, "invoking MCP tool");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&ToolCall { name, arguments })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Status { status, body });
        }

        let body = response.text().await?;
        let value = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_not_json) => serde_json::json!({ "response": body }),
        };
        tracing::debug!(tool = name, %value, "MCP response");
        Ok(value)
    }

    /// Records an expense built from an extracted transaction record.
    ///
    /// # Errors
    ///
    /// Returns an error when the record date cannot be parsed or the
    /// call itself fails.
    pub(crate) async fn add_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<Value, McpError> {
        let time = normalize_to_utc(&record.date)
            .ok_or_else(|| McpError::InvalidDate(record.date.clone()))?;
        let args = AddTransactionArgs {
            kind: "expense".to_owned(),
            time,
            category_name: record.category.clone(),
            account_name: record.account.clone(),
            amount: record.amount_text(),
        };
        self.call("add_transaction", args).await
    }

    /// Queries transactions with optional filters.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    #[allow(dead_code, reason = "tool surface not yet wired into the chat flow")]
    pub(crate) async fn query_transactions(
        &self,
        filters: QueryTransactionsArgs,
    ) -> Result<Value, McpError> {
        self.call("query_transactions", filters).await
    }

    /// Lists every account configured in the bookkeeping service.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    pub(crate) async fn query_all_accounts(&self) -> Result<Value, McpError> {
        self.call("query_all_accounts", serde_json::Map::new()).await
    }

    /// Lists every transaction category.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    #[allow(dead_code, reason = "tool surface not yet wired into the chat flow")]
    pub(crate) async fn query_all_transaction_categories(&self) -> Result<Value, McpError> {
        self.call("query_all_transaction_categories", serde_json::Map::new())
            .await
    }

    /// Lists every transaction tag.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    #[allow(dead_code, reason = "tool surface not yet wired into the chat flow")]
    pub(crate) async fn query_all_transaction_tags(&self) -> Result<Value, McpError> {
        self.call("query_all_transaction_tags", serde_json::Map::new())
            .await
    }

    /// Fetches the latest exchange rates for a comma-separated currency
    /// list.
    ///
    /// # Errors
    ///
    /// Returns an error when the call fails.
    #[allow(dead_code, reason = "tool surface not yet wired into the chat flow")]
    pub(crate) async fn query_latest_exchange_rates(
        &self,
        currencies: &str,
    ) -> Result<Value, McpError> {
        let args = ExchangeRatesArgs {
            currencies: currencies.to_owned(),
        };
        self.call("query_latest_exchange_rates", args).await
    }
}

/// Normalizes an ISO-8601 timestamp (or bare date) to UTC with a `Z`
/// suffix.
///
/// Zone-less inputs are assumed to already be UTC; explicit offsets are
/// converted; bare dates become midnight UTC. Returns `None` for
/// anything chrono cannot parse.
pub(crate) fn normalize_to_utc(input: &str) -> Option<String> {
    let utc = DateTime::parse_from_rfc3339(input)
        .map(|zoned| zoned.with_timezone(&Utc))
        .or_else(|_err| {
            NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
        .or_else(|_err| {
            NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f")
                .map(|naive| naive.and_utc())
        })
        .or_else(|_err| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        })
        .ok()?;
    Some(utc.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_docs_in_private_items,
    clippy::panic,
    reason = "test code uses expect, indexing, and panic for readability"
)]
mod tests {
    use alloc::sync::Arc;
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use super::{McpClient, McpError, ToolCall, normalize_to_utc};
    use crate::params::{AddTransactionArgs, QueryTransactionsArgs};

    /// Serves `{base}/call`, capturing the request body and answering
    /// with a fixed JSON reply.
    async fn spawn_tool_stub(reply: Value) -> (String, Arc<Mutex<Option<Value>>>) {
        let captured = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);
        let app = axum::Router::new().route(
            "/call",
            axum::routing::post(move |axum::Json(body): axum::Json<Value>| {
                let sink = Arc::clone(&sink);
                let reply = reply.clone();
                async move {
                    *sink.lock().expect("stub lock") = Some(body);
                    axum::Json(reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let _server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });
        (format!("http://{addr}"), captured)
    }

    fn captured_body(captured: &Arc<Mutex<Option<Value>>>) -> Value {
        captured
            .lock()
            .expect("captured lock")
            .clone()
            .expect("a captured request body")
    }

    #[test]
    fn zoneless_input_is_tagged_utc() {
        assert_eq!(
            normalize_to_utc("2024-01-05T10:00:00").as_deref(),
            Some("2024-01-05T10:00:00Z")
        );
    }

    #[test]
    fn explicit_offset_converts_to_utc() {
        assert_eq!(
            normalize_to_utc("2024-01-05T12:00:00+02:00").as_deref(),
            Some("2024-01-05T10:00:00Z")
        );
    }

    #[test]
    fn utc_input_keeps_z_suffix() {
        assert_eq!(
            normalize_to_utc("2024-01-05T10:00:00Z").as_deref(),
            Some("2024-01-05T10:00:00Z")
        );
    }

    #[test]
    fn bare_date_becomes_midnight_utc() {
        assert_eq!(
            normalize_to_utc("2024-01-05").as_deref(),
            Some("2024-01-05T00:00:00Z")
        );
    }

    #[test]
    fn space_separated_timestamp_accepted() {
        assert_eq!(
            normalize_to_utc("2024-01-05 10:00:00").as_deref(),
            Some("2024-01-05T10:00:00Z")
        );
    }

    #[test]
    fn fractional_seconds_survive() {
        assert_eq!(
            normalize_to_utc("2024-01-05T10:00:00.250").as_deref(),
            Some("2024-01-05T10:00:00.250Z")
        );
    }

    #[test]
    fn garbage_is_none() {
        assert!(normalize_to_utc("last tuesday").is_none());
        assert!(normalize_to_utc("").is_none());
    }

    #[test]
    fn tool_call_wire_shape() {
        let call = ToolCall {
            name: "add_transaction",
            arguments: AddTransactionArgs {
                kind: "expense".to_owned(),
                time: "2024-01-05T00:00:00Z".to_owned(),
                category_name: "Food".to_owned(),
                account_name: "Checking".to_owned(),
                amount: "20".to_owned(),
            },
        };
        let value = serde_json::to_value(&call).expect("should serialize");
        assert_eq!(value["name"], "add_transaction");
        assert_eq!(value["arguments"]["type"], "expense");
        assert_eq!(value["arguments"], json!({
            "type": "expense",
            "time": "2024-01-05T00:00:00Z",
            "category_name": "Food",
            "account_name": "Checking",
            "amount": "20"
        }));
    }

    #[tokio::test]
    async fn query_all_accounts_sends_empty_arguments() {
        let (base, captured) = spawn_tool_stub(json!([{"name": "Checking"}])).await;
        let client = McpClient::new(&base, "token").expect("client");

        let reply = client.query_all_accounts().await.expect("call");

        assert_eq!(reply, json!([{"name": "Checking"}]));
        let body = captured_body(&captured);
        assert_eq!(body["name"], "query_all_accounts");
        assert_eq!(body["arguments"], json!({}));
    }

    #[tokio::test]
    async fn catalogue_queries_use_their_tool_names() {
        let (base, captured) = spawn_tool_stub(json!([])).await;
        let client = McpClient::new(&base, "token").expect("client");

        let _categories = client
            .query_all_transaction_categories()
            .await
            .expect("categories");
        assert_eq!(
            captured_body(&captured)["name"],
            "query_all_transaction_categories"
        );

        let _tags = client.query_all_transaction_tags().await.expect("tags");
        assert_eq!(captured_body(&captured)["name"], "query_all_transaction_tags");
    }

    #[tokio::test]
    async fn query_transactions_forwards_filters() {
        let (base, captured) = spawn_tool_stub(json!({"transactions": []})).await;
        let client = McpClient::new(&base, "token").expect("client");

        let filters = QueryTransactionsArgs {
            kind: Some("expense".to_owned()),
            count: Some(10),
            ..QueryTransactionsArgs::default()
        };
        let _reply = client.query_transactions(filters).await.expect("call");

        let body = captured_body(&captured);
        assert_eq!(body["name"], "query_transactions");
        assert_eq!(body["arguments"], json!({"type": "expense", "count": 10}));
    }

    #[tokio::test]
    async fn exchange_rates_pass_the_currency_list() {
        let (base, captured) = spawn_tool_stub(json!({"rates": {}})).await;
        let client = McpClient::new(&base, "token").expect("client");

        let _reply = client
            .query_latest_exchange_rates("USD,EUR")
            .await
            .expect("call");

        let body = captured_body(&captured);
        assert_eq!(body["name"], "query_latest_exchange_rates");
        assert_eq!(body["arguments"], json!({"currencies": "USD,EUR"}));
    }

    #[tokio::test]
    async fn plain_text_reply_is_wrapped() {
        let app = axum::Router::new().route(
            "/call",
            axum::routing::post(|| async { "recorded" }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let _server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });
        let client = McpClient::new(&format!("http://{addr}"), "token").expect("client");

        let reply = client.query_all_accounts().await.expect("call");

        assert_eq!(reply, json!({"response": "recorded"}));
    }

    #[tokio::test]
    async fn error_status_surfaces_the_body() {
        let app = axum::Router::new().route(
            "/call",
            axum::routing::post(|| async {
                (axum::http::StatusCode::BAD_GATEWAY, "upstream broke")
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let _server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });
        let client = McpClient::new(&format!("http://{addr}"), "token").expect("client");

        let err = client
            .query_all_accounts()
            .await
            .expect_err("a status error");

        match err {
            McpError::Status { status, body } => {
                assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
                assert_eq!(body, "upstream broke");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_date_never_reaches_the_wire() {
        let (base, captured) = spawn_tool_stub(json!({"status": "ok"})).await;
        let client = McpClient::new(&base, "token").expect("client");
        let record = crate::extract::TransactionRecord {
            date: "sometime soonish".to_owned(),
            amount: json!(20),
            account: "Checking".to_owned(),
            category: "Food".to_owned(),
        };

        let err = client.add_transaction(&record).await.expect_err("a date error");

        assert!(matches!(err, McpError::InvalidDate(_)));
        assert!(captured.lock().expect("captured lock").is_none());
    }
}
