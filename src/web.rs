//! HTTP surface: the chat page and the form handler.
//!
//! `GET /` renders the caller's transcript; `POST /chat` appends the
//! submitted message, obtains the assistant reply, submits any
//! extracted transaction to the bookkeeping service, and re-renders.
//! Responses are HTML, not a JSON API.

use alloc::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatRole, SessionStore};
use crate::config::Config;
use crate::extract::extract_transaction;
use crate::llm::{ChatClient, LlmError};
use crate::mcp::McpClient;

/// Name of the session cookie.
const SESSION_COOKIE: &str = "sid";

/// Shared application state.
#[derive(Debug)]
pub(crate) struct AppState {
    /// Chat-completion client.
    llm: ChatClient,
    /// Bookkeeping tool client.
    mcp: McpClient,
    /// Per-session transcripts.
    sessions: SessionStore,
}

impl AppState {
    /// Builds the state and its HTTP clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub(crate) fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            llm: ChatClient::new(&config.api_base, &config.api_key, &config.model)?,
            mcp: McpClient::new(&config.mcp_url, &config.mcp_token)?,
            sessions: SessionStore::default(),
        })
    }

    /// The bookkeeping tool client (used for the startup probe).
    pub(crate) const fn mcp(&self) -> &McpClient {
        &self.mcp
    }
}

/// Builds the application router.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Form body for `POST /chat`.
#[derive(Debug, Deserialize)]
struct ChatForm {
    /// The user's transaction description.
    message: String,
}

/// Error surfaced to the browser when the completion call fails.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct AppError {
    /// Underlying completion failure.
    #[from]
    source: LlmError,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(err = %self.source, "chat completion failed");
        let body = format!("upstream error: {}", self.source);
        (StatusCode::BAD_GATEWAY, body).into_response()
    }
}

/// Renders the chat page for the caller's session.
#[allow(clippy::unused_async, reason = "axum handlers take async fns")]
async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = session_id(&headers).unwrap_or_else(Uuid::new_v4);
    let transcript = state.sessions.snapshot(session);
    page_response(session, &transcript)
}

/// Handles a form submission: one completion call, then a best-effort
/// transaction submission whose outcome is annotated inline.
async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Result<Response, AppError> {
    let session = session_id(&headers).unwrap_or_else(Uuid::new_v4);

    state.sessions.push(session, ChatMessage::user(form.message));
    let history = state.sessions.snapshot(session);

    let mut reply = state.llm.complete(&history).await?;

    if let Some(record) = extract_transaction(&reply) {
        match state.mcp.add_transaction(&record).await {
            Ok(result) => reply = format!("{reply}\n\n[MCP: {result}]"),
            Err(err) => {
                // The chat response must survive a failed submission.
                tracing::warn!(%err, "transaction submission failed");
                reply = format!("{reply}\n\n[MCP error: {err}]");
            }
        }
    }

    state.sessions.push(session, ChatMessage::assistant(reply));
    let transcript = state.sessions.snapshot(session);
    Ok(page_response(session, &transcript))
}

/// Extracts the session ID from the `sid` cookie, if present and valid.
fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE)
            .then(|| Uuid::parse_str(value).ok())
            .flatten()
    })
}

/// Renders the page and (re)issues the session cookie.
fn page_response(session: Uuid, transcript: &[ChatMessage]) -> Response {
    let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly");
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Html(render_page(transcript)),
    )
        .into_response()
}

/// Renders the transcript and input form as a complete HTML page.
fn render_page(transcript: &[ChatMessage]) -> String {
    let messages: String = transcript.iter().map(render_message).collect();
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>Bookkeeping Assistant</title>\n\
         <style>\n\
         body {{ font-family: sans-serif; max-width: 42rem; margin: 2rem auto; }}\n\
         .message {{ margin: 0.5rem 0; padding: 0.5rem; border-radius: 0.5rem; }}\n\
         .message.user {{ background: #e8f0fe; }}\n\
         .message.assistant {{ background: #f1f3f4; }}\n\
         .role {{ font-weight: bold; margin-right: 0.5rem; }}\n\
         form {{ display: flex; gap: 0.5rem; margin-top: 1rem; }}\n\
         input[name=message] {{ flex: 1; }}\n\
         </style>\n\
         </head>\n\
         <body>\n\
         <h1>Bookkeeping Assistant</h1>\n\
         <div id=\"transcript\">\n\
         {messages}\
         </div>\n\
         <form method=\"post\" action=\"/chat\">\n\
         <input name=\"message\" placeholder=\"Describe a transaction...\" autofocus>\n\
         <button type=\"submit\">Send</button>\n\
         </form>\n\
         </body>\n\
         </html>\n"
    )
}

/// Renders one transcript entry.
fn render_message(message: &ChatMessage) -> String {
    let role = match message.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    let content = escape_html(&message.content).replace('\n', "<br>");
    format!(
        "<div class=\"message {role}\"><span class=\"role\">{role}</span>{content}</div>\n"
    )
}

/// Escapes HTML metacharacters in untrusted text.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and literal indexing for readability"
)]
mod tests {
    use alloc::sync::Arc;
    use std::sync::Mutex;

    use axum::Router;
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::{AppState, escape_html, render_page, router};
    use crate::chat::ChatMessage;
    use crate::config::Config;

    /// Builds a config pointing at the given stub endpoints.
    fn test_config(api_base: &str, mcp_url: &str) -> Config {
        Config {
            api_base: api_base.to_owned(),
            api_key: "sk-test".to_owned(),
            model: "deepseek-chat".to_owned(),
            mcp_url: mcp_url.to_owned(),
            mcp_token: "token".to_owned(),
            bind_addr: "127.0.0.1:0".to_owned(),
        }
    }

    /// Spawns a stub server for the given router, returning its base URL.
    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub addr");
        let _server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });
        format!("http://{addr}")
    }

    /// Stub LLM answering every completion with a fixed reply.
    async fn spawn_llm_stub(reply: &str) -> String {
        let reply = reply.to_owned();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let reply = reply.clone();
                async move {
                    axum::Json(json!({
                        "choices": [{"message": {"role": "assistant", "content": reply}}]
                    }))
                }
            }),
        );
        spawn_stub(app).await
    }

    /// Stub LLM failing every completion with a 500.
    async fn spawn_failing_llm_stub() -> String {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model exploded") }),
        );
        spawn_stub(app).await
    }

    /// Stub MCP endpoint capturing the last payload posted to `/call`.
    async fn spawn_mcp_stub(captured: Arc<Mutex<Option<Value>>>, reply: Value) -> String {
        let app = Router::new().route(
            "/call",
            post(move |axum::Json(body): axum::Json<Value>| {
                let reply = reply.clone();
                *captured.lock().expect("capture lock") = Some(body);
                async move { axum::Json(reply) }
            }),
        );
        spawn_stub(app).await
    }

    /// Returns an address that refuses connections.
    async fn refused_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind probe listener");
        let addr = listener.local_addr().expect("probe addr");
        drop(listener);
        format!("http://{addr}")
    }

    /// Builds the application router over the given stub endpoints.
    fn test_app(api_base: &str, mcp_url: &str) -> Router {
        let config = test_config(api_base, mcp_url);
        let state = AppState::new(&config).expect("build state");
        router(Arc::new(state))
    }

    /// Collects a response body into a string.
    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    /// Sends `POST /chat` with a form-encoded message.
    fn chat_request(message: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(value) = cookie {
            builder = builder.header(COOKIE, value);
        }
        builder
            .body(Body::from(format!("message={message}")))
            .expect("build request")
    }

    /// Sends `GET /` with an optional session cookie.
    fn index_request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri("/");
        if let Some(value) = cookie {
            builder = builder.header(COOKIE, value);
        }
        builder.body(Body::empty()).expect("build request")
    }

    /// Extracts the `sid` cookie pair from a response.
    fn session_cookie(response: &axum::response::Response) -> String {
        let header = response
            .headers()
            .get(SET_COOKIE)
            .expect("session cookie set")
            .to_str()
            .expect("cookie is ascii");
        header
            .split(';')
            .next()
            .expect("cookie pair")
            .to_owned()
    }

    #[tokio::test]
    async fn index_renders_empty_page() {
        let app = test_app("http://127.0.0.1:1", "http://127.0.0.1:1");
        let response = app.oneshot(index_request(None)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("Bookkeeping Assistant"));
        assert!(body.contains("name=\"message\""));
        assert_eq!(body.matches("class=\"message").count(), 0);
    }

    #[tokio::test]
    async fn chat_appends_user_and_assistant_in_order() {
        let llm = spawn_llm_stub("Noted, nothing to record.").await;
        let app = test_app(&llm, "http://127.0.0.1:1");

        let response = app
            .oneshot(chat_request("hello+there", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;

        assert_eq!(body.matches("class=\"message user\"").count(), 1);
        assert_eq!(body.matches("class=\"message assistant\"").count(), 1);
        let user_at = body.find("hello there").expect("user message rendered");
        let assistant_at = body
            .find("Noted, nothing to record.")
            .expect("assistant message rendered");
        assert!(user_at < assistant_at, "user message should come first");
    }

    #[tokio::test]
    async fn transaction_flow_end_to_end() {
        let reply = r#"{"date":"2024-01-05","amount":20,"account":"Checking","category":"Food"}"#;
        let llm = spawn_llm_stub(reply).await;
        let captured = Arc::new(Mutex::new(None));
        let mcp = spawn_mcp_stub(Arc::clone(&captured), json!({"status": "ok"})).await;
        let app = test_app(&llm, &mcp);

        let response = app
            .oneshot(chat_request(
                "Spent+20+on+coffee+from+Checking%2C+category+Food",
                None,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;

        // Reply JSON and the MCP annotation are both rendered (escaped).
        assert!(body.contains(&escape_html(reply)));
        assert!(body.contains(&escape_html(r#"[MCP: {"status":"ok"}]"#)));

        let payload = captured.lock().expect("capture lock").clone().expect("payload posted");
        assert_eq!(payload["name"], "add_transaction");
        assert_eq!(payload["arguments"]["type"], "expense");
        assert_eq!(payload["arguments"]["time"], "2024-01-05T00:00:00Z");
        assert_eq!(payload["arguments"]["account_name"], "Checking");
        assert_eq!(payload["arguments"]["category_name"], "Food");
        assert_eq!(payload["arguments"]["amount"], "20");
    }

    #[tokio::test]
    async fn mcp_failure_does_not_abort_the_response() {
        let reply = r#"{"date":"2024-01-05","amount":5,"account":"Cash","category":"Snacks"}"#;
        let llm = spawn_llm_stub(reply).await;
        let mcp = refused_addr().await;
        let app = test_app(&llm, &mcp);

        let response = app
            .oneshot(chat_request("Spent+5+on+snacks", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;

        assert!(body.contains("[MCP error:"));
        assert_eq!(body.matches("class=\"message assistant\"").count(), 1);
    }

    #[tokio::test]
    async fn non_transaction_reply_skips_submission() {
        let llm = spawn_llm_stub("I can only record transactions.").await;
        let captured = Arc::new(Mutex::new(None));
        let mcp = spawn_mcp_stub(Arc::clone(&captured), json!({"status": "ok"})).await;
        let app = test_app(&llm, &mcp);

        let response = app
            .oneshot(chat_request("what+is+the+weather", None))
            .await
            .expect("response");
        let body = body_text(response).await;

        assert!(!body.contains("[MCP"));
        assert!(captured.lock().expect("capture lock").is_none());
    }

    #[tokio::test]
    async fn llm_failure_is_a_bad_gateway() {
        let llm = spawn_failing_llm_stub().await;
        let app = test_app(&llm, "http://127.0.0.1:1");

        let response = app
            .oneshot(chat_request("hi", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn get_is_idempotent_for_a_session() {
        let llm = spawn_llm_stub("Nothing to record.").await;
        let app = test_app(&llm, "http://127.0.0.1:1");

        let posted = app
            .clone()
            .oneshot(chat_request("hello", None))
            .await
            .expect("response");
        let cookie = session_cookie(&posted);

        let first = app
            .clone()
            .oneshot(index_request(Some(&cookie)))
            .await
            .expect("response");
        let second = app
            .clone()
            .oneshot(index_request(Some(&cookie)))
            .await
            .expect("response");
        let first_body = body_text(first).await;
        let second_body = body_text(second).await;
        assert_eq!(first_body, second_body);
        assert_eq!(first_body.matches("class=\"message user\"").count(), 1);
    }

    #[tokio::test]
    async fn sessions_do_not_leak_between_cookies() {
        let llm = spawn_llm_stub("Nothing to record.").await;
        let app = test_app(&llm, "http://127.0.0.1:1");

        let posted = app
            .clone()
            .oneshot(chat_request("alice+secret", None))
            .await
            .expect("response");
        let _alice_cookie = session_cookie(&posted);

        // A fresh visitor sees an empty transcript.
        let fresh = app
            .clone()
            .oneshot(index_request(None))
            .await
            .expect("response");
        let body = body_text(fresh).await;
        assert!(!body.contains("alice secret"));
        assert_eq!(body.matches("class=\"message").count(), 0);
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("&")</script>"#),
            "&lt;script&gt;alert(&quot;&amp;&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn render_page_escapes_message_content() {
        let transcript = vec![ChatMessage::user("<b>bold</b> & co".to_owned())];
        let page = render_page(&transcript);
        assert!(page.contains("&lt;b&gt;bold&lt;/b&gt; &amp; co"));
        assert!(!page.contains("<b>bold</b>"));
    }
}
