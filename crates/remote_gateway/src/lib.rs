use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use core_types::{
    AuthToken, Entry, EntryContent, EntryId, JournalError, JournalGateway, JournalResult,
    UserAccount,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

const REGISTER_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";
const PROFILE_FAILED: &str = "Failed to get user profile";
const LIST_FAILED: &str = "Failed to load entries";
const CREATE_FAILED: &str = "Failed to create entry";
const UPDATE_FAILED: &str = "Failed to update entry";
const DELETE_FAILED: &str = "Failed to delete entry";

/// HTTP client for the journal service. Each call is a single round trip;
/// nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpJournalGateway {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl HttpJournalGateway {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, None)
    }

    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid api base url `{base_url}`"))?;
        if base_url.cannot_be_a_base() {
            bail!("api base url `{base_url}` cannot carry a path");
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build http client")?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!(%method, path = url.path(), "journal api request");
        self.client
            .request(method, url)
            .header(ACCEPT, "application/json")
    }

    fn authorized(
        &self,
        method: Method,
        segments: &[&str],
        token: &str,
    ) -> JournalResult<RequestBuilder> {
        Ok(self
            .request(method, segments)
            .header(AUTHORIZATION, bearer(token)?))
    }
}

#[async_trait]
impl JournalGateway for HttpJournalGateway {
    async fn register(&self, username: &str, password: &str) -> JournalResult<UserAccount> {
        let request = self
            .request(Method::POST, &["api", "register"])
            .json(&Credentials { username, password });
        let response = send(request, REGISTER_FAILED).await?;
        decode(response, REGISTER_FAILED).await
    }

    async fn authenticate(&self, username: &str, password: &str) -> JournalResult<AuthToken> {
        let request = self
            .request(Method::POST, &["token"])
            .form(&[("username", username), ("password", password)]);
        let response = send(request, LOGIN_FAILED).await?;
        let status = response.status();
        let token: AuthToken = decode(response, LOGIN_FAILED).await?;
        if token.token.trim().is_empty() {
            warn!(%status, "token endpoint answered without a token");
            return Err(JournalError::Server {
                status: status.as_u16(),
                message: format!("{LOGIN_FAILED}: response carried no token"),
            });
        }
        Ok(token)
    }

    async fn fetch_profile(&self, token: &str) -> JournalResult<UserAccount> {
        let request = self.authorized(Method::GET, &["api", "users"], token)?;
        let response = send(request, PROFILE_FAILED).await?;
        decode(response, PROFILE_FAILED).await
    }

    async fn list_entries(&self, token: &str) -> JournalResult<Vec<Entry>> {
        let request = self.authorized(Method::GET, &["api", "entries"], token)?;
        let response = send(request, LIST_FAILED).await?;
        decode(response, LIST_FAILED).await
    }

    async fn create_entry(&self, token: &str, content: &EntryContent) -> JournalResult<Entry> {
        let request = self
            .authorized(Method::POST, &["api", "entries"], token)?
            .json(content);
        let response = send(request, CREATE_FAILED).await?;
        decode(response, CREATE_FAILED).await
    }

    async fn update_entry(
        &self,
        token: &str,
        id: &EntryId,
        patch: &EntryContent,
    ) -> JournalResult<()> {
        let id = id.to_string();
        let request = self
            .authorized(Method::PUT, &["api", "entries", id.as_str()], token)?
            .json(patch);
        send(request, UPDATE_FAILED).await?;
        Ok(())
    }

    async fn delete_entry(&self, token: &str, id: &EntryId) -> JournalResult<()> {
        let id = id.to_string();
        let request = self.authorized(Method::DELETE, &["api", "entries", id.as_str()], token)?;
        send(request, DELETE_FAILED).await?;
        Ok(())
    }
}

fn bearer(token: &str) -> JournalResult<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {}", token.trim()))
        .map_err(|_| JournalError::Auth("session token is not a valid header value".to_string()))
}

async fn send(request: RequestBuilder, fallback: &str) -> JournalResult<Response> {
    let response = request.send().await.map_err(|err| {
        warn!(error = %err, "journal api unreachable");
        JournalError::Network(format!("Network error: {err}"))
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.map_err(|err| {
        warn!(%status, error = %err, "journal api error body unreadable");
        JournalError::Network(format!("Network error: {err}"))
    })?;
    let error = error_from_status(status, &body, fallback);
    warn!(%status, kind = error.kind(), "journal api rejected request");
    Err(error)
}

async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> JournalResult<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| JournalError::Network(format!("Network error: {err}")))?;
    serde_json::from_slice(&body).map_err(|err| {
        warn!(%status, error = %err, "journal api returned an undecodable body");
        JournalError::Server {
            status: status.as_u16(),
            message: format!("{fallback}: unexpected response from server"),
        }
    })
}

fn error_from_status(status: StatusCode, body: &[u8], fallback: &str) -> JournalError {
    let detail = parse_detail(body);
    let generic = || format!("{fallback} (HTTP {})", status.as_u16());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            JournalError::Auth(detail.unwrap_or_else(|| fallback.to_string()))
        }
        s if s.is_client_error() => match detail {
            Some(detail) => JournalError::Validation(detail),
            None => JournalError::Server {
                status: s.as_u16(),
                message: generic(),
            },
        },
        s => JournalError::Server {
            status: s.as_u16(),
            message: detail.unwrap_or_else(generic),
        },
    }
}

/// `detail` is either a message or a list of `{ "msg": .. }` objects.
fn parse_detail(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.as_str())
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn gateway(server: &MockServer) -> HttpJournalGateway {
        HttpJournalGateway::new(&server.uri()).expect("gateway")
    }

    fn content(value: Value) -> EntryContent {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn register_returns_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .and(body_json(json!({"username": "alice", "password": "pw123"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": 1, "username": "alice"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let account = gateway(&server)
            .register("alice", "pw123")
            .await
            .expect("register");
        assert_eq!(account.id, Some(json!(1)));
        assert_eq!(account.username, "alice");
    }

    #[tokio::test]
    async fn register_conflict_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "username taken"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .register("alice", "pw123")
            .await
            .expect_err("must fail");
        assert_eq!(err, JournalError::Validation("username taken".to_string()));
    }

    #[tokio::test]
    async fn authenticate_sends_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("username=alice&password=pw123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = gateway(&server)
            .authenticate("alice", "pw123")
            .await
            .expect("authenticate");
        assert_eq!(token.token, "tok-1");
        assert_eq!(token.token_type.as_deref(), Some("bearer"));
    }

    #[tokio::test]
    async fn authenticate_rejection_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "bad credentials"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .authenticate("alice", "wrongpw")
            .await
            .expect_err("must fail");
        assert_eq!(err, JournalError::Auth("bad credentials".to_string()));
    }

    #[tokio::test]
    async fn authenticate_without_token_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": ""})))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .authenticate("alice", "pw123")
            .await
            .expect_err("must fail");
        assert!(matches!(err, JournalError::Server { status: 200, .. }));
    }

    #[tokio::test]
    async fn authenticate_accepts_token_and_access_token_together() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1",
                "access_token": "tok-1",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let token = gateway(&server)
            .authenticate("alice", "pw123")
            .await
            .expect("authenticate");
        assert_eq!(token.token, "tok-1");
    }

    #[tokio::test]
    async fn authenticate_accepts_access_token_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-2",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let token = gateway(&server)
            .authenticate("alice", "pw123")
            .await
            .expect("authenticate");
        assert_eq!(token.token, "tok-2");
    }

    #[tokio::test]
    async fn profile_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1,
                "username": "alice",
                "created_at": "2024-01-01T00:00:00"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = gateway(&server)
            .fetch_profile("tok-1")
            .await
            .expect("profile");
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.extra.get("created_at"), Some(&json!("2024-01-01T00:00:00")));
    }

    #[tokio::test]
    async fn rejected_token_without_body_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .fetch_profile("stale")
            .await
            .expect_err("must fail");
        assert_eq!(err, JournalError::Auth(PROFILE_FAILED.to_string()));
    }

    #[tokio::test]
    async fn unparseable_server_error_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .list_entries("tok-1")
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            JournalError::Server {
                status: 500,
                message: "Failed to load entries (HTTP 500)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn undecodable_success_body_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>portal</html>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        let err = gateway
            .list_entries("tok-1")
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            JournalError::Server {
                status: 200,
                message: "Failed to load entries: unexpected response from server".to_string(),
            }
        );

        let err = gateway
            .register("alice", "pw123")
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            JournalError::Server {
                status: 201,
                message: "Registration failed: unexpected response from server".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn truncated_error_body_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\n{\"detail\"",
                )
                .await;
        });

        let gateway = HttpJournalGateway::new(&format!("http://{addr}")).expect("gateway");
        let err = gateway
            .list_entries("tok-1")
            .await
            .expect_err("must fail");
        assert!(matches!(err, JournalError::Network(_)), "unexpected: {err:?}");
    }

    #[tokio::test]
    async fn server_error_keeps_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"detail": "maintenance"})),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .register("alice", "pw123")
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            JournalError::Server {
                status: 503,
                message: "maintenance".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn entry_crud_round_trips_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/entries"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_json(json!({"text": "hello", "mood": "calm"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 42,
                "text": "hello",
                "mood": "calm",
                "created_at": "2024-05-01T10:00:00"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 42, "text": "hello", "created_at": "2024-05-01T10:00:00"},
                {"id": 41, "text": "older", "created_at": "2024-04-30T10:00:00"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/entries/42"))
            .and(body_json(json!({"mood": "happy"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/entries/42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        let created = gateway
            .create_entry("tok-1", &content(json!({"text": "hello", "mood": "calm"})))
            .await
            .expect("create");
        assert_eq!(created.id, EntryId::Number(42));
        assert_eq!(created.created_at, "2024-05-01T10:00:00");
        assert!(!created.is_guest);

        let listed = gateway.list_entries("tok-1").await.expect("list");
        let ids: Vec<_> = listed.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![EntryId::Number(42), EntryId::Number(41)]);

        gateway
            .update_entry("tok-1", &created.id, &content(json!({"mood": "happy"})))
            .await
            .expect("update");
        gateway
            .delete_entry("tok-1", &created.id)
            .await
            .expect("delete");
    }

    #[tokio::test]
    async fn validation_detail_list_is_joined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [
                    {"loc": ["body", "text"], "msg": "field required", "type": "missing"},
                    {"loc": ["body", "mood"], "msg": "invalid mood", "type": "value_error"}
                ]
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_entry("tok-1", &EntryContent::new())
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            JournalError::Validation("field required; invalid mood".to_string())
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let gateway = HttpJournalGateway::new("http://127.0.0.1:9").expect("gateway");
        let err = gateway
            .register("alice", "pw123")
            .await
            .expect_err("must fail");
        assert!(matches!(err, JournalError::Network(_)), "unexpected: {err:?}");
    }

    #[test]
    fn base_url_path_prefix_is_kept() {
        let gateway = HttpJournalGateway::new("https://example.com/journal/").expect("gateway");
        assert_eq!(
            gateway.endpoint(&["api", "entries", "7"]).as_str(),
            "https://example.com/journal/api/entries/7"
        );
        let bare = HttpJournalGateway::new("https://example.com").expect("gateway");
        assert_eq!(bare.endpoint(&["token"]).as_str(), "https://example.com/token");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpJournalGateway::new("not a url").is_err());
        assert!(HttpJournalGateway::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn unparseable_client_error_falls_back_to_server_error() {
        let err = error_from_status(StatusCode::NOT_FOUND, b"not json", "Failed to delete entry");
        assert_eq!(
            err,
            JournalError::Server {
                status: 404,
                message: "Failed to delete entry (HTTP 404)".to_string(),
            }
        );
    }
}
