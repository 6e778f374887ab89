use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Author-supplied entry fields. Opaque to the core.
pub type EntryContent = Map<String, Value>;

pub type JournalResult<T> = std::result::Result<T, JournalError>;

/// Keys owned by the store rather than the author.
pub const RESERVED_ENTRY_KEYS: [&str; 4] = ["id", "created_at", "isLocal", "isGuest"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UiLanguage {
    ZhCn,
    EnUs,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Guest,
    Authenticated,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Guest => f.write_str("guest"),
            SessionMode::Authenticated => f.write_str("authenticated"),
        }
    }
}

/// Guest stores issue numeric ids; the remote service may use either form.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(untagged)]
pub enum EntryId {
    Number(i64),
    Text(String),
}

impl EntryId {
    /// Numeric only when the text is the canonical rendering of the number,
    /// so `"007"` or `"+5"` address the entry exactly as written.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => EntryId::Number(n),
            _ => EntryId::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Number(n) => write!(f, "{n}"),
            EntryId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        EntryId::Text(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        EntryId::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "isLocal", default, skip_serializing_if = "is_false")]
    pub is_local: bool,
    #[serde(rename = "isGuest", default, skip_serializing_if = "is_false")]
    pub is_guest: bool,
    #[serde(flatten)]
    pub content: EntryContent,
}

impl Entry {
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(Value::as_str)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Account object returned by registration and the profile endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token response. Services may send `token`, `access_token` or both; a
/// non-blank `token` wins.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TokenResponse")]
pub struct AuthToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<TokenResponse> for AuthToken {
    fn from(raw: TokenResponse) -> Self {
        let token = raw
            .token
            .filter(|token| !token.trim().is_empty())
            .or(raw.access_token)
            .unwrap_or_default();
        Self {
            token,
            token_type: raw.token_type,
            extra: raw.extra,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JournalError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Network(String),
    #[error("{message}")]
    Server { status: u16, message: String },
}

impl JournalError {
    pub fn message(&self) -> &str {
        match self {
            JournalError::Validation(message)
            | JournalError::Auth(message)
            | JournalError::Network(message) => message,
            JournalError::Server { message, .. } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JournalError::Validation(_) => "validation",
            JournalError::Auth(_) => "auth",
            JournalError::Network(_) => "network",
            JournalError::Server { .. } => "server",
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, JournalError::Auth(_))
    }
}

/// Mode-independent CRUD capability. The orchestrator holds exactly one
/// implementation at a time.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn create_entry(&self, content: EntryContent) -> JournalResult<Entry>;
    async fn list_entries(&self) -> JournalResult<Vec<Entry>>;
    async fn update_entry(&self, id: &EntryId, patch: EntryContent) -> JournalResult<()>;
    async fn delete_entry(&self, id: &EntryId) -> JournalResult<()>;
}

/// One method per HTTP round trip against the journal service.
#[async_trait]
pub trait JournalGateway: Send + Sync {
    async fn register(&self, username: &str, password: &str) -> JournalResult<UserAccount>;
    async fn authenticate(&self, username: &str, password: &str) -> JournalResult<AuthToken>;
    async fn fetch_profile(&self, token: &str) -> JournalResult<UserAccount>;
    async fn list_entries(&self, token: &str) -> JournalResult<Vec<Entry>>;
    async fn create_entry(&self, token: &str, content: &EntryContent) -> JournalResult<Entry>;
    async fn update_entry(
        &self,
        token: &str,
        id: &EntryId,
        patch: &EntryContent,
    ) -> JournalResult<()>;
    async fn delete_entry(&self, token: &str, id: &EntryId) -> JournalResult<()>;
}
