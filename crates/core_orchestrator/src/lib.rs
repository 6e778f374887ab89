use std::sync::Arc;

use async_trait::async_trait;
use core_types::{
    AuthToken, Entry, EntryContent, EntryId, EntryStore, JournalError, JournalGateway,
    JournalResult, SessionMode, UserAccount,
};
use guest_store::GuestEntryStore;
use parking_lot::RwLock;
use secrets::SessionTokenStore;
use tracing::{info, warn};

pub const MISSING_FIELDS: &str = "Please fill in all fields";
pub const NOT_SIGNED_IN: &str = "Not signed in";

/// Authenticated-mode entry capability: the gateway with the session token
/// bound in.
pub struct RemoteEntryStore {
    gateway: Arc<dyn JournalGateway>,
    token: String,
}

impl RemoteEntryStore {
    pub fn new(gateway: Arc<dyn JournalGateway>, token: impl Into<String>) -> Self {
        Self {
            gateway,
            token: token.into(),
        }
    }
}

#[async_trait]
impl EntryStore for RemoteEntryStore {
    async fn create_entry(&self, content: EntryContent) -> JournalResult<Entry> {
        self.gateway.create_entry(&self.token, &content).await
    }

    async fn list_entries(&self) -> JournalResult<Vec<Entry>> {
        self.gateway.list_entries(&self.token).await
    }

    async fn update_entry(&self, id: &EntryId, patch: EntryContent) -> JournalResult<()> {
        self.gateway.update_entry(&self.token, id, &patch).await
    }

    async fn delete_entry(&self, id: &EntryId) -> JournalResult<()> {
        self.gateway.delete_entry(&self.token, id).await
    }
}

#[derive(Clone)]
struct ActiveSession {
    mode: SessionMode,
    token: Option<String>,
    entries: Arc<dyn EntryStore>,
}

/// Entry & session orchestrator.
///
/// Owns the guest store for the lifetime of the process and swaps the active
/// [`EntryStore`] only on session transitions. Callers never branch on mode.
pub struct JournalCore {
    gateway: Arc<dyn JournalGateway>,
    tokens: SessionTokenStore,
    guest: Arc<GuestEntryStore>,
    session: RwLock<ActiveSession>,
}

impl JournalCore {
    /// Routes on the stored token alone. An unreadable token store falls back
    /// to guest mode. No network call is made.
    pub fn launch(gateway: Arc<dyn JournalGateway>, tokens: SessionTokenStore) -> Self {
        let guest = Arc::new(GuestEntryStore::new());
        let session = match tokens.get() {
            Ok(Some(token)) => {
                info!("stored session found, starting authenticated");
                authenticated_session(&gateway, token)
            }
            Ok(None) => {
                info!("no stored session, starting as guest");
                guest_session(&guest)
            }
            Err(err) => {
                warn!(error = %err, "session token store unreadable, starting as guest");
                guest_session(&guest)
            }
        };

        Self {
            gateway,
            tokens,
            guest,
            session: RwLock::new(session),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.session.read().mode
    }

    /// Entries that the next successful login will discard.
    pub fn guest_entry_count(&self) -> usize {
        self.guest.len()
    }

    pub async fn register(&self, username: &str, password: &str) -> JournalResult<UserAccount> {
        require_credentials(username, password)?;
        let account = self.gateway.register(username, password).await?;
        info!(username = %account.username, "account registered");
        Ok(account)
    }

    /// Authenticates, persists the token and enters authenticated mode. Guest
    /// entries are discarded unconditionally on success.
    pub async fn login(&self, username: &str, password: &str) -> JournalResult<AuthToken> {
        require_credentials(username, password)?;
        let token = self.gateway.authenticate(username, password).await?;
        self.establish_session(&token.token);
        Ok(token)
    }

    pub fn logout(&self) {
        if let Err(err) = self.tokens.clear() {
            warn!(error = %err, "failed to clear stored session token");
        }
        *self.session.write() = guest_session(&self.guest);
        info!("logged out, now in guest mode");
    }

    pub async fn profile(&self) -> JournalResult<UserAccount> {
        let Some(token) = self.session.read().token.clone() else {
            return Err(JournalError::Auth(NOT_SIGNED_IN.to_string()));
        };
        let result = self.gateway.fetch_profile(&token).await;
        self.observe(&token, result)
    }

    pub async fn create_entry(&self, content: EntryContent) -> JournalResult<Entry> {
        let session = self.current();
        let result = session.entries.create_entry(content).await;
        self.observe_session(&session, result)
    }

    pub async fn list_entries(&self) -> JournalResult<Vec<Entry>> {
        let session = self.current();
        let result = session.entries.list_entries().await;
        self.observe_session(&session, result)
    }

    pub async fn update_entry(&self, id: &EntryId, patch: EntryContent) -> JournalResult<()> {
        let session = self.current();
        let result = session.entries.update_entry(id, patch).await;
        self.observe_session(&session, result)
    }

    pub async fn delete_entry(&self, id: &EntryId) -> JournalResult<()> {
        let session = self.current();
        let result = session.entries.delete_entry(id).await;
        self.observe_session(&session, result)
    }

    fn current(&self) -> ActiveSession {
        self.session.read().clone()
    }

    fn establish_session(&self, token: &str) {
        if let Err(err) = self.tokens.set(token) {
            warn!(error = %err, "session token not persisted, it will not survive a restart");
        }
        let dropped = self.guest.len();
        self.guest.clear();
        *self.session.write() = authenticated_session(&self.gateway, token.to_string());
        info!(dropped_guest_entries = dropped, "session established");
    }

    fn observe_session<T>(
        &self,
        session: &ActiveSession,
        result: JournalResult<T>,
    ) -> JournalResult<T> {
        match session.token.as_deref() {
            Some(token) => self.observe(token, result),
            None => result,
        }
    }

    /// Failures pass through untouched; an auth rejection additionally ends
    /// the session it was issued under.
    fn observe<T>(&self, token: &str, result: JournalResult<T>) -> JournalResult<T> {
        if matches!(&result, Err(err) if err.is_auth()) {
            self.expire_session(token);
        }
        result
    }

    fn expire_session(&self, token: &str) {
        let mut session = self.session.write();
        if session.token.as_deref() != Some(token) {
            return;
        }
        if let Err(err) = self.tokens.clear() {
            warn!(error = %err, "failed to clear rejected session token");
        }
        *session = guest_session(&self.guest);
        info!("session rejected by server, now in guest mode");
    }
}

fn guest_session(guest: &Arc<GuestEntryStore>) -> ActiveSession {
    ActiveSession {
        mode: SessionMode::Guest,
        token: None,
        entries: guest.clone(),
    }
}

fn authenticated_session(gateway: &Arc<dyn JournalGateway>, token: String) -> ActiveSession {
    ActiveSession {
        mode: SessionMode::Authenticated,
        entries: Arc::new(RemoteEntryStore::new(gateway.clone(), token.clone())),
        token: Some(token),
    }
}

fn require_credentials(username: &str, password: &str) -> JournalResult<()> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(JournalError::Validation(MISSING_FIELDS.to_string()));
    }
    Ok(())
}
