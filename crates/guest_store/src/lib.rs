use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use core_types::{
    Entry, EntryContent, EntryId, EntryStore, JournalResult, RESERVED_ENTRY_KEYS,
};
use parking_lot::Mutex;
use tracing::debug;

/// Process-lifetime entry list for unauthenticated use.
///
/// Entries are kept newest first; `add` prepends, nothing ever sorts. Every
/// operation is infallible.
#[derive(Debug, Default)]
pub struct GuestEntryStore {
    inner: Mutex<GuestState>,
}

#[derive(Debug, Default)]
struct GuestState {
    entries: VecDeque<Entry>,
    last_id: i64,
}

impl GuestEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, mut content: EntryContent) -> Entry {
        strip_reserved(&mut content);
        let now = Utc::now();

        let mut state = self.inner.lock();
        let id = now.timestamp_millis().max(state.last_id + 1);
        state.last_id = id;

        let entry = Entry {
            id: EntryId::Number(id),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            is_local: true,
            is_guest: true,
            content,
        };
        state.entries.push_front(entry.clone());
        debug!(entry_id = id, total = state.entries.len(), "guest entry added");
        entry
    }

    /// Shallow merge into the matching entry. Unknown ids are ignored.
    pub fn update(&self, id: &EntryId, mut patch: EntryContent) {
        strip_reserved(&mut patch);
        let mut state = self.inner.lock();
        match state.entries.iter_mut().find(|entry| &entry.id == id) {
            Some(entry) => {
                entry.content.extend(patch);
                debug!(entry_id = %id, "guest entry updated");
            }
            None => debug!(entry_id = %id, "guest update ignored, no such entry"),
        }
    }

    pub fn delete(&self, id: &EntryId) {
        let mut state = self.inner.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| &entry.id != id);
        if state.entries.len() == before {
            debug!(entry_id = %id, "guest delete ignored, no such entry");
        }
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        debug!(dropped, "guest entries cleared");
    }

    pub fn list(&self) -> Vec<Entry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn strip_reserved(content: &mut EntryContent) {
    for key in RESERVED_ENTRY_KEYS {
        content.remove(key);
    }
}

#[async_trait]
impl EntryStore for GuestEntryStore {
    async fn create_entry(&self, content: EntryContent) -> JournalResult<Entry> {
        Ok(self.add(content))
    }

    async fn list_entries(&self) -> JournalResult<Vec<Entry>> {
        Ok(self.list())
    }

    async fn update_entry(&self, id: &EntryId, patch: EntryContent) -> JournalResult<()> {
        self.update(id, patch);
        Ok(())
    }

    async fn delete_entry(&self, id: &EntryId) -> JournalResult<()> {
        self.delete(id);
        Ok(())
    }
}
