//! In-process remote service.

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;

use super::{RemoteError, RemoteNote, RemoteResult, RemoteService};
use crate::models::{Note, NoteKey};

/// Remote operation, used to address injected failures and call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Create,
    Update,
    Get,
    List,
}

/// How an injected failure behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The call is rejected without touching stored notes.
    Reject,
    /// The write is applied but the call still reports a failure, as when a
    /// response is lost after the service committed.
    ApplyThenFail,
}

#[derive(Debug, Default)]
struct MemoryState {
    notes: BTreeMap<NoteKey, RemoteNote>,
    next_key: u64,
    failures: HashMap<RemoteOp, VecDeque<FailureMode>>,
    calls: HashMap<RemoteOp, usize>,
}

impl MemoryState {
    fn begin(&mut self, op: RemoteOp) -> Option<FailureMode> {
        *self.calls.entry(op).or_default() += 1;
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

/// Remote service holding notes in memory.
///
/// Keys are assigned sequentially (`K1`, `K2`, ...). Update responses omit the
/// body when it did not change, and metadata listings omit every body, so the
/// engine's handling of partial responses is exercised.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call of `op`.
    pub fn fail_next(&self, op: RemoteOp, mode: FailureMode) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(mode);
    }

    /// Number of calls made to `op` so far.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Store a note directly, as if another client had written it.
    pub fn insert(&self, note: RemoteNote) {
        self.state.lock().notes.insert(note.key.clone(), note);
    }

    /// Drop a note directly, as if another client had purged it.
    pub fn remove(&self, key: &NoteKey) -> Option<RemoteNote> {
        self.state.lock().notes.remove(key)
    }

    /// Current stored copy of a note, bypassing failure injection.
    pub fn stored(&self, key: &NoteKey) -> Option<RemoteNote> {
        self.state.lock().notes.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RemoteService for MemoryRemote {
    fn create(&self, note: &Note) -> RemoteResult<RemoteNote> {
        let mut state = self.state.lock();
        let failure = state.begin(RemoteOp::Create);
        if failure == Some(FailureMode::Reject) {
            return Err(RemoteError::new("create rejected"));
        }

        state.next_key += 1;
        let key = NoteKey::from(format!("K{}", state.next_key));
        let stored = RemoteNote::from_note(key.clone(), 1, note);
        state.notes.insert(key, stored.clone());

        match failure {
            Some(FailureMode::ApplyThenFail) => Err(RemoteError::new("create response lost")),
            _ => Ok(stored),
        }
    }

    fn update(&self, note: &Note) -> RemoteResult<RemoteNote> {
        let mut state = self.state.lock();
        let failure = state.begin(RemoteOp::Update);
        if failure == Some(FailureMode::Reject) {
            return Err(RemoteError::new("update rejected"));
        }

        let key = note
            .remote_key
            .clone()
            .ok_or_else(|| RemoteError::new("update without key"))?;
        let Some(existing) = state.notes.get(&key) else {
            return Err(RemoteError::new(format!("unknown note {key}")));
        };
        let content_changed = existing.content.as_deref() != Some(note.content.as_str());
        let stored = RemoteNote::from_note(key.clone(), existing.version + 1, note);
        state.notes.insert(key, stored.clone());

        match failure {
            Some(FailureMode::ApplyThenFail) => Err(RemoteError::new("update response lost")),
            _ if content_changed => Ok(stored),
            _ => Ok(stored.without_content()),
        }
    }

    fn get(&self, key: &NoteKey) -> RemoteResult<RemoteNote> {
        let mut state = self.state.lock();
        if state.begin(RemoteOp::Get).is_some() {
            return Err(RemoteError::new("get rejected"));
        }
        state
            .notes
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("unknown note {key}")))
    }

    fn list(&self, include_content: bool) -> RemoteResult<Vec<RemoteNote>> {
        let mut state = self.state.lock();
        if state.begin(RemoteOp::List).is_some() {
            return Err(RemoteError::new("list rejected"));
        }
        Ok(state
            .notes
            .values()
            .cloned()
            .map(|note| {
                if include_content {
                    note
                } else {
                    note.without_content()
                }
            })
            .collect())
    }
}
