use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;

use super::{Group, RecordStore, StoreError, StoreSession};

#[derive(Default)]
struct Counters {
    adds: AtomicUsize,
    commits: AtomicUsize,
}

#[derive(Default)]
struct Tables {
    groups: HashMap<String, Group>,
    processed_messages: HashSet<String>,
}

/// Thread-safe in-memory group store.
///
/// Group names are unique, mirroring the unique index on the relational
/// table. Message ids recorded with a commit are unique as well, so a
/// redelivered message is recognised by its id. `Clone` yields another
/// handle to the same storage.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
    next_id: Arc<AtomicUsize>,
    counters: Arc<Counters>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the standard seed groups.
    pub fn seeded() -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            for name in ["Surface", "HoloLens", "Xbox"] {
                let id = store.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
                tables.groups.insert(
                    name.to_string(),
                    Group {
                        id: Some(id),
                        name: name.to_string(),
                        is_active: true,
                    },
                );
            }
        }
        store
    }

    /// Open the store a connection string names.
    ///
    /// Only the in-memory store is built in: an empty string or a `memory:`
    /// scheme opens a store holding the seed groups. Anything else is refused
    /// rather than silently ignored.
    pub fn open(connection_string: &str) -> Result<Self, StoreError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() || trimmed.starts_with("memory:") {
            return Ok(Self::seeded());
        }
        Err(StoreError::Unavailable(format!(
            "no record store driver for connection string '{trimmed}'"
        )))
    }

    /// Make every subsequent commit fail with [`StoreError::Unavailable`].
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// All stored groups, ordered by id.
    pub fn groups(&self) -> Result<Vec<Group>, StoreError> {
        let tables = self.read()?;
        let mut all: Vec<Group> = tables.groups.values().cloned().collect();
        all.sort_by_key(|group| group.id);
        Ok(all)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.read()?.groups.get(name).cloned())
    }

    /// Whether a commit has already recorded `message_id`.
    pub fn is_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.processed_messages.contains(message_id))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned during read".into()))
    }

    /// Number of `add` calls across all sessions.
    pub fn add_calls(&self) -> usize {
        self.counters.adds.load(Ordering::SeqCst)
    }

    /// Number of `commit` calls across all sessions, failed ones included.
    pub fn commit_calls(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    fn persist(&self, staged: Vec<Group>, messages: Vec<String>) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned during write".into()))?;

        // Check everything before writing anything, so a commit is all-or-nothing.
        for (index, message_id) in messages.iter().enumerate() {
            if messages[..index].contains(message_id)
                || tables.processed_messages.contains(message_id)
            {
                return Err(StoreError::AlreadyProcessed {
                    message_id: message_id.clone(),
                });
            }
        }
        for (index, group) in staged.iter().enumerate() {
            let repeated = staged[..index].iter().any(|other| other.name == group.name);
            if repeated || tables.groups.contains_key(&group.name) {
                return Err(StoreError::Duplicate {
                    name: group.name.clone(),
                });
            }
        }

        for mut group in staged {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            group.id = Some(id);
            tables.groups.insert(group.name.clone(), group);
        }
        tables.processed_messages.extend(messages);
        Ok(())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn session(&self) -> Box<dyn StoreSession> {
        Box::new(InMemorySession {
            store: self.clone(),
            staged: Vec::new(),
            messages: Vec::new(),
        })
    }
}

struct InMemorySession {
    store: InMemoryRecordStore,
    staged: Vec<Group>,
    messages: Vec<String>,
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn add(&mut self, group: Group) -> Result<(), StoreError> {
        self.store.counters.adds.fetch_add(1, Ordering::SeqCst);
        self.staged.push(group);
        Ok(())
    }

    async fn record_message(&mut self, message_id: &str) -> Result<(), StoreError> {
        self.messages.push(message_id.to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.store.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.store.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commits are disabled".into()));
        }
        let staged = std::mem::take(&mut self.staged);
        let messages = std::mem::take(&mut self.messages);
        self.store.persist(staged, messages)
    }
}
