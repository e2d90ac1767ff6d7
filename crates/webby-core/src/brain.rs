//! The robot's brain.
//!
//! The brain is an in-memory store for user records and a private key/value
//! namespace. It does not persist anything itself; instead it emits
//! [`BrainEvent::Save`] periodically (and on [`Brain::close`]) so a storage
//! backend can subscribe and write the data wherever it wants. A backend
//! restores state with [`Brain::merge_data`].
//!
//! ```rust,ignore
//! let mut events = robot.brain().subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let BrainEvent::Save(data) = event {
//!             store(serde_json::to_vec(&data)?).await?;
//!         }
//!     }
//! });
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::user::{User, UserId, UserOptions};

const EVENT_CAPACITY: usize = 64;

/// The data held by a brain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrainData {
    /// User records keyed by the stringified user id.
    #[serde(default)]
    pub users: BTreeMap<String, Arc<User>>,

    /// The private key/value namespace.
    #[serde(default, rename = "_private")]
    pub private: BTreeMap<String, Value>,
}

/// Notifications emitted by a [`Brain`].
#[derive(Debug, Clone)]
pub enum BrainEvent {
    /// Data was set or merged in.
    Loaded,
    /// A snapshot that a storage backend should persist.
    Save(BrainData),
    /// The brain was closed.
    Close,
}

/// A cheaply cloneable handle to the robot's store.
#[derive(Clone)]
pub struct Brain {
    inner: Arc<BrainInner>,
}

struct BrainInner {
    data: RwLock<BrainData>,
    auto_save: AtomicBool,
    events: broadcast::Sender<BrainEvent>,
    save_task: Mutex<Option<CancellationToken>>,
}

impl Default for Brain {
    fn default() -> Self {
        Self::new()
    }
}

impl Brain {
    /// Creates an empty brain with auto-save enabled.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(BrainInner {
                data: RwLock::new(BrainData::default()),
                auto_save: AtomicBool::new(true),
                events,
                save_task: Mutex::new(None),
            }),
        }
    }

    /// Subscribes to brain events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrainEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: BrainEvent) {
        // No subscriber is not an error.
        let _ = self.inner.events.send(event);
    }

    // =========================================================================
    // Private namespace
    // =========================================================================

    /// Stores a value under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.inner
            .data
            .write()
            .private
            .insert(key.into(), value.into());
        self.emit(BrainEvent::Loaded);
        self
    }

    /// Stores several key/value pairs at once.
    pub fn set_many<I, K, V>(&self, pairs: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        {
            let mut data = self.inner.data.write();
            for (key, value) in pairs {
                data.private.insert(key.into(), value.into());
            }
        }
        self.emit(BrainEvent::Loaded);
        self
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().private.get(key).cloned()
    }

    /// Removes the value stored under `key`.
    pub fn remove(&self, key: &str) -> &Self {
        self.inner.data.write().private.remove(key);
        self
    }

    /// Returns a snapshot of the whole store.
    pub fn data(&self) -> BrainData {
        self.inner.data.read().clone()
    }

    /// Merges data loaded by a storage backend into the store.
    ///
    /// Loaded entries overwrite existing ones with the same key; nested
    /// values are replaced, not merged.
    pub fn merge_data(&self, loaded: BrainData) {
        {
            let mut data = self.inner.data.write();
            data.users.extend(loaded.users);
            data.private.extend(loaded.private);
        }
        self.emit(BrainEvent::Loaded);
    }

    // =========================================================================
    // Persistence events
    // =========================================================================

    /// Emits a [`BrainEvent::Save`] with the current data.
    pub fn save(&self) {
        trace!("Emitting brain save event");
        self.emit(BrainEvent::Save(self.data()));
    }

    /// Stops auto-saving, saves one last time and emits [`BrainEvent::Close`].
    pub fn close(&self) {
        if let Some(token) = self.inner.save_task.lock().take() {
            token.cancel();
        }
        self.save();
        self.emit(BrainEvent::Close);
        debug!("Brain closed");
    }

    /// Enables or disables periodic saving.
    pub fn set_auto_save(&self, enabled: bool) {
        self.inner.auto_save.store(enabled, Ordering::SeqCst);
    }

    /// Returns whether periodic saving is enabled.
    pub fn auto_save(&self) -> bool {
        self.inner.auto_save.load(Ordering::SeqCst)
    }

    /// Restarts the periodic save task with a new interval.
    ///
    /// The task saves every `interval` while auto-save is enabled. It must be
    /// called from within a tokio runtime; otherwise nothing is scheduled.
    pub fn reset_save_interval(&self, interval: Duration) {
        let mut slot = self.inner.save_task.lock();
        if let Some(token) = slot.take() {
            token.cancel();
        }

        if interval.is_zero() {
            warn!("Brain save interval is zero, auto-save is not scheduled");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime available, brain auto-save is not scheduled");
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let brain = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = Weak::upgrade(&brain) else { break };
                        let brain = Brain { inner };
                        if brain.auto_save() {
                            brain.save();
                        }
                    }
                }
            }
        });

        debug!(interval_secs = interval.as_secs_f64(), "Brain auto-save scheduled");
        *slot = Some(token);
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Returns every stored user.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.inner.data.read().users.values().cloned().collect()
    }

    /// Returns the user with `id`, creating it from `options` if needed.
    ///
    /// A stored user is replaced (not updated) by a fresh record whenever
    /// `options.room` is set and differs from the stored user's room.
    pub fn user_for_id(&self, id: impl Into<UserId>, options: UserOptions) -> Arc<User> {
        let id = id.into();
        let key = id.to_string();
        let mut data = self.inner.data.write();

        if let Some(existing) = data.users.get(&key) {
            let moved = match &options.room {
                Some(room) => existing.room.as_deref() != Some(room.as_str()),
                None => false,
            };
            if !moved {
                return Arc::clone(existing);
            }
        }

        let user = Arc::new(User::new(id, options));
        data.users.insert(key, Arc::clone(&user));
        user
    }

    /// Returns the user whose name equals `name`, ignoring case.
    pub fn user_for_name(&self, name: &str) -> Option<Arc<User>> {
        let lower = name.to_lowercase();
        self.inner
            .data
            .read()
            .users
            .values()
            .rev()
            .find(|user| user.name.to_lowercase() == lower)
            .cloned()
    }

    /// Returns every user whose name starts with `fuzzy_name`, ignoring case.
    pub fn users_for_raw_fuzzy_name(&self, fuzzy_name: &str) -> Vec<Arc<User>> {
        let lower = fuzzy_name.to_lowercase();
        self.inner
            .data
            .read()
            .users
            .values()
            .filter(|user| user.name.to_lowercase().starts_with(&lower))
            .cloned()
            .collect()
    }

    /// Like [`users_for_raw_fuzzy_name`](Self::users_for_raw_fuzzy_name), but
    /// an exact (case-insensitive) name match wins outright.
    pub fn users_for_fuzzy_name(&self, fuzzy_name: &str) -> Vec<Arc<User>> {
        let lower = fuzzy_name.to_lowercase();
        let matched = self.users_for_raw_fuzzy_name(fuzzy_name);
        match matched.iter().find(|user| user.name.to_lowercase() == lower) {
            Some(exact) => vec![Arc::clone(exact)],
            None => matched,
        }
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("Brain")
            .field("users", &data.users.len())
            .field("keys", &data.private.len())
            .field("auto_save", &self.auto_save())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn brain_with_users() -> Brain {
        let brain = Brain::new();
        brain.user_for_id("1", UserOptions::new().name("Guy One"));
        brain.user_for_id("2", UserOptions::new().name("Guy One Two"));
        brain.user_for_id("3", UserOptions::new().name("Girl Three"));
        brain
    }

    fn names(users: &[Arc<User>]) -> Vec<&str> {
        users.iter().map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn private_namespace() {
        let brain = Brain::new();
        assert_eq!(brain.get("1"), None);

        brain.set("1", "value").set_many([("2", 2), ("3", 3)]);
        assert_eq!(brain.get("1"), Some(Value::from("value")));
        assert_eq!(brain.get("3"), Some(Value::from(3)));

        brain.remove("1");
        assert_eq!(brain.get("1"), None);
    }

    #[test]
    fn set_emits_loaded() {
        let brain = Brain::new();
        let mut events = brain.subscribe();
        brain.set("key", true);
        assert!(matches!(events.try_recv(), Ok(BrainEvent::Loaded)));
    }

    #[test]
    fn user_for_id_creates_once() {
        let brain = Brain::new();
        let first = brain.user_for_id("1", UserOptions::new());
        let second = brain.user_for_id("1", UserOptions::new());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(brain.users().len(), 1);
    }

    #[test]
    fn user_for_id_replaces_on_room_change() {
        let brain = Brain::new();
        let in_a = brain.user_for_id("1", UserOptions::new().room("A"));
        let in_b = brain.user_for_id("1", UserOptions::new().room("B"));
        assert!(!Arc::ptr_eq(&in_a, &in_b));

        let again_b = brain.user_for_id("1", UserOptions::new().room("B"));
        assert!(Arc::ptr_eq(&in_b, &again_b));

        let no_room = brain.user_for_id("1", UserOptions::new());
        assert!(Arc::ptr_eq(&in_b, &no_room));
    }

    #[test]
    fn user_for_id_replaces_when_stored_user_has_no_room() {
        let brain = Brain::new();
        let first = brain.user_for_id("1", UserOptions::new().attribute("x", 1));
        let second = brain.user_for_id("1", UserOptions::new().room("A"));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.attribute("x"), None);
    }

    #[test]
    fn user_for_name_ignores_case() {
        let brain = brain_with_users();
        let user = brain.user_for_name("guy one").unwrap();
        assert_eq!(user.id, UserId::from("1"));
        assert!(brain.user_for_name("nobody").is_none());
    }

    #[test]
    fn fuzzy_lookups() {
        let brain = brain_with_users();
        assert_eq!(
            names(&brain.users_for_raw_fuzzy_name("Guy One")),
            vec!["Guy One", "Guy One Two"]
        );
        assert_eq!(names(&brain.users_for_fuzzy_name("guy one")), vec!["Guy One"]);
        assert_eq!(
            names(&brain.users_for_fuzzy_name("Guy")),
            vec!["Guy One", "Guy One Two"]
        );
        assert!(brain.users_for_fuzzy_name("Nobody").is_empty());
    }

    #[test]
    fn merge_data_overwrites_entries() {
        let brain = Brain::new();
        brain.set("kept", 1).set("replaced", 1);

        let mut loaded = BrainData::default();
        loaded.private.insert("replaced".into(), Value::from(2));
        loaded.users.insert(
            "9".into(),
            Arc::new(User::new("9", UserOptions::new().name("Loaded"))),
        );
        brain.merge_data(loaded);

        assert_eq!(brain.get("kept"), Some(Value::from(1)));
        assert_eq!(brain.get("replaced"), Some(Value::from(2)));
        assert_eq!(brain.user_for_name("loaded").map(|u| u.id.clone()), Some(UserId::from("9")));
    }

    #[test]
    fn data_serializes_private_namespace() {
        let brain = Brain::new();
        brain.set("answer", 42);
        let json = serde_json::to_value(brain.data()).unwrap();
        assert_eq!(json["_private"]["answer"], Value::from(42));
    }

    #[test]
    fn close_saves_then_closes() {
        let brain = Brain::new();
        let mut events = brain.subscribe();
        brain.close();
        assert!(matches!(events.try_recv(), Ok(BrainEvent::Save(_))));
        assert!(matches!(events.try_recv(), Ok(BrainEvent::Close)));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_save_emits_on_interval() {
        let brain = Brain::new();
        let mut events = brain.subscribe();
        brain.reset_save_interval(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(matches!(events.try_recv(), Ok(BrainEvent::Save(_))));
        assert!(matches!(events.try_recv(), Ok(BrainEvent::Save(_))));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        brain.close();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_save_can_be_disabled() {
        let brain = Brain::new();
        let mut events = brain.subscribe();
        brain.set_auto_save(false);
        brain.reset_save_interval(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}
