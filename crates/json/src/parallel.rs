//! Coordination primitives for evaluating independent fields concurrently.
//!
//! A [`Promise`] is a single-assignment slot any number of threads can
//! block on. [`Versions`] is a ledger of successive values of one field,
//! where a version may still be pending; readers ask for the version just
//! before their own and block until it is settled.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::ParallelError;
use crate::value::Value;

// ──────────────────────────────────────────────
// Promise
// ──────────────────────────────────────────────

/// A value that is set exactly once and read by any number of waiters.
pub struct Promise<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Promise {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    /// Stores `value` and wakes every waiter.
    ///
    /// A second call fails with [`ParallelError::DoubleSet`] and leaves the
    /// stored value as it was.
    pub fn set(&self, value: T) -> Result<(), ParallelError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(ParallelError::DoubleSet);
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        Ok(())
    }
}

impl<T: Clone> Promise<T> {
    /// Blocks until the promise is set, then returns its value.
    pub fn get(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The value if already set, without blocking.
    pub fn try_get(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.is_set())
            .finish()
    }
}

// ──────────────────────────────────────────────
// Version ledger
// ──────────────────────────────────────────────

/// An entry of a [`Versions`] ledger.
#[derive(Debug, Clone)]
pub enum Versioned {
    Ready(Value),
    Pending(Arc<Promise<Value>>),
}

impl Versioned {
    /// A fresh pending entry and a handle to settle it with.
    pub fn pending() -> (Versioned, Arc<Promise<Value>>) {
        let promise = Arc::new(Promise::new());
        (Versioned::Pending(Arc::clone(&promise)), promise)
    }

    /// The concrete value, blocking while pending.
    pub fn resolve(&self) -> Value {
        match self {
            Versioned::Ready(v) => v.clone(),
            Versioned::Pending(p) => p.get(),
        }
    }
}

impl From<Value> for Versioned {
    fn from(v: Value) -> Self {
        Versioned::Ready(v)
    }
}

/// Successive values of one field, keyed by non-negative version id.
///
/// Writes need `&mut self` and are expected from one producer; once the
/// ledger is populated it can be shared by reference across readers.
#[derive(Debug)]
pub struct Versions {
    versions: BTreeMap<i64, Versioned>,
    latest: i64,
    locked: bool,
}

impl Default for Versions {
    fn default() -> Self {
        Versions::new()
    }
}

impl Versions {
    pub fn new() -> Self {
        Versions {
            versions: BTreeMap::new(),
            latest: -1,
            locked: false,
        }
    }

    pub fn add_version(&mut self, value: impl Into<Versioned>, id: i64) -> Result<(), ParallelError> {
        if self.locked {
            return Err(ParallelError::Locked { id });
        }
        if id < 0 {
            return Err(ParallelError::NegativeId { id });
        }
        if self.versions.contains_key(&id) {
            return Err(ParallelError::DuplicateId { id });
        }
        self.versions.insert(id, value.into());
        self.latest = self.latest.max(id);
        Ok(())
    }

    pub fn version(&self, id: i64) -> Option<&Versioned> {
        self.versions.get(&id)
    }

    /// The nearest version below `id`; past the end, the latest version.
    pub fn prev_version(&self, id: i64) -> Option<&Versioned> {
        if id > self.latest {
            return self.versions.get(&self.latest);
        }
        self.versions.range(..id).next_back().map(|(_, v)| v)
    }

    pub fn exist_version(&self, id: i64) -> bool {
        self.versions.contains_key(&id)
    }

    /// Highest id added so far, or -1.
    pub fn latest_id(&self) -> i64 {
        self.latest
    }

    /// The entry with the highest id.
    pub fn latest(&self) -> Option<&Versioned> {
        self.versions.get(&self.latest)
    }

    /// Rejects every later [`Versions::add_version`].
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Settles the pending version `id` with the value of the version
    /// before it, blocking until that one is settled.
    pub fn skip_version(&self, id: i64) -> Result<(), ParallelError> {
        let promise = match self.versions.get(&id) {
            None => return Err(ParallelError::MissingVersion { id }),
            Some(Versioned::Ready(_)) => return Err(ParallelError::NotAPromise { id }),
            Some(Versioned::Pending(p)) => p,
        };
        let value = self
            .prev_version(id)
            .map(Versioned::resolve)
            .unwrap_or(Value::Null);
        tracing::trace!(version = id, "skipping version");
        promise.set(value)
    }
}
