use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use rustc_hash::FxHashMap;

/// A map from keys to weakly held values.
///
/// The cache never extends the lifetime of a value: callers that need the
/// value to survive must hold their own [`Arc`]. An entry whose value has been
/// dropped is logically absent and is purged on the next access to its key.
///
/// All operations are linearized under a single mutex per cache instance.
pub struct WeakValueCache<K, V> {
    entries: Mutex<FxHashMap<K, Weak<V>>>,
}

impl<K, V> Default for WeakValueCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<K, V> WeakValueCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: Eq + Hash, V> WeakValueCache<K, V> {
    /// Returns the live value for `key`, if any.
    ///
    /// If an entry exists but its value has been dropped, the entry is removed
    /// as a side effect and `None` is returned. A key that was never present
    /// causes no side effect.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(weak) => match weak.upgrade() {
                Some(value) => Some(value),
                None => {
                    entries.remove(key);
                    None
                }
            },
            None => None,
        }
    }

    /// Installs a weakly held entry for `key`, unconditionally replacing any
    /// existing entry, live or stale.
    pub fn put(&self, key: K, value: &Arc<V>) {
        self.entries.lock().unwrap().insert(key, Arc::downgrade(value));
    }

    /// Removes any entry for `key`, live or stale. Removing an absent key is a
    /// no-op.
    pub fn remove(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Removes the entry for `key` only if it still refers to exactly `value`.
    ///
    /// This is the generation check used by close handlers: a close event for
    /// an instance that has since been replaced under the same key must not
    /// evict the newer entry. Returns whether an entry was removed.
    pub fn remove_if(&self, key: &K, value: &V) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(weak) if std::ptr::eq(weak.as_ptr(), value) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Returns the live value for `key`, creating and installing it on miss.
    ///
    /// The whole miss-create-install sequence runs under the cache lock, so
    /// concurrent misses on the same key converge on one creation instead of
    /// racing. Creation is expected to be cheap in-memory construction.
    pub fn get_or_insert_with(&self, key: K, create: impl FnOnce() -> Arc<V>) -> Arc<V> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(value) = entries.get(&key).and_then(Weak::upgrade) {
            return value;
        }
        let value = create();
        entries.insert(key, Arc::downgrade(&value));
        value
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with).
    /// Nothing is installed when `create` fails.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        create: impl FnOnce() -> Result<Arc<V>, E>,
    ) -> Result<Arc<V>, E> {
        self.get_or_try_insert_where(key, |_| true, create)
    }

    /// Like [`get_or_try_insert_with`](Self::get_or_try_insert_with), but a
    /// live entry only counts as a hit if `valid` accepts it; a rejected
    /// entry is replaced by a freshly created value.
    pub fn get_or_try_insert_where<E>(
        &self,
        key: K,
        valid: impl FnOnce(&V) -> bool,
        create: impl FnOnce() -> Result<Arc<V>, E>,
    ) -> Result<Arc<V>, E> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(value) = entries.get(&key).and_then(Weak::upgrade) {
            if valid(&value) {
                return Ok(value);
            }
        }
        let value = create()?;
        entries.insert(key, Arc::downgrade(&value));
        Ok(value)
    }

    /// The raw entry count, including stale entries that have not been swept
    /// yet.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
