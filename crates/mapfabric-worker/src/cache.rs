//! Process-local cache of prepared layer handles

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Cache from layer name to prepared handle.
///
/// Owned by exactly one worker process; entries are reused across jobs
/// within that process. Nothing is evicted.
pub struct LayerCache<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> LayerCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `name`, preparing and caching it on a
    /// miss. A failed preparation is not cached.
    pub async fn get_or_try_insert_with<E, F>(&self, name: &str, prepare: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(handle) = entries.get(name) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(prepare()?);
        entries.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<T> Default for LayerCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
