//! In-memory backup store for tests.
//!
//! Records every write and can be switched into a failing mode to exercise
//! the non-fatal backup path.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::BackupStore;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    fail_writes: AtomicBool,
    put_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure whether `put` should fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls, failed ones included.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Stored bytes and content type for `key`.
    pub fn object(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl BackupStore for MemoryStorage {
    fn object_url(&self, key: &str) -> String {
        format!("memory://{}", key)
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Simulated backup write failure"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(self.object_url(key))
    }
}
