//! Chunk-content cache.
//!
//! `entity.extracted` carries no text, so the stage keeps the content of
//! each `data.ingested` event until resolution takes it. Entries are never
//! evicted by age or count: ingestion can publish far more chunks than
//! extraction has finished, and every one of them must still be resolvable.
//! An entry leaves the cache when it is taken or released.
//!
//! Both events derive from the same ingestion and are handled concurrently,
//! so a lookup may briefly wait for the matching insert.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
struct Entry {
    content: String,
    /// Ingestions of this chunk not yet taken.
    pending: usize,
}

#[derive(Debug, Default)]
pub struct ContentCache {
    entries: Mutex<HashMap<String, Entry>>,
    inserted: Notify,
}

impl ContentCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `content` until it is taken. Blank content is ignored.
    pub fn insert(&self, doc_id: &str, content: &str) {
        if content.trim().is_empty() {
            return;
        }
        {
            let mut entries = self.entries.lock();
            let entry = entries.entry(doc_id.to_string()).or_insert_with(|| Entry {
                content: String::new(),
                pending: 0,
            });
            content.clone_into(&mut entry.content);
            entry.pending += 1;
        }
        self.inserted.notify_waiters();
    }

    #[must_use]
    pub fn get(&self, doc_id: &str) -> Option<String> {
        self.entries.lock().get(doc_id).map(|e| e.content.clone())
    }

    /// Consume one ingestion of `doc_id`.
    pub fn take(&self, doc_id: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(doc_id)?;
        entry.pending -= 1;
        if entry.pending == 0 {
            entries.remove(doc_id).map(|e| e.content)
        } else {
            Some(entry.content.clone())
        }
    }

    /// Drop one ingestion of `doc_id` that will never be resolved.
    pub fn release(&self, doc_id: &str) -> bool {
        self.take(doc_id).is_some()
    }

    /// Take `doc_id`, waiting up to `timeout` for it to be inserted.
    pub async fn wait_take(&self, doc_id: &str, timeout: Duration) -> Option<String> {
        let lookup = async {
            loop {
                let notified = self.inserted.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(content) = self.take(doc_id) {
                    return content;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, lookup).await.ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_untaken_entries_are_kept() {
        let cache = ContentCache::new();
        for i in 0..1000 {
            cache.insert(&format!("doc_chunk_{i}"), "text");
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.take("doc_chunk_0").as_deref(), Some("text"));
        assert_eq!(cache.len(), 999);
    }

    #[test]
    fn test_take_consumes_each_ingestion_once() {
        let cache = ContentCache::new();
        cache.insert("a", "1");
        cache.insert("a", "2");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take("a").as_deref(), Some("2"));
        assert_eq!(cache.take("a").as_deref(), Some("2"));
        assert!(cache.take("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_release_and_blank_content() {
        let cache = ContentCache::new();
        cache.insert("blank", "  \n");
        assert!(cache.is_empty());

        cache.insert("a", "1");
        assert!(cache.release("a"));
        assert!(!cache.release("a"));
        assert!(cache.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_take_late_insert() {
        let cache = Arc::new(ContentCache::new());
        let writer = Arc::clone(&cache);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.insert("late", "text");
        });

        let got = cache.wait_take("late", Duration::from_secs(1)).await;
        assert_eq!(got.as_deref(), Some("text"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_take_times_out() {
        let cache = ContentCache::new();
        assert!(cache.wait_take("never", Duration::from_millis(100)).await.is_none());
    }
}
