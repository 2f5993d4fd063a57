use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// A document the reference search thinks may link to the note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub path: String,
}

impl DocumentDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("could not decode response: {message}")]
    Decode { message: String },
}

/// The remote vault, as far as renaming is concerned.
///
/// Paths are vault-relative (`Projects/Note.md`). Implementations do no
/// retrying; callers own timeouts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when there is no document at `path`.
    async fn fetch_content(&self, path: &str) -> Result<Option<String>, StoreError>;

    async fn write_content(&self, path: &str, content: &str) -> Result<(), StoreError>;

    async fn delete_document(&self, path: &str) -> Result<(), StoreError>;

    /// Best-effort backlink search for `note_name` (no `.md`). May over- or under-report.
    async fn find_referencing_documents(
        &self,
        note_name: &str,
    ) -> Result<Vec<DocumentDescriptor>, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn fetch_content(&self, path: &str) -> Result<Option<String>, StoreError> {
        (**self).fetch_content(path).await
    }

    async fn write_content(&self, path: &str, content: &str) -> Result<(), StoreError> {
        (**self).write_content(path, content).await
    }

    async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        (**self).delete_document(path).await
    }

    async fn find_referencing_documents(
        &self,
        note_name: &str,
    ) -> Result<Vec<DocumentDescriptor>, StoreError> {
        (**self).find_referencing_documents(note_name).await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore: in-process vault with failure injection
// ---------------------------------------------------------------------------

/// A store operation, as recorded by `MemoryStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Fetch(String),
    Write(String),
    Delete(String),
    Discover(String),
}

#[derive(Default)]
struct Faults {
    fetch: HashSet<String>,
    /// Successful fetches left before a path starts failing.
    fetch_after: HashMap<String, usize>,
    write: HashSet<String>,
    delete: HashSet<String>,
    discovery: bool,
    fetch_delay: HashMap<String, Duration>,
    extra_candidates: Vec<String>,
}

/// A vault held in memory.
///
/// Discovery reports every document containing `[[` and the note's basename,
/// which over-reports the way a real backlink search can.
#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<String, String>,
    faults: Mutex<Faults>,
    log: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, P, C>(docs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let store = Self::new();
        for (path, content) in docs {
            store.docs.insert(path.into(), content.into());
        }
        store
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.docs.insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.docs.get(path).map(|c| c.value().clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.docs.contains_key(path)
    }

    /// All document paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.docs.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Operations performed so far, in call order.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fail_fetches_of(&self, path: &str) {
        self.faults().fetch.insert(path.to_string());
    }

    /// Let the next `successes` fetches of `path` through, then fail every one after.
    pub fn fail_fetches_of_after(&self, path: &str, successes: usize) {
        self.faults().fetch_after.insert(path.to_string(), successes);
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.faults().write.insert(path.to_string());
    }

    pub fn fail_deletes_of(&self, path: &str) {
        self.faults().delete.insert(path.to_string());
    }

    pub fn fail_discovery(&self) {
        self.faults().discovery = true;
    }

    /// Make fetches of `path` sleep before answering.
    pub fn delay_fetches_of(&self, path: &str, delay: Duration) {
        self.faults().fetch_delay.insert(path.to_string(), delay);
    }

    /// Report `path` from discovery even if it does not exist or does not match.
    pub fn report_candidate(&self, path: &str) {
        self.faults().extra_candidates.push(path.to_string());
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: StoreOp) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(op);
    }

    fn injected(op: &str, path: &str) -> StoreError {
        StoreError::Http {
            status: 500,
            body: format!("injected {op} failure for {path}"),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_content(&self, path: &str) -> Result<Option<String>, StoreError> {
        self.record(StoreOp::Fetch(path.to_string()));
        let (fail, delay) = {
            let mut faults = self.faults();
            let exhausted = match faults.fetch_after.get_mut(path) {
                Some(0) => true,
                Some(left) => {
                    *left -= 1;
                    false
                }
                None => false,
            };
            (
                exhausted || faults.fetch.contains(path),
                faults.fetch_delay.get(path).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Self::injected("fetch", path));
        }
        Ok(self.get(path))
    }

    async fn write_content(&self, path: &str, content: &str) -> Result<(), StoreError> {
        self.record(StoreOp::Write(path.to_string()));
        if self.faults().write.contains(path) {
            return Err(Self::injected("write", path));
        }
        self.docs.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        self.record(StoreOp::Delete(path.to_string()));
        if self.faults().delete.contains(path) {
            return Err(Self::injected("delete", path));
        }
        match self.docs.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn find_referencing_documents(
        &self,
        note_name: &str,
    ) -> Result<Vec<DocumentDescriptor>, StoreError> {
        self.record(StoreOp::Discover(note_name.to_string()));
        let extra = {
            let faults = self.faults();
            if faults.discovery {
                return Err(StoreError::Transport {
                    message: "injected discovery failure".to_string(),
                });
            }
            faults.extra_candidates.clone()
        };

        let basename = note_name.rsplit('/').next().unwrap_or(note_name);
        let mut found: Vec<DocumentDescriptor> = self
            .paths()
            .into_iter()
            .filter(|path| {
                self.get(path)
                    .is_some_and(|c| c.contains("[[") && c.contains(basename))
            })
            .map(DocumentDescriptor::new)
            .collect();
        found.extend(extra.into_iter().map(DocumentDescriptor::new));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_missing_document_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch_content("Nope.md").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_fetch() {
        let store = MemoryStore::new();
        store.write_content("A.md", "hello").await.unwrap();
        assert_eq!(store.fetch_content("A.md").await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn delete_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store.delete_document("A.md").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound { path: "A.md".into() });
    }

    #[tokio::test]
    async fn discovery_over_reports_by_basename() {
        let store = MemoryStore::with_documents([
            ("a.md", "link [[Projects/Note]]"),
            ("b.md", "mentions Note but [[Other]]"),
            ("c.md", "no links at all, Note"),
            ("d.md", "[[Unrelated]]"),
        ]);
        let found = store.find_referencing_documents("Projects/Note").await.unwrap();
        let paths: Vec<_> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn fetch_fails_once_successes_run_out() {
        let store = MemoryStore::with_documents([("a.md", "x"), ("b.md", "y")]);
        store.fail_fetches_of_after("a.md", 1);
        store.fail_fetches_of("b.md");

        assert_eq!(store.fetch_content("a.md").await.unwrap().as_deref(), Some("x"));
        assert!(matches!(
            store.fetch_content("a.md").await,
            Err(StoreError::Http { status: 500, .. })
        ));
        assert!(store.fetch_content("a.md").await.is_err());
        assert!(store.fetch_content("b.md").await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_and_log() {
        let store = MemoryStore::with_documents([("a.md", "x")]);
        store.fail_writes_to("a.md");
        store.fail_discovery();

        assert!(store.write_content("a.md", "y").await.is_err());
        assert_eq!(store.get("a.md").as_deref(), Some("x"));
        assert!(store.find_referencing_documents("x").await.is_err());
        assert_eq!(
            store.operations(),
            vec![StoreOp::Write("a.md".into()), StoreOp::Discover("x".into())]
        );
    }
}
