//! Scripted in-memory feeds and collections for tests.

use crate::error::SourceError;
use crate::feed::{ChangeFeed, FeedConnector, FeedRecord};
use crate::snapshot::{SnapshotCursor, SnapshotSource};
use async_trait::async_trait;
use mongodb::bson::Document;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use sync_core::OperationKind;

/// One step of a scripted feed session.
#[derive(Debug, Clone)]
pub enum FeedStep {
    Record(FeedRecord),
    Fail(String),
    End,
}

/// Serves one scripted session per `open`.
///
/// Once a session's steps run out the feed stays idle, like a live stream
/// with no traffic. When no session is left, `open` fails.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Vec<FeedStep>>>,
    opened: Mutex<Vec<Vec<OperationKind>>>,
    polls: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<Vec<FeedStep>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            ..Self::default()
        }
    }

    /// Number of successful `open` calls.
    pub fn opens(&self) -> usize {
        lock(&self.opened).len()
    }

    /// Operation filters passed to each `open`.
    pub fn filters(&self) -> Vec<Vec<OperationKind>> {
        lock(&self.opened).clone()
    }

    /// Total `next` calls across all sessions.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    type Feed = ScriptedFeed;

    async fn open(
        &self,
        collection: &str,
        operations: &[OperationKind],
    ) -> Result<Self::Feed, SourceError> {
        let Some(steps) = lock(&self.sessions).pop_front() else {
            return Err(SourceError::Feed {
                collection: collection.to_string(),
                message: "connection refused".to_string(),
            });
        };
        lock(&self.opened).push(operations.to_vec());
        Ok(ScriptedFeed {
            collection: collection.to_string(),
            steps: steps.into(),
            polls: Arc::clone(&self.polls),
        })
    }
}

pub struct ScriptedFeed {
    collection: String,
    steps: VecDeque<FeedStep>,
    polls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn next(&mut self) -> Result<Option<FeedRecord>, SourceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(FeedStep::Record(record)) => Ok(Some(record)),
            Some(FeedStep::Fail(message)) => Err(SourceError::Feed {
                collection: self.collection.clone(),
                message,
            }),
            Some(FeedStep::End) => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.steps.clear();
    }
}

/// A fixed collection whose cursors can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: Vec<Document>,
    /// Per `open`: fail after yielding this many documents
    failures: Mutex<VecDeque<usize>>,
    opens: AtomicUsize,
    polls: Arc<AtomicUsize>,
}

impl MemoryCollection {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    /// The next cursor opened fails after `after` documents.
    pub fn fail_after(self, after: usize) -> Self {
        lock(&self.failures).push_back(after);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Total cursor `next` calls.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MemoryCollection {
    type Cursor = MemoryCursor;

    async fn count(&self, _collection: &str, _filter: &Document) -> Result<u64, SourceError> {
        Ok(self.documents.len() as u64)
    }

    async fn open(&self, collection: &str, _filter: &Document) -> Result<Self::Cursor, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryCursor {
            collection: collection.to_string(),
            documents: self.documents.clone().into(),
            fail_after: lock(&self.failures).pop_front(),
            yielded: 0,
            polls: Arc::clone(&self.polls),
        })
    }
}

pub struct MemoryCursor {
    collection: String,
    documents: VecDeque<Document>,
    fail_after: Option<usize>,
    yielded: usize,
    polls: Arc<AtomicUsize>,
}

#[async_trait]
impl SnapshotCursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<Document>, SourceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after == Some(self.yielded) {
            return Err(SourceError::Scan {
                collection: self.collection.clone(),
                message: "cursor killed".to_string(),
            });
        }
        let next = self.documents.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }

    async fn close(&mut self) {
        self.documents.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
