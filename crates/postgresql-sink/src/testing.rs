//! In-memory executor for tests.

use crate::error::SinkError;
use crate::executor::StatementExecutor;
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every statement instead of running it.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    statements: Mutex<Vec<String>>,
    fail_matching: Mutex<Option<String>>,
    closed: Mutex<bool>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement containing `fragment` fail.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        *lock(&self.fail_matching) = Some(fragment.into());
    }

    /// Statements executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.closed)
    }
}

#[async_trait]
impl StatementExecutor for MemoryExecutor {
    async fn execute(&self, sql: &str) -> Result<u64, SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        if let Some(fragment) = lock(&self.fail_matching).as_deref() {
            if sql.contains(fragment) {
                return Err(SinkError::Execution(format!("rejected: {sql}")));
            }
        }
        lock(&self.statements).push(sql.to_string());
        Ok(1)
    }

    async fn close(&self) -> Result<(), SinkError> {
        *lock(&self.closed) = true;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
