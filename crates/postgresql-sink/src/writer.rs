//! Applies change events to PostgreSQL tables.
//!
//! [`SinkWriter`] owns statement construction and execution for every table.
//! [`TableWriter`] is a per-binding session that adds the queued-insert
//! buffer, so batched rows of one table can never mix with another's.

use crate::buffer::InsertBuffer;
use crate::error::SinkError;
use crate::executor::StatementExecutor;
use postgresql_types::{
    dml, drop_columns, PostgreSQLDdl, SinkValue, ToDdl, ValueTranslator, DEFAULT_IGNORED_COLUMNS,
};
use std::sync::Arc;
use sync_core::{ChangeEvent, SharedBinding, TableBinding};
use tracing::{debug, warn};

/// Result of applying one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A statement ran, affecting this many rows.
    Executed(u64),
    /// The row was queued and no statement ran.
    Buffered,
    /// Nothing to do; a warning has been logged where relevant.
    Skipped,
}

/// How an insert is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Append to the insert buffer instead of writing immediately.
    pub use_queue: bool,
    /// Last row of a bounded scan: flush whatever is buffered.
    pub force_send: bool,
}

impl InsertOptions {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn queued(force_send: bool) -> Self {
        Self {
            use_queue: true,
            force_send,
        }
    }

    /// Queued mode is selected by either flag.
    pub fn is_queued(&self) -> bool {
        self.use_queue || self.force_send
    }
}

/// Statement construction and execution over a shared executor.
pub struct SinkWriter<E> {
    executor: Arc<E>,
    translator: ValueTranslator,
    ignored_columns: Arc<[String]>,
}

impl<E> Clone for SinkWriter<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            translator: self.translator,
            ignored_columns: Arc::clone(&self.ignored_columns),
        }
    }
}

impl<E: StatementExecutor> SinkWriter<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            translator: ValueTranslator::default(),
            ignored_columns: DEFAULT_IGNORED_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    pub fn with_translator(mut self, translator: ValueTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    pub fn translator(&self) -> ValueTranslator {
        self.translator
    }

    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored_columns
    }

    async fn run(&self, sql: String) -> Result<u64, SinkError> {
        debug!("{}", sql);
        self.executor.execute(&sql).await
    }

    /// Issue `CREATE TABLE` for the binding's table.
    pub async fn create_table(
        &self,
        binding: &TableBinding,
        if_not_exists: bool,
    ) -> Result<(), SinkError> {
        let sql = PostgreSQLDdl.to_create_table(&binding.table, &binding.schema, if_not_exists);
        self.run(sql).await?;
        Ok(())
    }

    /// Single-row insert, executed immediately.
    pub async fn insert(
        &self,
        binding: &TableBinding,
        mut values: Vec<SinkValue>,
    ) -> Result<ApplyOutcome, SinkError> {
        drop_columns(&mut values, &self.ignored_columns[..]);
        if values.is_empty() {
            warn!(
                "Skipping insert into '{}': no values match the table schema",
                binding.table
            );
            return Ok(ApplyOutcome::Skipped);
        }
        let sql = dml::insert_statement(&binding.table, &values)?;
        Ok(ApplyOutcome::Executed(self.run(sql).await?))
    }

    /// One multi-row insert over the full declared schema.
    pub async fn insert_rows(
        &self,
        binding: &TableBinding,
        rows: &[Vec<SinkValue>],
    ) -> Result<ApplyOutcome, SinkError> {
        if rows.is_empty() {
            return Ok(ApplyOutcome::Skipped);
        }
        let sql = dml::insert_rows_statement(&binding.table, &binding.schema, rows)?;
        Ok(ApplyOutcome::Executed(self.run(sql).await?))
    }

    /// `UPDATE .. SET .. WHERE ..`, with each unset column written as NULL.
    ///
    /// An empty `set` (after ignored columns are removed) is a no-op that logs
    /// a warning, whatever `unset` contains.
    pub async fn update(
        &self,
        binding: &TableBinding,
        mut set: Vec<SinkValue>,
        unset: &[String],
        identity: &[SinkValue],
    ) -> Result<ApplyOutcome, SinkError> {
        drop_columns(&mut set, &self.ignored_columns[..]);
        if set.is_empty() {
            warn!("Trying to update without fields on '{}'", binding.table);
            return Ok(ApplyOutcome::Skipped);
        }
        if identity.is_empty() {
            warn!(
                "Skipping update on '{}': identity predicate matches no column",
                binding.table
            );
            return Ok(ApplyOutcome::Skipped);
        }
        let unset: Vec<String> = unset
            .iter()
            .filter(|name| binding.schema.contains(name) && !self.is_ignored(name))
            .cloned()
            .collect();
        let sql = dml::update_statement(&binding.table, &set, &unset, identity)?;
        Ok(ApplyOutcome::Executed(self.run(sql).await?))
    }

    /// `DELETE FROM .. WHERE ..`
    pub async fn delete(
        &self,
        binding: &TableBinding,
        identity: &[SinkValue],
    ) -> Result<ApplyOutcome, SinkError> {
        if identity.is_empty() {
            warn!(
                "Skipping delete on '{}': identity predicate matches no column",
                binding.table
            );
            return Ok(ApplyOutcome::Skipped);
        }
        let sql = dml::delete_statement(&binding.table, identity)?;
        Ok(ApplyOutcome::Executed(self.run(sql).await?))
    }

    /// Open a per-table session with its own insert buffer.
    pub fn session(&self, binding: SharedBinding, buffer_limit: usize) -> TableWriter<E> {
        TableWriter {
            writer: self.clone(),
            binding,
            buffer: InsertBuffer::new(buffer_limit),
        }
    }

    /// Close the underlying connection.
    pub async fn close(&self) -> Result<(), SinkError> {
        self.executor.close().await
    }

    fn is_ignored(&self, column: &str) -> bool {
        self.ignored_columns.iter().any(|c| c == column)
    }
}

/// Writer session for one table binding.
pub struct TableWriter<E> {
    writer: SinkWriter<E>,
    binding: SharedBinding,
    buffer: InsertBuffer,
}

impl<E: StatementExecutor> TableWriter<E> {
    pub fn binding(&self) -> &TableBinding {
        &self.binding
    }

    /// Rows waiting in the insert buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Insert one row, directly or through the buffer.
    ///
    /// In queued mode the buffer is flushed as one multi-row statement when it
    /// reaches its limit, or when `force_send` is set and anything is pending.
    pub async fn insert(
        &mut self,
        mut values: Vec<SinkValue>,
        options: InsertOptions,
    ) -> Result<ApplyOutcome, SinkError> {
        if !options.is_queued() {
            return self.writer.insert(&self.binding, values).await;
        }

        drop_columns(&mut values, self.writer.ignored_columns());
        if values.is_empty() {
            warn!(
                "Skipping insert into '{}': no values match the table schema",
                self.binding.table
            );
        } else {
            self.buffer.push(values);
        }

        if self.buffer.is_due(options.force_send) {
            self.flush().await
        } else if self.buffer.is_empty() {
            Ok(ApplyOutcome::Skipped)
        } else {
            Ok(ApplyOutcome::Buffered)
        }
    }

    /// Write out any buffered rows. The buffer is empty afterwards even if the
    /// statement fails.
    pub async fn flush(&mut self) -> Result<ApplyOutcome, SinkError> {
        if self.buffer.is_empty() {
            return Ok(ApplyOutcome::Skipped);
        }
        let rows = self.buffer.drain();
        debug!(
            "Flushing {} buffered rows into '{}'",
            rows.len(),
            self.binding.table
        );
        self.writer.insert_rows(&self.binding, &rows).await
    }

    pub async fn update(
        &self,
        set: Vec<SinkValue>,
        unset: &[String],
        identity: &[SinkValue],
    ) -> Result<ApplyOutcome, SinkError> {
        self.writer.update(&self.binding, set, unset, identity).await
    }

    pub async fn delete(&self, identity: &[SinkValue]) -> Result<ApplyOutcome, SinkError> {
        self.writer.delete(&self.binding, identity).await
    }

    /// Translate a change event against the binding's schema and run the
    /// matching operation. Control and unsupported events are skipped.
    pub async fn apply(
        &mut self,
        event: &ChangeEvent,
        options: InsertOptions,
    ) -> Result<ApplyOutcome, SinkError> {
        let translator = self.writer.translator();
        let schema = &self.binding.schema;
        match event {
            ChangeEvent::Insert { document, .. } => {
                let values = translator.translate(document, schema);
                self.insert(values, options).await
            }
            ChangeEvent::Update {
                set,
                unset,
                identity,
                ..
            } => {
                let set = translator.translate(set, schema);
                let identity = translator.translate(identity, schema);
                self.update(set, unset, &identity).await
            }
            ChangeEvent::Delete { identity, .. } => {
                let identity = translator.translate(identity, schema);
                self.delete(&identity).await
            }
            ChangeEvent::Unsupported { operation, .. } => {
                debug!(
                    "Ignoring unsupported '{}' change on '{}'",
                    operation, self.binding.collection
                );
                Ok(ApplyOutcome::Skipped)
            }
            ChangeEvent::Control(_) => Ok(ApplyOutcome::Skipped),
        }
    }
}
