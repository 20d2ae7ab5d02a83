//! Statement execution against the sink store.
//!
//! The writer only ever hands complete statement text to a
//! [`StatementExecutor`]. The PostgreSQL implementation serializes execution
//! on a single connection, so concurrently running collection pipelines can
//! share it.

use crate::error::SinkError;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

/// Executes complete SQL statements.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute one statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, SinkError>;

    /// Release the underlying connection. Later `execute` calls fail with
    /// [`SinkError::Closed`].
    async fn close(&self) -> Result<(), SinkError>;
}

/// A single tokio-postgres connection.
pub struct PostgresExecutor {
    client: Mutex<Option<Client>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresExecutor {
    /// Connect using a libpq-style or URL connection string.
    pub async fn connect(connection_string: &str) -> Result<Self, SinkError> {
        info!("Connecting to PostgreSQL");
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

        // Spawn connection handler
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        // Test connection
        client.simple_query("SELECT 1").await?;

        Ok(Self {
            client: Mutex::new(Some(client)),
            connection_task: Mutex::new(Some(connection_task)),
        })
    }
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<u64, SinkError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(SinkError::Closed)?;
        // Extended protocol: a single statement per call, no stacked queries.
        Ok(client.execute(sql, &[]).await?)
    }

    async fn close(&self) -> Result<(), SinkError> {
        // Dropping the client ends the connection future.
        let client = self.client.lock().await.take();
        if client.is_none() {
            return Ok(());
        }
        drop(client);
        if let Some(task) = self.connection_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("PostgreSQL connection task failed: {e}");
            }
        }
        info!("PostgreSQL connection closed");
        Ok(())
    }
}
