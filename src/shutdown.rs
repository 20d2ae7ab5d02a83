//! Signal handling.

use anyhow::Context;
use postgresql_sink::SinkError;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on Ctrl+C, or SIGTERM on unix.
pub fn setup_shutdown_handler(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            signal = wait_for_signal() => {
                if let Err(e) = signal {
                    error!("Failed to install signal handler: {e}");
                    return;
                }
            }
        }
        info!("Received shutdown signal, stopping");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Close the sink, then shut the source down even if the sink failed to close.
pub async fn release_connections<S, M>(sink: S, source: M) -> anyhow::Result<()>
where
    S: Future<Output = Result<(), SinkError>>,
    M: Future<Output = ()>,
{
    let closed = sink.await;
    source.await;
    closed.context("Failed to close the PostgreSQL connection")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_source_shuts_down_after_sink_close_failure() {
        let source_closed = AtomicBool::new(false);

        let result = release_connections(async { Err(SinkError::Closed) }, async {
            source_closed.store(true, Ordering::SeqCst);
        })
        .await;

        assert!(source_closed.load(Ordering::SeqCst));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to close the PostgreSQL connection"));
        assert!(message.contains("Sink connection is closed"));
    }

    #[tokio::test]
    async fn test_release_connections_in_order() {
        let sink_closed = AtomicBool::new(false);

        release_connections(
            async {
                sink_closed.store(true, Ordering::SeqCst);
                Ok(())
            },
            async {
                assert!(sink_closed.load(Ordering::SeqCst));
            },
        )
        .await
        .unwrap();
    }
}
