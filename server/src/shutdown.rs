//! Controlled shutdown: stop accepting, then evict whatever was admitted.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::AppState;
use crate::ws::actor;

/// Close code sent to every client when the server stops on purpose.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Fan-out stop signal for the listeners.
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Future resolving once [`trigger`](Self::trigger) has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Stop the listeners, wait up to `drain` for them to exit (aborting the
/// stragglers), then evict every local connection. Returns how many were
/// evicted.
///
/// Eviction runs last: a listener still accepting could admit and register a
/// connection after the table was drained.
pub async fn wind_down(
    state: &AppState,
    signal: &ShutdownSignal,
    listeners: &mut [JoinHandle<()>],
    drain: Duration,
) -> usize {
    signal.trigger();

    let drained = tokio::time::timeout(drain, async {
        for listener in listeners.iter_mut() {
            if !listener.is_finished() {
                let _ = listener.await;
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Listeners did not stop in time, aborting");
        for listener in listeners.iter() {
            listener.abort();
        }
    }

    actor::evict_all(state, CLOSE_GOING_AWAY, "server shutting down").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = tokio::spawn(signal.wait());

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_created_after_trigger_resolves() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("late waiter should resolve");
    }
}
