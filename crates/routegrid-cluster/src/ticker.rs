//! Ticker — background task that runs a job, sleeps, and repeats.
//!
//! The next run is scheduled only after the current one has finished, and the
//! sleep length is re-read before every wait so updated settings apply to the
//! next scheduling decision without interrupting a run in progress.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running ticker. Cancelling it is the only way to stop the loop.
pub struct Ticker {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Ticker {
    /// Spawn a ticker that runs `tick` immediately, then every `period()`.
    pub fn spawn<T, Fut, P>(mut tick: T, period: P) -> Self
    where
        T: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        P: Fn() -> Duration + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tick().await;

                let wait = period();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown_rx.changed() => {
                        debug!("ticker shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A run already in progress is allowed to finish.
    pub async fn cancel(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }

    /// Stop the loop without waiting, dropping any run in progress.
    pub fn abort(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}
