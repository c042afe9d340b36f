//! Cancellable interval task used by streaming endpoints.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs `tick` every `period` until stopped.
///
/// The task stops when the handle is dropped, when the parent token is
/// cancelled, or when `tick` returns `false`.
pub struct PeriodicTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn on the current runtime. The first tick fires after one `period`.
    pub fn spawn<F, Fut>(parent: &CancellationToken, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = parent.child_token();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // skip first immediate tick

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Periodic task stopped");
        });
        Self {
            token,
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop and wait for the task to exit.
    #[cfg(test)]
    async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
