use crate::{Error, Result, SessionStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A background task that periodically evicts idle and expired sessions from a store.
///
/// Each tick calls [`SessionStore::gc`]. A failed sweep is logged, and the next tick sweeps again.
/// The reaper stops when it is [stopped](Reaper::stop), [shut down](Reaper::shutdown) or dropped.
///
/// Must be spawned from within a tokio runtime.
#[derive(Debug)]
pub struct Reaper {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawn a reaper that sweeps `store` every `interval`.
    /// The first sweep happens after one `interval` has passed.
    ///
    /// Returns [`Error::InvalidConfig`] if `interval` is zero.
    pub fn spawn<Store: SessionStore + ?Sized>(
        store: Arc<Store>,
        interval: std::time::Duration,
        idle_expiration: Duration,
        absolute_expiration: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidConfig("the reaper interval must not be zero"));
        }
        let cancellation_token = CancellationToken::new();
        let cancelled = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match store.gc(idle_expiration, absolute_expiration).await {
                    Ok(0) => log::trace!("Session sweep found no expired sessions"),
                    Ok(deleted) => log::debug!("Session sweep deleted {deleted} expired sessions"),
                    Err(error) => log::error!("Session sweep failed: {error:#}"),
                }
            }
            log::debug!("Session reaper stopped");
        });

        Ok(Self {
            cancellation_token,
            handle: Some(handle),
        })
    }

    /// Signal the reaper to stop after its current sweep.
    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    /// Returns true if the reaper was signalled to stop.
    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Stop the reaper and wait until its task has finished.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                log::error!("Session reaper task failed: {error}");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
