//! Refresh scheduler
//!
//! Two independent periodic timers: one re-fetches the VM list, the other
//! polls live metrics of a single VM. Every tick runs its fetch as a task of
//! its own, so stopping a timer never cuts short a fetch already under way.

use super::SyncStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub struct RefreshScheduler {
    store: SyncStore,
    list_timer: Option<JoinHandle<()>>,
    metrics_timer: Option<(String, JoinHandle<()>)>,
}

impl RefreshScheduler {
    pub fn new(store: SyncStore) -> Self {
        Self {
            store,
            list_timer: None,
            metrics_timer: None,
        }
    }

    /// Silently re-fetch the VM list every `period`, first tick one period
    /// from now. Replaces any running list timer.
    pub fn start_auto_refresh(&mut self, period: Duration) {
        self.stop_auto_refresh();
        tracing::info!("Auto-refresh every {:?}", period);

        let store = self.store.clone();
        self.list_timer = Some(spawn_timer(period, move || {
            let store = store.clone();
            async move { store.fetch_resources(true).await }
        }));
    }

    pub fn stop_auto_refresh(&mut self) {
        if let Some(handle) = self.list_timer.take() {
            handle.abort();
            tracing::info!("Auto-refresh stopped");
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.list_timer.is_some()
    }

    /// Poll metrics of `name` every `period`. Replaces any running poll,
    /// whichever VM it was for.
    pub fn start_metrics_polling(&mut self, name: &str, period: Duration) {
        self.stop_metrics_polling();
        tracing::debug!("Polling metrics of {} every {:?}", name, period);

        let store = self.store.clone();
        let vm = name.to_string();
        let handle = spawn_timer(period, move || {
            let store = store.clone();
            let vm = vm.clone();
            async move { store.refresh_metrics(&vm).await }
        });
        self.metrics_timer = Some((name.to_string(), handle));
    }

    pub fn stop_metrics_polling(&mut self) {
        if let Some((name, handle)) = self.metrics_timer.take() {
            handle.abort();
            tracing::debug!("Stopped polling metrics of {}", name);
        }
    }

    /// VM whose metrics are being polled
    pub fn polled_vm(&self) -> Option<&str> {
        self.metrics_timer.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn is_polling_metrics(&self) -> bool {
        self.metrics_timer.is_some()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop_auto_refresh();
        self.stop_metrics_polling();
    }
}

fn spawn_timer<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            tokio::spawn(tick());
        }
    })
}
