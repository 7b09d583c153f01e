//! Refresh scheduler timing tests on tokio's paused clock

mod common;

use common::{settle, FakeSupervisor};
use kvmwatch::store::{LoadStatus, RefreshScheduler};
use std::time::Duration;
use tokio::time::sleep;

const TEN: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_ticks_fetch_silently() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let store = supervisor.store();
    let mut scheduler = RefreshScheduler::new(store.clone());

    scheduler.start_auto_refresh(TEN);
    sleep(Duration::from_secs(25)).await;
    settle().await;

    assert_eq!(supervisor.count("/vms"), 2);
    let state = store.state();
    assert_eq!(state.resources().len(), 2);
    // background fetches never touch the visible status
    assert_eq!(state.resources.status(), LoadStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_cancels_previous_timer() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let mut scheduler = RefreshScheduler::new(supervisor.store());

    scheduler.start_auto_refresh(TEN);
    sleep(Duration::from_secs(5)).await;
    scheduler.start_auto_refresh(TEN);

    // restarted at 5s: ticks at 15s, 25s, 35s
    sleep(Duration::from_secs(35)).await;
    settle().await;

    assert_eq!(supervisor.count("/vms"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_ticks() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let mut scheduler = RefreshScheduler::new(supervisor.store());

    scheduler.start_auto_refresh(TEN);
    sleep(Duration::from_secs(25)).await;
    settle().await;
    scheduler.stop_auto_refresh();
    scheduler.stop_auto_refresh();

    sleep(Duration::from_secs(100)).await;
    settle().await;

    assert_eq!(supervisor.count("/vms"), 2);
    assert!(!scheduler.is_auto_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_stop_does_not_abort_in_flight_fetch() {
    let supervisor = FakeSupervisor::new(Duration::from_secs(3));
    let store = supervisor.store();
    let mut scheduler = RefreshScheduler::new(store.clone());

    scheduler.start_auto_refresh(TEN);
    sleep(Duration::from_secs(11)).await;
    assert_eq!(supervisor.count("/vms"), 1);
    assert!(store.state().resources().is_empty());

    scheduler.stop_auto_refresh();
    sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(store.state().resources().len(), 2);
    assert_eq!(supervisor.count("/vms"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_changed_interval_takes_effect() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let mut scheduler = RefreshScheduler::new(supervisor.store());

    scheduler.start_auto_refresh(TEN);
    sleep(Duration::from_secs(11)).await;
    settle().await;
    assert_eq!(supervisor.count("/vms"), 1);

    // restarted at 11s: ticks at 13s, 15s, 17s, 19s
    scheduler.start_auto_refresh(Duration::from_secs(2));
    sleep(Duration::from_secs(9)).await;
    settle().await;

    assert_eq!(supervisor.count("/vms"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_polling_updates_selected_vm() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let store = supervisor.store();
    let mut scheduler = RefreshScheduler::new(store.clone());

    store.fetch_detail("alpha").await;
    assert_eq!(store.state().metrics.unwrap().cpu_percent, 1.0);

    scheduler.start_metrics_polling("alpha", Duration::from_secs(2));
    sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(supervisor.count("/vm/alpha/metrics"), 3);
    assert_eq!(store.state().metrics.unwrap().cpu_percent, 3.0);
    assert!(!scheduler.is_auto_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_metrics_for_deselected_vm_are_discarded() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let store = supervisor.store();
    let mut scheduler = RefreshScheduler::new(store.clone());

    store.fetch_detail("alpha").await;
    scheduler.start_metrics_polling("alpha", Duration::from_secs(2));
    store.clear_selection();

    sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(supervisor.count("/vm/alpha/metrics"), 3);
    assert!(store.state().metrics.is_none());

    scheduler.stop_metrics_polling();
    assert!(!scheduler.is_polling_metrics());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scheduler_stops_timers() {
    let supervisor = FakeSupervisor::new(Duration::ZERO);
    let mut scheduler = RefreshScheduler::new(supervisor.store());

    scheduler.start_auto_refresh(TEN);
    scheduler.start_metrics_polling("alpha", Duration::from_secs(2));
    drop(scheduler);

    sleep(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(supervisor.count("/vms"), 0);
    assert_eq!(supervisor.count("/vm/alpha/metrics"), 0);
}
