// crates/fanout-server/tests/tracked_tasks.rs
use std::time::Duration;

use fanout_server::TrackedTasks;
use tokio::sync::oneshot;
use tokio::time::timeout;

#[tokio::test]
async fn wait_completes_once_tasks_finish() {
    let tasks = TrackedTasks::new();
    let (tx, rx) = oneshot::channel::<()>();

    tasks.spawn(async move {
        let _ = rx.await;
    });
    tasks.close();
    assert_eq!(tasks.len(), 1);

    assert!(timeout(Duration::from_millis(100), tasks.wait()).await.is_err());

    tx.send(()).unwrap();
    timeout(Duration::from_secs(1), tasks.wait()).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn abort_all_drops_stuck_tasks() {
    let tasks = TrackedTasks::new();
    let (held_tx, held_rx) = oneshot::channel::<()>();

    // Never finishes on its own; holds `held_tx` until dropped.
    tasks.spawn(async move {
        let _held = held_tx;
        std::future::pending::<()>().await;
    });
    tasks.close();

    assert!(timeout(Duration::from_millis(100), tasks.wait()).await.is_err());

    tasks.abort_all();
    timeout(Duration::from_secs(1), tasks.wait()).await.unwrap();
    assert!(tasks.is_empty());

    // The task's state was dropped along with it.
    assert!(held_rx.await.is_err());
}

#[tokio::test]
async fn tasks_spawned_after_abort_do_not_run() {
    let tasks = TrackedTasks::new();
    tasks.abort_all();

    let (tx, mut rx) = oneshot::channel::<()>();
    tasks.spawn(async move {
        tokio::task::yield_now().await;
        let _ = tx.send(());
    });
    tasks.close();
    timeout(Duration::from_secs(1), tasks.wait()).await.unwrap();

    assert!(rx.try_recv().is_err());
}
