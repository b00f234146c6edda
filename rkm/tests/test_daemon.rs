use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rkm::daemon::{DaemonOptions, VolumeDaemon};
use rkm::source::{FnSource, StaticSource};

use crate::common::{FakeNas, SharedGroups, mount_group, shared_groups};

mod common;

fn fast_options() -> DaemonOptions {
    DaemonOptions {
        check_interval: Duration::from_secs(5),
        startup_poll_interval: Duration::from_millis(10),
    }
}

fn shared_daemon(nas: &Arc<FakeNas>, groups: &SharedGroups, verify: bool) -> VolumeDaemon {
    let groups = groups.clone();
    let source = FnSource(move || groups.lock().unwrap().clone());
    VolumeDaemon::new(fast_options(), Arc::new(source), nas.context(verify))
}

#[tokio::test]
async fn test_failover_and_failback() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("y");
    let target_str = target.to_string_lossy().to_string();
    let nas = FakeNas::new(&["nas-a", "nas-b"]);
    // even host number -> nas-a is the default
    let group = mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &target);
    let daemon = VolumeDaemon::new(
        fast_options(),
        Arc::new(StaticSource(vec![group])),
        nas.context(false),
    );

    daemon.reconcile_once().await;
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-a/share"));
    assert!(target.is_dir());

    daemon.reconcile_once().await;
    let status = daemon.statuses().await.remove(0);
    assert_eq!(status.server, "nas-a");
    assert!(status.healthy && status.mounted);
    assert_eq!(nas.mounts_of("nas-a"), 1);

    nas.set_healthy("nas-a", false);
    daemon.reconcile_once().await;
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-b/share"));
    let slot = daemon.proxy("Y").await.unwrap();
    assert_eq!(slot.lock().await.server(), "nas-b");

    // default still down: stay on nas-b
    nas.clear_calls();
    daemon.reconcile_once().await;
    assert_eq!(nas.count("mount "), 0);
    assert_eq!(nas.count("umount "), 0);
    assert!(!slot.lock().await.is_on_default());

    nas.set_healthy("nas-a", true);
    daemon.reconcile_once().await;
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-a/share"));
    let proxy = slot.lock().await;
    assert!(proxy.is_on_default());
    assert_eq!(proxy.server(), "nas-a");
}

#[tokio::test]
async fn test_silent_server_fails_over() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("y");
    let target_str = target.to_string_lossy().to_string();
    let nas = FakeNas::new(&["nas-a", "nas-b"]);
    let group = mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &target);
    let daemon = VolumeDaemon::new(
        fast_options(),
        Arc::new(StaticSource(vec![group])),
        nas.context(false),
    );

    daemon.reconcile_once().await;
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-a/share"));

    // answers neither yes nor no within the probe window
    nas.silence("nas-a");
    tokio::time::timeout(Duration::from_secs(5), daemon.reconcile_once())
        .await
        .unwrap();
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-b/share"));
    let status = daemon.statuses().await.remove(0);
    assert_eq!(status.server, "nas-a");
    assert!(!status.healthy);
}

#[tokio::test]
async fn test_odd_node_prefers_second_server() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("y");
    let nas = FakeNas::new(&["nas-a", "nas-b"]);
    let group = mount_group("Y", "10.20.0.13", &["nas-a", "nas-b"], &target);
    let daemon = VolumeDaemon::new(
        fast_options(),
        Arc::new(StaticSource(vec![group])),
        nas.context(false),
    );

    daemon.reconcile_once().await;
    assert_eq!(
        nas.mounted_source(&target.to_string_lossy()).as_deref(),
        Some("//nas-b/share")
    );
    assert_eq!(nas.mounts_of("nas-a"), 0);
}

#[tokio::test]
async fn test_unchanged_config_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a", "nas-b"]);
    let groups = shared_groups(vec![mount_group(
        "Y",
        "10.20.0.12",
        &["nas-a", "nas-b"],
        &dir.path().join("y"),
    )]);
    let daemon = shared_daemon(&nas, &groups, false);

    assert!(daemon.refresh().await);
    let before = daemon.proxy("Y").await.unwrap();
    nas.clear_calls();

    assert!(!daemon.refresh().await);
    // an equal but freshly built list is still the same configuration
    let rebuilt = groups.lock().unwrap().clone();
    *groups.lock().unwrap() = rebuilt;
    assert!(!daemon.refresh().await);

    let after = daemon.proxy("Y").await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(nas.calls().is_empty());
}

#[tokio::test]
async fn test_added_group_keeps_existing_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a", "nas-b", "nas-c"]);
    let y = mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &dir.path().join("y"));
    let groups = shared_groups(vec![y.clone()]);
    let daemon = shared_daemon(&nas, &groups, false);

    daemon.reconcile_once().await;
    let before = daemon.proxies().await;
    nas.clear_calls();

    let z = mount_group("Z", "10.20.0.12", &["nas-c"], &dir.path().join("z"));
    *groups.lock().unwrap() = vec![y, z];
    assert!(daemon.refresh().await);

    let after = daemon.proxies().await;
    assert_eq!(after.len(), 2);
    assert!(Arc::ptr_eq(&before["Y"], &after["Y"]));
    let created: Vec<&String> = after.keys().filter(|k| !before.contains_key(*k)).collect();
    assert_eq!(created, vec!["Z"]);
    assert_eq!(nas.count("umount "), 0);
}

#[tokio::test]
async fn test_removed_group_is_unmounted_once() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a", "nas-b", "nas-c"]);
    let y = mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &dir.path().join("y"));
    let z_target = dir.path().join("z");
    let z = mount_group("Z", "10.20.0.12", &["nas-c"], &z_target);
    let groups = shared_groups(vec![y.clone(), z]);
    let daemon = shared_daemon(&nas, &groups, false);

    daemon.reconcile_once().await;
    let z_target = z_target.to_string_lossy().to_string();
    assert_eq!(nas.mounted_source(&z_target).as_deref(), Some("//nas-c/share"));
    nas.clear_calls();

    *groups.lock().unwrap() = vec![y];
    assert!(daemon.refresh().await);

    assert_eq!(nas.calls(), vec![format!("umount {z_target}")]);
    assert!(nas.mounted_source(&z_target).is_none());
    assert!(daemon.proxy("Z").await.is_none());
    assert!(daemon.proxy("Y").await.is_some());
}

#[tokio::test]
async fn test_changed_group_replaces_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("y");
    let target_str = target.to_string_lossy().to_string();
    let nas = FakeNas::new(&["nas-a", "nas-b", "nas-c"]);
    let groups = shared_groups(vec![mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &target)]);
    let daemon = shared_daemon(&nas, &groups, false);

    daemon.reconcile_once().await;
    let before = daemon.proxy("Y").await.unwrap();
    nas.clear_calls();

    *groups.lock().unwrap() = vec![mount_group("Y", "10.20.0.12", &["nas-c", "nas-b"], &target)];
    daemon.reconcile_once().await;

    let after = daemon.proxy("Y").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(!before.lock().await.claims_mounted());
    assert_eq!(nas.mounted_source(&target_str).as_deref(), Some("//nas-c/share"));
}

#[tokio::test]
async fn test_empty_config_keeps_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a"]);
    let y = mount_group("Y", "10.20.0.12", &["nas-a"], &dir.path().join("y"));
    let groups = shared_groups(vec![y]);
    let daemon = shared_daemon(&nas, &groups, false);

    daemon.reconcile_once().await;
    nas.clear_calls();

    groups.lock().unwrap().clear();
    assert!(!daemon.refresh().await);
    assert_eq!(daemon.proxies().await.len(), 1);
    assert_eq!(nas.count("umount "), 0);
}

#[tokio::test]
async fn test_invalid_group_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a"]);
    let mut empty = mount_group("X", "10.20.0.12", &["nas-a"], &dir.path().join("x"));
    empty.volumes.clear();
    let groups = shared_groups(vec![
        empty,
        mount_group("Y", "10.20.0.12", &["nas-a"], &dir.path().join("y")),
    ]);
    let daemon = shared_daemon(&nas, &groups, false);

    assert!(daemon.refresh().await);
    let proxies = daemon.proxies().await;
    assert_eq!(proxies.len(), 1);
    assert!(proxies.contains_key("Y"));
}

#[tokio::test]
async fn test_failed_mount_is_retried_not_failed_over() {
    for verify in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("y");
        let nas = FakeNas::new(&["nas-a", "nas-b"]);
        nas.break_mounts(true);
        let y = mount_group("Y", "10.20.0.12", &["nas-a", "nas-b"], &target);
        let groups = shared_groups(vec![y]);
        let daemon = shared_daemon(&nas, &groups, verify);

        daemon.reconcile_once().await;
        daemon.reconcile_once().await;
        assert_eq!(nas.mounts_of("nas-a"), 2);
        assert_eq!(nas.mounts_of("nas-b"), 0);

        nas.break_mounts(false);
        daemon.reconcile_once().await;
        assert!(daemon.is_converged().await);
        assert_eq!(
            nas.mounted_source(&target.to_string_lossy()).as_deref(),
            Some("//nas-a/share")
        );
    }
}

#[tokio::test]
async fn test_start_waits_for_convergence() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&[]);
    let groups = shared_groups(vec![mount_group(
        "Y",
        "10.20.0.12",
        &["nas-a", "nas-b"],
        &dir.path().join("y"),
    )]);
    let daemon = shared_daemon(&nas, &groups, false);

    let recover = nas.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        recover.set_healthy("nas-a", true);
    });

    let handle = tokio::time::timeout(Duration::from_secs(5), daemon.start())
        .await
        .unwrap();
    let statuses = daemon.statuses().await;
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].healthy && statuses[0].mounted);
    assert!(!handle.is_finished());

    daemon.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_during_startup() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&[]);
    let y = mount_group("Y", "10.20.0.12", &["nas-a"], &dir.path().join("y"));
    let groups = shared_groups(vec![y]);
    let daemon = shared_daemon(&nas, &groups, false);

    let stopper = daemon.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.shutdown();
    });

    let handle = tokio::time::timeout(Duration::from_secs(5), daemon.start())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(!daemon.is_converged().await);
}

#[tokio::test]
async fn test_panicking_cycle_is_survived() {
    let dir = tempfile::tempdir().unwrap();
    let nas = FakeNas::new(&["nas-a"]);
    let group = mount_group("Y", "10.20.0.12", &["nas-a"], &dir.path().join("y"));
    let first = Arc::new(AtomicBool::new(true));
    let source = FnSource(move || {
        if first.swap(false, Ordering::SeqCst) {
            panic!("mount source exploded");
        }
        vec![group.clone()]
    });
    let daemon = VolumeDaemon::new(fast_options(), Arc::new(source), nas.context(false));

    let handle = tokio::time::timeout(Duration::from_secs(5), daemon.start())
        .await
        .unwrap();
    assert!(daemon.is_converged().await);
    daemon.shutdown();
    handle.await.unwrap();
}
