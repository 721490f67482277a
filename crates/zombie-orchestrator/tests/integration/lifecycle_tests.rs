//! Teardown: idempotent `stop`, failure policy and the global timeout watchdog.

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use zombie_orchestrator::{Credentials, Error, LaunchOptions, NetworkState};

use crate::harness::{Call, config, orchestrator, remove_workspace};

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (orchestrator, state) = orchestrator();
    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice", "bob"], 60),
            LaunchOptions::default(),
        )
        .await
        .unwrap();

    network.stop().await.unwrap();
    network.stop().await.unwrap();
    network.clone().stop().await.unwrap();

    assert!(network.is_stopped());
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
    assert!(matches!(
        network.mark_launched(),
        Err(Error::AlreadyStopped { .. })
    ));
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_monitoring_network_stops() {
    let (orchestrator, state) = orchestrator();
    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions {
                monitor: true,
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(network.state(), NetworkState::Monitoring);

    network.stop().await.unwrap();
    assert!(network.is_stopped());
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_failed_launch_is_torn_down_without_hook() {
    let (orchestrator, state) = orchestrator();
    state.nodes_die.store(true, Ordering::SeqCst);

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NodeVerification { .. }), "{err:?}");
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
}

#[tokio::test]
async fn test_failed_launch_is_left_to_hook_owner() {
    let (orchestrator, state) = orchestrator();
    state.nodes_die.store(true, Ordering::SeqCst);
    let captured = Arc::new(OnceLock::new());

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions::default().on_network({
                let captured = captured.clone();
                move |network| {
                    let _ = captured.set(network);
                }
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NodeVerification { .. }), "{err:?}");
    assert!(!state.called(&Call::DestroyNamespace));

    let network = captured.get().unwrap();
    assert_eq!(network.state(), NetworkState::Launching);
    network.stop().await.unwrap();
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_global_timeout_interrupts_launch() {
    let (orchestrator, state) = orchestrator();
    state.hang_create_namespace.store(true, Ordering::SeqCst);
    let captured = Arc::new(OnceLock::new());

    let started = Instant::now();
    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 1),
            LaunchOptions::default().on_network({
                let captured = captured.clone();
                move |network| {
                    let _ = captured.set(network);
                }
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GlobalTimeout { secs: 1 }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));

    // the network never launched, and teardown is left to the holder of the handle
    let network = captured.get().unwrap();
    assert_eq!(network.state(), NetworkState::Launching);
    assert!(!state.called(&Call::DestroyNamespace));
    assert!(!state.called(&Call::SetupChainSpec));
    assert!(state.requests().is_empty());

    network.stop().await.unwrap();
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_global_timeout_without_hook() {
    let (orchestrator, state) = orchestrator();
    state.hang_create_namespace.store(true, Ordering::SeqCst);

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 1),
            LaunchOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GlobalTimeout { secs: 1 }), "{err:?}");
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
}

#[tokio::test]
async fn test_global_timeout_dumps_logs_before_release() {
    let (orchestrator, state) = orchestrator();
    state.spawn_delay_ms.store(700, Ordering::SeqCst);
    // bob refers to alice, so the two are spawned one after the other
    let mut config = config(&["alice", "bob"], 1);
    config.relaychain.nodes[1].args = vec!["{{ZOMBIE:alice:multiaddr}}".to_string()];

    let err = orchestrator
        .start(&Credentials::default(), config, LaunchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GlobalTimeout { secs: 1 }), "{err:?}");
    let dump = state.position(&Call::DumpLogs("alice".to_string())).unwrap();
    let destroy = state.position(&Call::DestroyNamespace).unwrap();
    assert!(dump < destroy, "{:?}", state.calls());
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
}
