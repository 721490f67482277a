//! The launch sequence: ordering, spawn concurrency, the workspace gate and the access gate.

use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use zombie_orchestrator::workspace::{MAGIC_FILE, ZOMBIE_WRAPPER};
use zombie_orchestrator::{Credentials, Error, LaunchOptions, NetworkState, Scope};
use zombie_types::{NodeConfig, ParachainConfig};

use crate::harness::{Call, ScriptedConfirm, config, orchestrator, remove_workspace};

fn concurrency(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[tokio::test]
async fn test_launch_sequence_order() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("network");

    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice", "bob"], 60),
            LaunchOptions {
                dir: Some(workspace.clone()),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(network.state(), NetworkState::Launched);
    assert_eq!(network.scope(), Scope::Standalone);
    assert_eq!(network.workspace(), workspace);
    assert!(network.namespace().starts_with("zombie-"));
    assert_eq!(network.client().spawn_timeout().as_secs(), 2);

    let access = state.position(&Call::ValidateAccess).unwrap();
    let create = state.position(&Call::CreateNamespace).unwrap();
    let setup = state.position(&Call::SetupChainSpec).unwrap();
    let raw = state.position(&Call::GetChainSpecRaw).unwrap();
    let spawn = state.position(&Call::SpawnNode("alice".to_string())).unwrap();
    assert!(access < create);
    assert!(create < setup);
    assert!(setup < raw);
    assert!(raw < spawn);

    // one --help probe per distinct command
    assert_eq!(state.count(&Call::RunCommand("polkadot".to_string())), 1);

    assert!(workspace.join(MAGIC_FILE).exists());
    let wrapper = std::fs::read_to_string(workspace.join(ZOMBIE_WRAPPER)).unwrap();
    assert!(wrapper.contains(&*workspace.to_string_lossy()));
    assert!(workspace.join("rococo-local-plain.json").exists());
    assert!(workspace.join("rococo-local.json").exists());

    assert_eq!(network.nodes().len(), 2);
    assert!(network.node("alice").is_some());
    assert!(network.node("bob").is_some());

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_references_force_serial_spawning() {
    let (orchestrator, state) = orchestrator();
    state.spawn_delay_ms.store(50, Ordering::SeqCst);

    let mut config = config(&["alice", "bob", "charlie", "dave"], 60);
    config.relaychain.nodes[3].args =
        vec!["--reserved-nodes={{ZOMBIE:alice:multiaddr}}".to_string()];

    let network = orchestrator
        .start(
            &Credentials::default(),
            config,
            LaunchOptions {
                spawn_concurrency: concurrency(4),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(state.max_in_flight(), 1);

    // spawn order is the declaration order when spawning serially
    let order: Vec<_> = state.requests().into_iter().map(|r| r.name).collect();
    assert_eq!(order, ["alice", "bob", "charlie", "dave"]);

    // the reference resolved to alice's multiaddr
    let alice = network.node("alice").unwrap();
    let dave = state.request("dave");
    assert!(
        dave.args
            .contains(&format!("--reserved-nodes={}", alice.multiaddr())),
        "{:?}",
        dave.args
    );

    network.stop().await.unwrap();
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_concurrency_passes_through_without_references() {
    let (orchestrator, state) = orchestrator();
    state.spawn_delay_ms.store(200, Ordering::SeqCst);

    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice", "bob", "charlie", "dave"], 60),
            LaunchOptions {
                spawn_concurrency: concurrency(4),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(state.max_in_flight(), 4);
    assert_eq!(network.nodes().len(), 4);

    network.stop().await.unwrap();
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_concurrency_is_bounded_by_request() {
    let (orchestrator, state) = orchestrator();
    state.spawn_delay_ms.store(100, Ordering::SeqCst);

    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice", "bob", "charlie", "dave"], 60),
            LaunchOptions {
                spawn_concurrency: concurrency(2),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(state.max_in_flight(), 2);

    network.stop().await.unwrap();
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_declined_reuse_touches_nothing() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    let prompt = ScriptedConfirm::new(false);

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions {
                dir: Some(dir.path().to_path_buf()),
                prompt: prompt.clone(),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DirectoryConflict(_)));
    assert!(err.terminates_process());
    assert_eq!(prompt.asked(), 1);
    assert!(state.calls().is_empty(), "{:?}", state.calls());
    assert!(!dir.path().join(MAGIC_FILE).exists());
}

#[tokio::test]
async fn test_slow_reuse_answer_does_not_count_against_the_deadline() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    let prompt = ScriptedConfirm::answering_after(true, Duration::from_millis(1500));

    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 1),
            LaunchOptions {
                dir: Some(dir.path().to_path_buf()),
                prompt: prompt.clone(),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(prompt.asked(), 1);
    assert!(network.is_launched());
    network.stop().await.unwrap();
    assert_eq!(state.count(&Call::DestroyNamespace), 1);
}

#[tokio::test]
async fn test_in_ci_never_prompts() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    let prompt = ScriptedConfirm::new(true);

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions {
                dir: Some(dir.path().to_path_buf()),
                in_ci: true,
                prompt: prompt.clone(),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DirectoryConflict(_)));
    assert_eq!(prompt.asked(), 0);
    assert!(state.calls().is_empty());
}

#[tokio::test]
async fn test_forced_reuse_does_not_prompt() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(MAGIC_FILE), "stale").unwrap();
    let prompt = ScriptedConfirm::new(false);

    let network = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions {
                dir: Some(dir.path().to_path_buf()),
                force: true,
                prompt: prompt.clone(),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(prompt.asked(), 0);
    assert!(network.is_launched());
    assert!(state.called(&Call::CreateNamespace));
    // the magic file is rewritten empty
    assert_eq!(
        std::fs::metadata(dir.path().join(MAGIC_FILE)).unwrap().len(),
        0
    );

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_access_failure_stops_before_namespace() {
    let (orchestrator, state) = orchestrator();
    state.access.store(false, Ordering::SeqCst);

    let err = orchestrator
        .start(
            &Credentials::default(),
            config(&["alice"], 60),
            LaunchOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AccessValidation { .. }));
    assert!(err.terminates_process());
    assert!(state.called(&Call::ValidateAccess));
    assert!(!state.called(&Call::CreateNamespace));
    assert!(!state.called(&Call::DestroyNamespace));
    assert!(state.requests().is_empty());
}

#[tokio::test]
async fn test_hook_receives_network_before_access_check() {
    let (orchestrator, state) = orchestrator();
    state.access.store(false, Ordering::SeqCst);
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
    assert!(matches!(err, Error::AccessValidation { .. }));

    // with a hook, teardown is left to the caller
    let network = captured.get().unwrap();
    assert_eq!(network.state(), NetworkState::Created);
    network.stop().await.unwrap();
    assert!(network.is_stopped());
    assert!(!state.called(&Call::DestroyNamespace));
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_distinct_namespaces() {
    let (orchestrator, state) = orchestrator();
    let credentials = Credentials::default();

    let (a, b) = tokio::join!(
        orchestrator.start(&credentials, config(&["alice"], 60), LaunchOptions::default()),
        orchestrator.start(&credentials, config(&["alice"], 60), LaunchOptions::default()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.namespace(), b.namespace());
    assert_ne!(a.workspace(), b.workspace());

    let inits: Vec<_> = state
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::InitClient(_)))
        .collect();
    assert_eq!(inits.len(), 2);

    for network in [a, b] {
        network.stop().await.unwrap();
        remove_workspace(network.workspace());
    }
}

#[tokio::test]
async fn test_generated_chain_spec_is_customized() {
    let (orchestrator, state) = orchestrator();
    let dir = tempfile::tempdir().unwrap();
    let head = dir.path().join("para-100-head");
    let wasm = dir.path().join("para-100-wasm");
    std::fs::write(&head, "0x1234\n").unwrap();
    std::fs::write(&wasm, "0x5678\n").unwrap();

    let mut config = config(&["alice", "bob"], 60);
    config.parachains.push(ParachainConfig {
        id: 100,
        chain: None,
        register_in_genesis: true,
        genesis_state_path: Some(head),
        genesis_wasm_path: Some(wasm),
        collators: vec![NodeConfig::named("collator-1")],
    });

    let workspace = dir.path().join("network");
    let network = orchestrator
        .start(
            &Credentials::default(),
            config,
            LaunchOptions {
                dir: Some(workspace.clone()),
                ..LaunchOptions::default()
            },
        )
        .await
        .unwrap();

    let raw = std::fs::read_to_string(workspace.join("rococo-local.json")).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let alice = network.node("alice").unwrap();
    assert_eq!(raw["bootNodes"], serde_json::json!([alice.multiaddr()]));
    assert_eq!(
        raw["genesis"]["runtimeGenesis"]["patch"]["paras"]["paras"],
        serde_json::json!([[100, ["0x1234", "0x5678", true]]])
    );

    let collator = network.node("collator-1").unwrap();
    assert_eq!(collator.para_id, Some(100));
    let request = state.request("collator-1").args;
    assert!(request.contains(&"--collator".to_string()));
    let separator = request.iter().position(|a| a == "--").unwrap();
    let raw_path = workspace.join("rococo-local.json");
    assert_eq!(request[separator + 1], "--chain");
    assert_eq!(request[separator + 2], raw_path.to_string_lossy());

    network.stop().await.unwrap();
}

#[tokio::test]
async fn test_env_reference_to_unknown_node_touches_nothing() {
    let (orchestrator, state) = orchestrator();
    let mut config = config(&["alice", "bob"], 60);
    config.relaychain.nodes[1]
        .env
        .insert("PEER".to_string(), "{{ZOMBIE:carol:multiaddr}}".to_string());

    let err = orchestrator
        .start(&Credentials::default(), config, LaunchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SpecCompilation(_)), "{err:?}");
    assert!(state.calls().is_empty(), "{:?}", state.calls());
}

#[tokio::test]
async fn test_env_references_are_resolved() {
    let (orchestrator, state) = orchestrator();
    let mut config = config(&["alice", "bob"], 60);
    config.relaychain.nodes[1]
        .env
        .insert("PEER".to_string(), "{{ZOMBIE:alice:multiaddr}}".to_string());

    let network = orchestrator
        .start(&Credentials::default(), config, LaunchOptions::default())
        .await
        .unwrap();

    let alice = network.node("alice").unwrap();
    assert_eq!(state.request("bob").env["PEER"], alice.multiaddr());
    network.stop().await.unwrap();
    remove_workspace(network.workspace());
}

#[tokio::test]
async fn test_huge_node_spawn_timeout() {
    let (orchestrator, _state) = orchestrator();
    let mut config = config(&["alice"], 60);
    config.settings.node_spawn_timeout = Some(u64::MAX);

    let network = orchestrator
        .start(&Credentials::default(), config, LaunchOptions::default())
        .await
        .unwrap();

    assert!(network.is_launched());
    network.stop().await.unwrap();
    remove_workspace(network.workspace());
}
