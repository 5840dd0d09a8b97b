//! End-to-end flows through the session registry with the offline loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;

use shadow_relay::agent::ProfileEngineFactory;
use shadow_relay::config::{Profile, Provider, RelayConfig};
use shadow_relay::server::{Connection, SessionRegistry};
use shadow_relay::session::{JsonSessionStore, SessionStore};
use shadow_relay::tools::{BashTool, ToolRegistry};

fn create_test_registry(config: RelayConfig, temp: &TempDir) -> Arc<SessionRegistry> {
    let mut tools = ToolRegistry::new();
    tools.register(BashTool::with_working_dir(temp.path()));

    let store = Arc::new(JsonSessionStore::new(temp.path().join("sessions")));
    let factory = Arc::new(ProfileEngineFactory::new(config, tools));
    Arc::new(SessionRegistry::new(factory, store).with_idle_timeout(Duration::from_secs(5)))
}

fn echo_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.profiles.insert(
        "default".into(),
        Profile::new("default")
            .with_provider(Provider::Echo)
            .with_system_prompt("test relay"),
    );
    config
}

async fn next_of_type(rx: &mut mpsc::UnboundedReceiver<String>, kind: &str) -> Value {
    loop {
        let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed");
        let frame: Value = serde_json::from_str(&text).unwrap();
        if frame["type"] == kind {
            return frame;
        }
    }
}

fn approval(request_id: &str, decision: &str) -> String {
    serde_json::json!({
        "type": "approval_response",
        "request_id": request_id,
        "decision": decision,
    })
    .to_string()
}

#[tokio::test]
async fn test_shared_approval_with_smart_allowlist() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("notes.txt"), "x").unwrap();
    let registry = create_test_registry(echo_config(), &temp);

    let (alice, mut alice_rx) = Connection::channel();
    let (bob, mut bob_rx) = Connection::channel();
    let bob_id = bob.id();
    assert!(registry.connect(alice, "shared", None).await);
    assert!(registry.connect(bob, "shared", None).await);

    // Alice asks; both see the prompt; Bob answers
    let turn = registry
        .submit_chat("shared", "!ls -la".into(), Some("alice".into()))
        .await
        .unwrap();
    let prompt = next_of_type(&mut alice_rx, "approval_request").await;
    let seen_by_bob = next_of_type(&mut bob_rx, "approval_request").await;
    assert_eq!(prompt["metadata"]["request_id"], seen_by_bob["metadata"]["request_id"]);
    assert_eq!(prompt["metadata"]["tool"], "bash_execute");

    let request_id = prompt["metadata"]["request_id"].as_str().unwrap().to_string();
    registry
        .handle_client_message("shared", bob_id, Some("bob"), &approval(&request_id, "always_smart"))
        .await
        .unwrap();
    turn.await.unwrap();

    let output = next_of_type(&mut alice_rx, "tool_end").await;
    assert!(output["content"].as_str().unwrap().contains("notes.txt"));
    next_of_type(&mut alice_rx, "finish").await;

    let engine = registry.engine("shared").await.unwrap();
    assert_eq!(engine.authorizer().allowlist(), vec!["bash:ls".to_string()]);

    // Same base command, different arguments: no prompt
    registry
        .submit_chat("shared", "!ls notes.txt".into(), None)
        .await
        .unwrap()
        .await
        .unwrap();
    let output = next_of_type(&mut alice_rx, "tool_end").await;
    assert_eq!(output["content"], "notes.txt\n");
    assert_eq!(engine.authorizer().pending_count(), 0);

    // A compound command is never covered by the smart entry
    let turn = registry
        .submit_chat("shared", "!ls && echo extra".into(), None)
        .await
        .unwrap();
    let prompt = next_of_type(&mut bob_rx, "approval_request").await;
    let request_id = prompt["metadata"]["request_id"].as_str().unwrap().to_string();
    registry
        .handle_client_message("shared", bob_id, None, &approval(&request_id, "deny"))
        .await
        .unwrap();
    turn.await.unwrap();

    let output = next_of_type(&mut alice_rx, "tool_end").await;
    assert_eq!(
        output["content"],
        "Execution denied: 'bash_execute' was not permitted to run."
    );

    // The consumed id is stale now
    assert!(
        !registry
            .resolve_approval("shared", &request_id, shadow_relay::permissions::ApprovalDecision::Allow)
            .await
    );
}

#[tokio::test]
async fn test_history_survives_restart() {
    let temp = TempDir::new().unwrap();

    {
        let registry = create_test_registry(echo_config(), &temp);
        let (conn, _rx) = Connection::channel();
        registry.connect(conn, "persisted", None).await;
        registry
            .submit_chat("persisted", "remember me".into(), Some("carol".into()))
            .await
            .unwrap()
            .await
            .unwrap();
    }

    let store = JsonSessionStore::new(temp.path().join("sessions"));
    assert_eq!(store.list().await, vec!["persisted".to_string()]);

    let registry = create_test_registry(echo_config(), &temp);
    let (conn, mut rx) = Connection::channel();
    assert!(registry.connect(conn, "persisted", None).await);

    let user = next_of_type(&mut rx, "user_input").await;
    assert_eq!(user["content"], "remember me");
    assert_eq!(user["metadata"]["user_id"], "carol");
    let reply = next_of_type(&mut rx, "history_content").await;
    assert_eq!(reply["content"], "You said: remember me");
    next_of_type(&mut rx, "finish").await;
}

#[tokio::test]
async fn test_unanswered_approval_times_out() {
    let temp = TempDir::new().unwrap();
    let mut config = echo_config();
    config.approval_timeout_secs = Some(1);
    let registry = create_test_registry(config, &temp);

    let (conn, mut rx) = Connection::channel();
    registry.connect(conn, "slow", None).await;

    let turn = registry
        .submit_chat("slow", "!echo hi".into(), None)
        .await
        .unwrap();
    next_of_type(&mut rx, "approval_request").await;
    tokio::time::timeout(Duration::from_secs(5), turn)
        .await
        .unwrap()
        .unwrap();

    let output = next_of_type(&mut rx, "tool_end").await;
    assert!(output["content"].as_str().unwrap().starts_with("Execution denied"));
    let engine = registry.engine("slow").await.unwrap();
    assert_eq!(engine.authorizer().pending_count(), 0);
}

#[tokio::test]
async fn test_reset_denies_pending_approval() {
    let temp = TempDir::new().unwrap();
    let registry = create_test_registry(echo_config(), &temp);

    let (conn, mut rx) = Connection::channel();
    let id = conn.id();
    registry.connect(conn, "r", None).await;

    let turn = registry
        .submit_chat("r", "!echo pending".into(), None)
        .await
        .unwrap();
    next_of_type(&mut rx, "approval_request").await;

    let reset = registry
        .handle_client_message("r", id, None, r#"{"type":"command","content":"/reset"}"#)
        .await
        .unwrap()
        .expect("reset runs as a task");
    turn.await.unwrap();
    reset.await.unwrap();

    let cleared = next_of_type(&mut rx, "system").await;
    assert_eq!(cleared["content"], "History cleared.");

    let engine = registry.engine("r").await.unwrap();
    assert_eq!(engine.history().await.len(), 1);
}
