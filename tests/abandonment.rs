use std::time::Duration;

use poker_table_server::config::Config;
use poker_table_server::session::TableStatus;
use poker_table_server::state::AppState;
use poker_table_server::table::TableConfig;

fn test_config() -> Config {
    Config {
        protocol_version: 1,
        min_supported_protocol_version: 1,
        session_lifetime_secs: 3600,
        default_action_timeout_ms: 30_000,
        next_hand_delay_ms: 2_000,
        table_abandonment_grace_ms: 100,
        min_players_to_start: 2,
        admin_email_allowlist: Vec::new(),
        session_signing_secret: "test-secret".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

fn table_config() -> TableConfig {
    TableConfig {
        small_blind: 1,
        big_blind: 2,
        max_seats: 6,
        initial_stack: 1000,
        action_timeout_ms: 30_000,
        min_players_to_start: 2,
    }
}

// S5: a running table with zero live connections is ended by the
// abandonment timer, the runtime is destroyed, and the directory is
// updated so a later observer sees TABLE_NOT_FOUND-equivalent state.
#[tokio::test]
async fn abandoned_table_ends_after_grace_period() {
    let config = test_config();
    let state = AppState::new(config.clone());
    state.directory.create_table("t1".to_string(), table_config(), Some("seed-1".to_string()));

    state.session_service.join("t1", "agent-a", "Alice", None, None).await.unwrap();
    state.session_service.join("t1", "agent-b", "Bob", None, None).await.unwrap();
    assert!(state.manager.has("t1"));

    // No sockets ever registered with the Connection Registry for this
    // table, so connection_count is already zero; arm it directly the
    // way the socket-close path would.
    state.lifecycle.arm_abandonment("t1".to_string()).await;

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(!state.manager.has("t1"), "runtime should be destroyed once abandoned");
    let record = state.directory.get("t1").expect("directory row survives after the runtime is gone");
    assert_eq!(record.status, TableStatus::Ended);
}
