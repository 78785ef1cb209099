use std::time::Duration;

use poker_table_server::config::Config;
use poker_table_server::state::AppState;
use poker_table_server::table::TableConfig;

fn test_config(action_timeout_ms: u64) -> Config {
    Config {
        protocol_version: 1,
        min_supported_protocol_version: 1,
        session_lifetime_secs: 3600,
        default_action_timeout_ms: action_timeout_ms,
        // Kept well above the assertion window so the next hand doesn't
        // start (and reset `folded`) before the test observes the fold.
        next_hand_delay_ms: 5_000,
        table_abandonment_grace_ms: 60_000,
        min_players_to_start: 2,
        admin_email_allowlist: Vec::new(),
        session_signing_secret: "test-secret".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

fn table_config(action_timeout_ms: u64) -> TableConfig {
    TableConfig {
        small_blind: 1,
        big_blind: 2,
        max_seats: 6,
        initial_stack: 1000,
        action_timeout_ms,
        min_players_to_start: 2,
    }
}

// S3: an acting seat that never responds is force-folded once the action
// timeout elapses, and the turn advances to the next eligible seat.
#[tokio::test]
async fn unresponsive_seat_is_force_folded_on_timeout() {
    let config = test_config(80);
    let state = AppState::new(config.clone());
    state.directory.create_table("t1".to_string(), table_config(80), Some("seed-1".to_string()));

    state.session_service.join("t1", "agent-a", "Alice", None, None).await.unwrap();
    state.session_service.join("t1", "agent-b", "Bob", None, None).await.unwrap();

    let managed = state.manager.get("t1").expect("table should be running after two joins");
    let acting_seat = {
        let runtime = managed.runtime.lock().await;
        runtime.current_seat.expect("a hand in progress has an acting seat")
    };

    tokio::time::sleep(Duration::from_millis(250)).await;

    let runtime = managed.runtime.lock().await;
    let seat = &runtime.seats[&acting_seat];
    assert!(seat.folded, "the seat that missed its action timeout should be folded");
}
