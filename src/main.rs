use poker_table_server::config::Config;
use poker_table_server::state::AppState;
use poker_table_server::table::TableConfig;
use poker_table_server::{router, state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let state: AppState = state::AppState::new(config.clone());

    seed_demo_table(&state, &config);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind address");
    tracing::info!(addr = %config.bind_addr, "poker table server listening");
    axum::serve(listener, app).await.expect("server error");
}

/// Seeds one table at process start. There is no HTTP "create table"
/// endpoint (§6 names none); real deployments would seed from the
/// external tables store instead (see DESIGN.md).
fn seed_demo_table(state: &AppState, config: &Config) {
    state.directory.create_table(
        "table-1".to_string(),
        TableConfig {
            small_blind: 1,
            big_blind: 2,
            max_seats: 6,
            initial_stack: 1000,
            action_timeout_ms: config.default_action_timeout_ms,
            min_players_to_start: config.min_players_to_start,
        },
        None,
    );
}
