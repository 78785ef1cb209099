//! Process configuration, loaded once from the environment in `main` and
//! threaded explicitly through every service (no global singletons, §9).

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub protocol_version: u32,
    pub min_supported_protocol_version: u32,
    pub session_lifetime_secs: i64,
    pub default_action_timeout_ms: u64,
    pub next_hand_delay_ms: u64,
    pub table_abandonment_grace_ms: u64,
    pub min_players_to_start: u8,
    pub admin_email_allowlist: Vec<String>,
    pub session_signing_secret: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            protocol_version: env_u32("PROTOCOL_VERSION", 1),
            min_supported_protocol_version: env_u32("MIN_SUPPORTED_PROTOCOL_VERSION", 1),
            session_lifetime_secs: env_i64("SESSION_LIFETIME_SECS", 3600),
            default_action_timeout_ms: env_u64("ACTION_TIMEOUT_MS", 20_000),
            next_hand_delay_ms: env_u64("NEXT_HAND_DELAY_MS", 2_000),
            table_abandonment_grace_ms: env_u64("TABLE_ABANDONMENT_GRACE_MS", 60_000),
            min_players_to_start: env_u8("MIN_PLAYERS_TO_START", 2),
            admin_email_allowlist: env::var("ADMIN_EMAIL_ALLOWLIST")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            session_signing_secret: env::var("SESSION_SIGNING_SECRET")
                .unwrap_or_else(|_| "dev-only-insecure-secret".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
