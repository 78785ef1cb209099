//! Agent registration (`POST /v1/agents`) and the bearer-key check gating
//! `join`/`leave` (§6, supplemented — `join`/`leave` are declared
//! API-key authenticated but no issuance endpoint is named in §4, so we
//! add the minimal one the flow requires).

use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{ApiError, ErrorCode};

#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
}

#[derive(Default)]
pub struct AgentDirectory {
    by_key_hash: DashMap<String, Agent>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the agent record and the plaintext key; only the SHA-256
    /// hash of the key is retained.
    pub fn register(&self, name: String) -> (Agent, String) {
        let agent = Agent {
            agent_id: Uuid::new_v4().to_string(),
            name,
        };
        let api_key = format!("pk_{}", Uuid::new_v4().simple());
        self.by_key_hash.insert(hash_key(&api_key), agent.clone());
        (agent, api_key)
    }

    pub fn authenticate(&self, api_key: &str) -> Option<Agent> {
        self.by_key_hash.get(&hash_key(api_key)).map(|e| e.clone())
    }
}

fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Pulls the bearer token out of `Authorization` and resolves it to an
/// `Agent`, or the appropriate §7 authorization error.
pub fn authenticate(directory: &AgentDirectory, headers: &HeaderMap) -> Result<Agent, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "missing Authorization header"))?;
    let key = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "expected a Bearer token"))?;
    directory
        .authenticate(key)
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidApiKey, "unknown API key"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_key_authenticates_and_unknown_key_does_not() {
        let directory = AgentDirectory::new();
        let (agent, key) = directory.register("Alice-bot".to_string());
        let resolved = directory.authenticate(&key).unwrap();
        assert_eq!(resolved.agent_id, agent.agent_id);
        assert!(directory.authenticate("not-a-real-key").is_none());
    }

    #[test]
    fn authorization_header_must_carry_bearer_prefix() {
        let directory = AgentDirectory::new();
        let (_, key) = directory.register("Bob-bot".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, format!("Bearer {key}").parse().unwrap());
        assert!(authenticate(&directory, &headers).is_ok());

        let mut bad_headers = HeaderMap::new();
        bad_headers.insert(axum::http::header::AUTHORIZATION, key.parse().unwrap());
        assert_eq!(authenticate(&directory, &bad_headers).unwrap_err().code, ErrorCode::Unauthorized);
    }
}
