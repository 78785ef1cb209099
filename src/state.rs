//! Explicit service wiring (§9: no global singletons). `main` builds one
//! `AppState` and hands it to the router; tests build their own.

use std::sync::Arc;

use crate::agents::AgentDirectory;
use crate::config::Config;
use crate::event_log::{InMemoryStore, Store};
use crate::lifecycle::LifecycleController;
use crate::lock::ActionLockRegistry;
use crate::manager::TableManager;
use crate::registry::ConnectionRegistry;
use crate::session::{SessionService, SessionStore, TableDirectory};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub manager: Arc<TableManager>,
    pub registry: Arc<ConnectionRegistry>,
    pub directory: Arc<TableDirectory>,
    pub sessions: Arc<SessionStore>,
    pub agents: Arc<AgentDirectory>,
    pub lifecycle: Arc<LifecycleController>,
    pub session_service: Arc<SessionService>,
    pub store: Arc<dyn Store>,
    pub action_locks: Arc<ActionLockRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let manager = Arc::new(TableManager::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let directory = Arc::new(TableDirectory::new());
        let sessions = Arc::new(SessionStore::new(config.session_signing_secret.clone()));
        let agents = Arc::new(AgentDirectory::new());
        let action_locks = Arc::new(ActionLockRegistry::new());

        let lifecycle = LifecycleController::new(
            manager.clone(),
            registry.clone(),
            directory.clone(),
            store.clone(),
            action_locks.clone(),
            config.clone(),
        );

        let session_service = Arc::new(SessionService::new(
            directory.clone(),
            sessions.clone(),
            manager.clone(),
            registry.clone(),
            lifecycle.clone(),
            action_locks.clone(),
            config.clone(),
        ));

        Self {
            config,
            manager,
            registry,
            directory,
            sessions,
            agents,
            lifecycle,
            session_service,
            store,
            action_locks,
        }
    }
}
