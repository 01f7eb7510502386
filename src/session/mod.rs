//! Session lifecycle
//!
//! The dispatcher starts in an idle state where only `agent/Start` is
//! routable. A successful start builds a [`SessionContext`], asks every
//! [`HandlerProvider`] for its handlers and installs them together with
//! `agent/Stop` in a single registry update. Stop tears the session down and
//! resets the registry to the start handler alone, whatever the teardown
//! outcome.

pub mod keys;
pub mod options;
pub mod storage;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constants::{messages, AGENT_PACKAGE, START_FUNCTION, STOP_FUNCTION};
use crate::error::{DispatchError, HandlerMiss, Result};
use crate::execution::command::{Command, CommandResult};
use crate::execution::command_handlers::HandlerProvider;
use crate::execution::command_router::{CommandHandler, HandlerKey, HandlerRegistry};
use crate::execution::notifier::Notifier;
use crate::logging;

pub use keys::SessionKeys;
pub use options::{AgentStartOptions, OutboundTransport, ResolverGroup, StorageType};
pub use storage::{
    DocumentCipher, EncryptedVaultProvider, LocalStorageProvider, PassthroughCipher, StorageError,
    StorageProvider, Store,
};

/// Everything a provider may capture when building its handlers
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub options: Arc<AgentStartOptions>,
    pub resolvers: Arc<Vec<ResolverGroup>>,
    pub transports: Arc<Vec<OutboundTransport>>,
    pub storage: Arc<dyn StorageProvider>,
    pub keys: Arc<SessionKeys>,
    pub notifier: Notifier,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("started_at", &self.started_at)
            .field("storage", &self.storage.kind())
            .field("resolvers", &self.resolvers)
            .field("transports", &self.transports)
            .finish()
    }
}

/// Summary of the active session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub label: String,
    pub storage_type: &'static str,
    /// Handlers live in the registry once the session was installed, `agent/Stop` included
    pub handler_count: usize,
}

struct Session {
    context: SessionContext,
    handler_count: usize,
}

/// Owns the session slot and the lifecycle transitions
pub struct SessionController {
    registry: Arc<HandlerRegistry>,
    notifier: Notifier,
    providers: Vec<Arc<dyn HandlerProvider>>,
    cipher: Arc<dyn DocumentCipher>,
    // Serializes start/stop; lifecycle commands may race across workers.
    session: Mutex<Option<Session>>,
}

impl SessionController {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        notifier: Notifier,
        providers: Vec<Arc<dyn HandlerProvider>>,
    ) -> Arc<Self> {
        Self::with_cipher(registry, notifier, providers, Arc::new(PassthroughCipher))
    }

    pub fn with_cipher(
        registry: Arc<HandlerRegistry>,
        notifier: Notifier,
        providers: Vec<Arc<dyn HandlerProvider>>,
        cipher: Arc<dyn DocumentCipher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            notifier,
            providers,
            cipher,
            session: Mutex::new(None),
        })
    }

    /// Put the registry into its idle state: `agent/Start` only
    pub fn install_idle(self: &Arc<Self>) {
        self.registry.reset([self.start_handler()]);
        debug!("Registry reset to idle state");
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.session.lock().await.as_ref().map(|session| SessionInfo {
            session_id: session.context.session_id,
            started_at: session.context.started_at,
            label: session.context.options.label.clone(),
            storage_type: session.context.storage.kind(),
            handler_count: session.handler_count,
        })
    }

    /// Tear down any active session and clear the registry
    pub async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            if let Err(e) = session.context.storage.close().await {
                warn!(error = %e, "Session teardown failed during shutdown");
            }
        }
        self.registry.update(|table| table.clear());
    }

    fn start_handler(self: &Arc<Self>) -> (HandlerKey, Arc<dyn CommandHandler>) {
        (
            HandlerKey::new(AGENT_PACKAGE, START_FUNCTION),
            Arc::new(StartHandler {
                controller: Arc::downgrade(self),
            }),
        )
    }

    fn stop_handler(self: &Arc<Self>) -> Arc<dyn CommandHandler> {
        Arc::new(StopHandler {
            controller: Arc::downgrade(self),
        })
    }

    async fn start(self: &Arc<Self>, command: Command) -> CommandResult {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return CommandResult::error(command.id, DispatchError::HandlerNotFound(HandlerMiss::AlreadyStarted));
        }

        let (context, handlers) = match self.build_session(&command).await {
            Ok(built) => built,
            Err(e) => {
                warn!(id = %command.id, error = %e, "Agent start failed");
                return CommandResult::error(command.id, e);
            }
        };

        let stop = self.stop_handler();
        let handler_count = self.registry.update(|table| {
            for (key, handler) in handlers {
                table.insert(key, handler);
            }
            table.replace_package(AGENT_PACKAGE, [(STOP_FUNCTION.to_string(), stop)]);
            table.len()
        });

        info!(
            session_id = %context.session_id,
            storage = context.storage.kind(),
            handlers = handler_count,
            "Agent session started"
        );
        *slot = Some(Session {
            context,
            handler_count,
        });

        CommandResult::message(command.id, messages::AGENT_STARTED)
    }

    async fn build_session(
        &self,
        command: &Command,
    ) -> Result<(SessionContext, Vec<(HandlerKey, Arc<dyn CommandHandler>)>)> {
        let options = AgentStartOptions::from_payload(&command.payload)?;

        if !options.log_level.is_empty() {
            logging::set_log_level(&options.log_level)?;
        }

        let resolvers = options::parse_http_resolvers(&options.http_resolvers)?;
        let transports = options::parse_outbound_transports(&options.outbound_transport)?;

        let keys = Arc::new(SessionKeys::generate());
        let storage =
            storage::create_storage_provider(&options, Arc::clone(&keys), Arc::clone(&self.cipher))?;

        let context = SessionContext {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            options: Arc::new(options),
            resolvers: Arc::new(resolvers),
            transports: Arc::new(transports),
            storage,
            keys,
            notifier: self.notifier.clone(),
        };

        let mut handlers = Vec::new();
        for provider in &self.providers {
            match provider.command_handlers(&context) {
                Ok(entries) => {
                    debug!(provider = provider.name(), count = entries.len(), "Provider handlers built");
                    handlers.extend(entries.into_iter().map(|entry| entry.into_command_handler()));
                }
                Err(e) => {
                    if let Err(close_err) = context.storage.close().await {
                        error!(error = %close_err, "Failed to release storage after provider error");
                    }
                    return Err(e);
                }
            }
        }

        Ok((context, handlers))
    }

    async fn stop(self: &Arc<Self>, command: Command) -> CommandResult {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            return CommandResult::error(command.id, DispatchError::HandlerNotFound(HandlerMiss::NotRunning));
        };

        let teardown = session.context.storage.close().await;
        self.registry.reset([self.start_handler()]);

        match teardown {
            Ok(()) => {
                info!(session_id = %session.context.session_id, "Agent session stopped");
                CommandResult::message(command.id, messages::AGENT_STOPPED)
            }
            Err(e) => {
                error!(session_id = %session.context.session_id, error = %e, "Agent teardown failed");
                CommandResult::error(command.id, e)
            }
        }
    }
}

fn controller_gone(command: Command) -> CommandResult {
    CommandResult::error(command.id, DispatchError::ChannelClosed("session controller"))
}

struct StartHandler {
    controller: Weak<SessionController>,
}

#[async_trait]
impl CommandHandler for StartHandler {
    async fn handle_command(&self, command: Command) -> CommandResult {
        match self.controller.upgrade() {
            Some(controller) => controller.start(command).await,
            None => controller_gone(command),
        }
    }

    fn handler_name(&self) -> &str {
        "agent/Start"
    }
}

struct StopHandler {
    controller: Weak<SessionController>,
}

#[async_trait]
impl CommandHandler for StopHandler {
    async fn handle_command(&self, command: Command) -> CommandResult {
        match self.controller.upgrade() {
            Some(controller) => controller.stop(command).await,
            None => controller_gone(command),
        }
    }

    fn handler_name(&self) -> &str {
        "agent/Stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::command::Payload;
    use crate::execution::command_handlers::HandlerEntry;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct PingProvider;

    impl HandlerProvider for PingProvider {
        fn name(&self) -> &str {
            "ping"
        }

        fn command_handlers(&self, _context: &SessionContext) -> Result<Vec<HandlerEntry>> {
            Ok(vec![
                HandlerEntry::json("ping", "Ping", |_payload: Payload| async move { Ok(Payload::new()) }),
                HandlerEntry::json(AGENT_PACKAGE, "Shadow", |_payload: Payload| async move { Ok(Payload::new()) }),
                HandlerEntry::json(AGENT_PACKAGE, "Start", |_payload: Payload| async move { Ok(Payload::new()) }),
            ])
        }
    }

    struct FailingProvider;

    impl HandlerProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn command_handlers(&self, _context: &SessionContext) -> Result<Vec<HandlerEntry>> {
            Err(DispatchError::config("provider unavailable"))
        }
    }

    fn controller(providers: Vec<Arc<dyn HandlerProvider>>) -> (Arc<SessionController>, Arc<HandlerRegistry>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = Arc::new(HandlerRegistry::new());
        let controller = SessionController::new(Arc::clone(&registry), Notifier::new(tx), providers);
        controller.install_idle();
        (controller, registry)
    }

    fn command(function: &str, payload: Value) -> Command {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Command::new("id-1", AGENT_PACKAGE, function, payload)
    }

    #[tokio::test]
    async fn test_start_installs_handlers_and_stop_only() {
        let (controller, registry) = controller(vec![Arc::new(PingProvider)]);
        assert_eq!(registry.registered_keys(), vec![HandlerKey::new("agent", "Start")]);

        let result = controller.start(command("Start", json!({}))).await;
        assert!(!result.is_error, "{}", result.error_message);
        assert_eq!(result.payload.get("message"), Some(&json!("agent started successfully")));

        assert!(registry.has_handler("ping", "Ping"));
        assert!(registry.has_handler("agent", "Stop"));
        assert!(!registry.has_handler("agent", "Start"));
        assert!(!registry.has_handler("agent", "Shadow"));
        assert!(controller.is_active().await);

        let info = controller.session_info().await.unwrap();
        assert_eq!(info.storage_type, "indexedDB");
        // ping/Ping and agent/Stop; the provider's agent entries never go live
        assert_eq!(info.handler_count, 2);
        assert_eq!(info.handler_count, registry.handler_count());
    }

    #[tokio::test]
    async fn test_stop_returns_to_idle() {
        let (controller, registry) = controller(vec![Arc::new(PingProvider)]);
        controller.start(command("Start", json!({}))).await;

        let result = controller.stop(command("Stop", json!({}))).await;
        assert!(!result.is_error);
        assert_eq!(result.payload.get("message"), Some(&json!("agent stopped")));
        assert_eq!(registry.registered_keys(), vec![HandlerKey::new("agent", "Start")]);
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn test_racing_lifecycle_commands() {
        let (controller, _registry) = controller(vec![]);

        let stop = controller.stop(command("Stop", json!({}))).await;
        assert_eq!(stop.error_message, "agent worker: Agent not running");

        controller.start(command("Start", json!({}))).await;
        let again = controller.start(command("Start", json!({}))).await;
        assert_eq!(again.error_message, "agent worker: Agent already started");
    }

    #[tokio::test]
    async fn test_invalid_options_leave_registry_idle() {
        let (controller, registry) = controller(vec![Arc::new(PingProvider)]);

        for payload in [
            json!({"http-resolver-url": ["no-separator"]}),
            json!({"outbound-transport": ["smtp"]}),
            json!({"storageType": "foo"}),
            json!({"log-level": "loud"}),
            json!({"auto-accept": "yes"}),
        ] {
            let result = controller.start(command("Start", payload)).await;
            assert!(result.is_error);
            assert_eq!(registry.registered_keys(), vec![HandlerKey::new("agent", "Start")]);
        }
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_start() {
        let (controller, registry) = controller(vec![Arc::new(PingProvider), Arc::new(FailingProvider)]);

        let result = controller.start(command("Start", json!({}))).await;
        assert_eq!(result.error_message, "agent worker: provider unavailable");
        assert!(!registry.has_handler("ping", "Ping"));
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn test_handlers_fail_after_controller_dropped() {
        let (controller, registry) = controller(vec![]);
        let start = registry.lookup("agent", "Start").unwrap();
        drop(controller);

        let result = start.handle_command(command("Start", json!({}))).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let (controller, registry) = controller(vec![Arc::new(PingProvider)]);
        controller.start(command("Start", json!({}))).await;

        controller.shutdown().await;
        assert_eq!(registry.handler_count(), 0);
        assert!(!controller.is_active().await);
    }
}
