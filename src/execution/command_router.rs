//! Handler Registry for package/function command routing
//!
//! Two-level routing table from package name to function name to handler.
//! Workers read it concurrently; the session controller mutates it. Every
//! mutation that belongs together (a full session install, a reset) runs inside
//! one write-lock critical section, so readers never see a partially installed
//! handler set.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::execution::command::{Command, CommandResult};

/// Trait for registry-routable handlers
///
/// Handlers receive the whole command so they can correlate their result, and
/// must always produce a result; failures become error results.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and produce its correlated result
    async fn handle_command(&self, command: Command) -> CommandResult;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str;
}

/// Routing key for the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey {
    pub package: String,
    pub function: String,
}

impl HandlerKey {
    pub fn new(package: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            function: function.into(),
        }
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.package, self.function)
    }
}

type FunctionMap = HashMap<String, Arc<dyn CommandHandler>>;

/// The routing table guarded by [`HandlerRegistry`]
///
/// Only reachable through [`HandlerRegistry::update`], i.e. always under the write lock.
#[derive(Default)]
pub struct HandlerTable {
    packages: HashMap<String, FunctionMap>,
}

impl HandlerTable {
    /// Insert or overwrite one handler
    pub fn insert(&mut self, key: HandlerKey, handler: Arc<dyn CommandHandler>) {
        let functions = self.packages.entry(key.package.clone()).or_default();
        if functions.insert(key.function.clone(), handler).is_some() {
            warn!(handler = %key, "Replacing existing command handler");
        }
    }

    /// Replace a whole package's function map
    pub fn replace_package(
        &mut self,
        package: &str,
        handlers: impl IntoIterator<Item = (String, Arc<dyn CommandHandler>)>,
    ) {
        self.packages
            .insert(package.to_string(), handlers.into_iter().collect());
    }

    /// Drop every package
    pub fn clear(&mut self) {
        self.packages.clear();
    }

    fn get(&self, package: &str, function: &str) -> Option<Arc<dyn CommandHandler>> {
        self.packages
            .get(package)
            .and_then(|functions| functions.get(function))
            .cloned()
    }

    /// Number of installed handlers across all packages
    pub fn len(&self) -> usize {
        self.packages.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared, lock-protected handler registry
///
/// # Examples
///
/// ```rust
/// use agent_worker::execution::command_handlers::HandlerEntry;
/// use agent_worker::execution::command_router::HandlerRegistry;
///
/// let registry = HandlerRegistry::new();
/// let (key, handler) = HandlerEntry::json("test", "echo", |payload| async move { Ok(payload) })
///     .into_command_handler();
/// registry.register(key, handler);
///
/// assert!(registry.lookup("test", "echo").is_some());
/// assert!(registry.lookup("test", "missing").is_none());
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    table: RwLock<HandlerTable>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single handler, overwriting any previous one under the same key
    pub fn register(&self, key: HandlerKey, handler: Arc<dyn CommandHandler>) {
        debug!(handler = %key, "Registering command handler");
        self.table.write().insert(key, handler);
    }

    /// Register a set of handlers as one atomic installation
    pub fn register_all(&self, handlers: impl IntoIterator<Item = (HandlerKey, Arc<dyn CommandHandler>)>) {
        let mut table = self.table.write();
        let before = table.len();
        for (key, handler) in handlers {
            table.insert(key, handler);
        }
        info!(
            added = table.len().saturating_sub(before),
            total = table.len(),
            "Installed command handler set"
        );
    }

    /// Apply several mutations inside one critical section
    pub fn update<R>(&self, mutation: impl FnOnce(&mut HandlerTable) -> R) -> R {
        let mut table = self.table.write();
        mutation(&mut table)
    }

    /// Clear every package and install `base` in the same critical section
    ///
    /// Keeping the two in one step means the registry is never observed empty.
    pub fn reset(&self, base: impl IntoIterator<Item = (HandlerKey, Arc<dyn CommandHandler>)>) {
        let mut table = self.table.write();
        table.clear();
        for (key, handler) in base {
            table.insert(key, handler);
        }
        info!(total = table.len(), "Command handler registry reset");
    }

    /// Find the handler for a package/function pair
    pub fn lookup(&self, package: &str, function: &str) -> Option<Arc<dyn CommandHandler>> {
        self.table.read().get(package, function)
    }

    /// Check if a handler is registered for the pair
    pub fn has_handler(&self, package: &str, function: &str) -> bool {
        self.lookup(package, function).is_some()
    }

    /// Registered routing keys, sorted
    pub fn registered_keys(&self) -> Vec<HandlerKey> {
        let table = self.table.read();
        let mut keys: Vec<HandlerKey> = table
            .packages
            .iter()
            .flat_map(|(package, functions)| {
                functions
                    .keys()
                    .map(move |function| HandlerKey::new(package.clone(), function.clone()))
            })
            .collect();
        keys.sort();
        keys
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.table.read().len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handler_count())
            .finish()
    }
}
