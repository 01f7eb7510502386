//! # Dispatcher
//!
//! Wires the host boundary to the worker pool:
//!
//! ```text
//! host --submit--> [inbound queue] --> workers --> [outbound queue] --egress--> ResultSink
//!                                                       ^
//!                                    Notifier ----------'
//! ```
//!
//! The inbound queue is bounded; [`Dispatcher::submit`] never blocks the
//! caller even when it is full. The outbound queue is unbounded and drained by
//! a single egress task, so every result reaches the sink exactly once.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::execution::codec::{decode_command, encode_result};
use crate::execution::command::{Command, CommandResult};
use crate::execution::command_handlers::{builtin_providers, HandlerProvider};
use crate::execution::command_router::{HandlerKey, HandlerRegistry};
use crate::execution::notifier::Notifier;
use crate::execution::sink::ResultSink;
use crate::execution::worker_pool::{WorkerPool, WorkerPoolStatsSnapshot};
use crate::session::{DocumentCipher, PassthroughCipher, SessionController, SessionInfo};

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    providers: Vec<Arc<dyn HandlerProvider>>,
    cipher: Arc<dyn DocumentCipher>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            config: DispatcherConfig::default(),
            providers: Vec::new(),
            cipher: Arc::new(PassthroughCipher),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a provider instantiated at every session start
    pub fn with_provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn DocumentCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Spawn workers and egress on the current tokio runtime
    ///
    /// Must be called from within a runtime.
    pub fn build(self, sink: impl ResultSink) -> Result<Dispatcher> {
        self.config
            .validate()
            .map_err(|e| DispatchError::config(e.to_string()))?;
        let runtime = Handle::try_current()
            .map_err(|e| DispatchError::config(format!("dispatcher requires a tokio runtime: {e}")))?;

        let mut providers = self.providers;
        if self.config.enable_builtin_providers {
            providers.extend(builtin_providers());
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let registry = Arc::new(HandlerRegistry::new());
        let notifier = Notifier::new(outbound_tx.clone());
        let controller = SessionController::with_cipher(
            Arc::clone(&registry),
            notifier.clone(),
            providers,
            self.cipher,
        );
        controller.install_idle();

        let egress = runtime.spawn(egress_loop(outbound_rx, shutdown_rx, Arc::new(sink)));
        let pool = WorkerPool::spawn(
            self.config.workers,
            inbound_rx,
            outbound_tx.clone(),
            Arc::clone(&registry),
        );

        if !self.config.suppress_startup_notification && outbound_tx.send(CommandResult::startup()).is_err() {
            warn!("Egress closed before startup notification");
        }

        info!(
            workers = self.config.workers,
            inbound_buffer_size = self.config.inbound_buffer_size,
            "Dispatcher started"
        );

        Ok(Dispatcher {
            inbound: inbound_tx,
            runtime,
            registry,
            controller,
            notifier,
            pool,
            egress,
            shutdown: shutdown_tx,
        })
    }
}

/// Running dispatcher instance
pub struct Dispatcher {
    inbound: mpsc::Sender<Command>,
    runtime: Handle,
    registry: Arc<HandlerRegistry>,
    controller: Arc<SessionController>,
    notifier: Notifier,
    pool: WorkerPool,
    egress: JoinHandle<u64>,
    shutdown: oneshot::Sender<()>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Accept one host message without blocking
    ///
    /// Undecodable text is logged and dropped; nothing reaches the sink for it.
    pub fn submit(&self, text: &str) {
        match decode_command(text) {
            Ok(command) => self.enqueue(command),
            Err(e) => error!(error = %e, "Dropping undecodable host message"),
        }
    }

    /// Queue an already-decoded command without blocking
    pub fn enqueue(&self, command: Command) {
        match self.inbound.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                debug!(id = %command.id, "Inbound queue full; deferring command");
                let inbound = self.inbound.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = inbound.send(command).await {
                        warn!(id = %e.0.id, "Dispatcher stopped before deferred command was queued");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                warn!(id = %command.id, "Dispatcher stopped; command discarded");
            }
        }
    }

    /// Handle for pushing uncorrelated notifications
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn registered_handlers(&self) -> Vec<HandlerKey> {
        self.registry.registered_keys()
    }

    pub async fn is_session_active(&self) -> bool {
        self.controller.is_active().await
    }

    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.controller.session_info().await
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    pub fn stats(&self) -> WorkerPoolStatsSnapshot {
        self.pool.stats()
    }

    /// Close ingress, finish queued commands, flush egress and release the session
    ///
    /// Returns the number of results delivered over the dispatcher's lifetime.
    pub async fn shutdown(self) -> u64 {
        let Dispatcher {
            inbound,
            controller,
            pool,
            egress,
            shutdown,
            ..
        } = self;

        drop(inbound);
        pool.join().await;
        controller.shutdown().await;

        let _ = shutdown.send(());
        match egress.await {
            Ok(delivered) => {
                info!(delivered, "Dispatcher stopped");
                delivered
            }
            Err(e) => {
                error!(error = %e, "Egress task terminated abnormally");
                0
            }
        }
    }
}

/// Drain the outbound queue into the sink in dequeue order
async fn egress_loop(
    mut outbound: mpsc::UnboundedReceiver<CommandResult>,
    mut shutdown: oneshot::Receiver<()>,
    sink: Arc<dyn ResultSink>,
) -> u64 {
    let mut delivered = 0u64;

    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(result) => delivered += deliver(sink.as_ref(), &result),
                None => break,
            },
            _ = &mut shutdown => {
                while let Ok(result) = outbound.try_recv() {
                    delivered += deliver(sink.as_ref(), &result);
                }
                break;
            }
        }
    }

    debug!(delivered, "Egress loop finished");
    delivered
}

fn deliver(sink: &dyn ResultSink, result: &CommandResult) -> u64 {
    match encode_result(result) {
        Ok(text) => {
            sink.deliver(text);
            1
        }
        Err(e) => {
            error!(id = %result.id, error = %e, "Dropping unencodable result");
            0
        }
    }
}
