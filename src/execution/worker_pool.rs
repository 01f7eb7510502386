//! Worker Pool for command execution
//!
//! A fixed number of tokio tasks share one inbound queue and one outbound
//! queue. Each worker dequeues a command, routes it through the
//! [`HandlerRegistry`], runs the handler inline and pushes the result. A slow
//! handler occupies only its own worker slot.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, HandlerMiss};
use crate::execution::command::{Command, CommandResult};
use crate::execution::command_router::HandlerRegistry;

/// Execution counters shared by all workers
#[derive(Debug, Default)]
pub struct WorkerPoolStats {
    processed: AtomicU64,
    handler_misses: AtomicU64,
    error_results: AtomicU64,
    panics: AtomicU64,
}

impl WorkerPoolStats {
    pub fn snapshot(&self) -> WorkerPoolStatsSnapshot {
        WorkerPoolStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            handler_misses: self.handler_misses.load(Ordering::Relaxed),
            error_results: self.error_results.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerPoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStatsSnapshot {
    /// Commands that produced a result
    pub processed: u64,
    /// Commands with no registered handler
    pub handler_misses: u64,
    /// Results flagged as errors, misses included
    pub error_results: u64,
    /// Handler invocations that panicked
    pub panics: u64,
}

/// Fixed-size pool of command workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerPoolStats>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime
    pub fn spawn(
        size: usize,
        inbound: mpsc::Receiver<Command>,
        outbound: mpsc::UnboundedSender<CommandResult>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let inbound = Arc::new(Mutex::new(inbound));
        let stats = Arc::new(WorkerPoolStats::default());

        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&inbound),
                    outbound.clone(),
                    Arc::clone(&registry),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        info!(workers = size, "Worker pool started");

        Self { handles, stats }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> WorkerPoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait for every worker to exit (after the inbound queue closes)
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    inbound: Arc<Mutex<mpsc::Receiver<Command>>>,
    outbound: mpsc::UnboundedSender<CommandResult>,
    registry: Arc<HandlerRegistry>,
    stats: Arc<WorkerPoolStats>,
) {
    debug!(worker_id, "Worker started");

    loop {
        // The lock is only held while waiting for the next command.
        let command = { inbound.lock().await.recv().await };
        let Some(command) = command else {
            break;
        };

        let result = execute_command(&registry, &stats, command).await;

        if outbound.send(result).is_err() {
            error!(worker_id, "Outbound queue closed; worker exiting");
            break;
        }
    }

    debug!(worker_id, "Worker finished");
}

/// Route one command and run its handler
async fn execute_command(
    registry: &HandlerRegistry,
    stats: &WorkerPoolStats,
    command: Command,
) -> CommandResult {
    if command.id.is_empty() {
        warn!(route = %command.route(), "Missing ID for input command");
    }

    let result = match registry.lookup(&command.package, &command.function) {
        Some(handler) => {
            let id = command.id.clone();
            debug!(id = %id, handler = handler.handler_name(), "Invoking handler");

            match AssertUnwindSafe(handler.handle_command(command))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(id = %id, handler = handler.handler_name(), panic = %message, "Handler panicked");
                    stats.panics.fetch_add(1, Ordering::Relaxed);
                    CommandResult::error(id, DispatchError::HandlerExecution(format!("handler panicked: {message}")))
                }
            }
        }
        None => {
            stats.handler_misses.fetch_add(1, Ordering::Relaxed);
            handler_not_found(&command)
        }
    };

    stats.processed.fetch_add(1, Ordering::Relaxed);
    if result.is_error {
        stats.error_results.fetch_add(1, Ordering::Relaxed);
    }

    result
}

/// Routing miss, disambiguated for lifecycle commands
pub fn handler_not_found(command: &Command) -> CommandResult {
    let miss = if command.is_start_command() {
        HandlerMiss::AlreadyStarted
    } else if command.is_stop_command() {
        HandlerMiss::NotRunning
    } else {
        HandlerMiss::Unknown
    };

    debug!(id = %command.id, route = %command.route(), miss = ?miss, "No handler registered");

    match miss {
        HandlerMiss::Unknown => CommandResult::error(
            command.id.clone(),
            format!(
                "invalid pkg/fn: {}/{}, make sure agent is started",
                command.package, command.function
            ),
        ),
        _ => CommandResult::error(command.id.clone(), DispatchError::HandlerNotFound(miss)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::command::Payload;
    use crate::execution::command_handlers::HandlerEntry;
    use std::time::Duration;

    fn command(id: &str, package: &str, function: &str) -> Command {
        Command::new(id, package, function, Payload::new())
    }

    #[test]
    fn test_handler_not_found_variants() {
        let started = handler_not_found(&command("1", "agent", "Start"));
        assert_eq!(started.error_message, "agent worker: Agent already started");

        let stopped = handler_not_found(&command("2", "agent", "Stop"));
        assert_eq!(stopped.error_message, "agent worker: Agent not running");

        let unknown = handler_not_found(&command("3", "store", "Put"));
        assert_eq!(
            unknown.error_message,
            "agent worker: invalid pkg/fn: store/Put, make sure agent is started"
        );
        assert_eq!(unknown.id, "3");
    }

    #[tokio::test]
    async fn test_execute_command_captures_panics() {
        let registry = HandlerRegistry::new();
        let (key, handler) = HandlerEntry::new("test", "panic", |_request: Vec<u8>| async move {
            if true {
                panic!("boom");
            }
            Ok(Vec::new())
        })
        .into_command_handler();
        registry.register(key, handler);
        let stats = WorkerPoolStats::default();

        let result = execute_command(&registry, &stats, command("p", "test", "panic")).await;

        assert!(result.is_error);
        assert!(result.error_message.contains("handler panicked: boom"));
        assert_eq!(stats.snapshot().panics, 1);
        assert_eq!(stats.snapshot().error_results, 1);
    }

    #[tokio::test]
    async fn test_pool_processes_all_commands() {
        let registry = Arc::new(HandlerRegistry::new());
        let (key, handler) = HandlerEntry::json("test", "echo", |payload: Payload| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(payload)
        })
        .into_command_handler();
        registry.register(key, handler);

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(3, in_rx, out_tx, Arc::clone(&registry));
        assert_eq!(pool.size(), 3);

        for i in 0..20 {
            in_tx.send(command(&i.to_string(), "test", "echo")).await.unwrap();
        }
        in_tx.send(command("miss", "nope", "nothing")).await.unwrap();
        drop(in_tx);

        let mut ids = Vec::new();
        while let Some(result) = out_rx.recv().await {
            ids.push(result.id);
        }
        ids.sort();

        assert_eq!(ids.len(), 21);
        assert!(ids.contains(&"miss".to_string()));

        let stats = pool.stats();
        assert_eq!(stats.processed, 21);
        assert_eq!(stats.handler_misses, 1);
        pool.join().await;
    }
}
