#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Agent Worker
//!
//! Asynchronous command dispatcher for embedding an agent behind a
//! message-passing host boundary.
//!
//! ## Overview
//!
//! The host posts JSON commands naming a `(pkg, fn)` pair. A fixed pool of
//! workers routes each command through a session-scoped handler registry and
//! delivers exactly one JSON result per command, correlated by `id`, through
//! a [`ResultSink`]. Handlers may also push uncorrelated, topic-tagged
//! notifications through the [`Notifier`].
//!
//! ## Session lifecycle
//!
//! Only `agent/Start` is routable until a session starts. Start builds the
//! session (storage, resolvers, transports) from its payload and installs
//! every provider's handlers plus `agent/Stop`. Stop tears the session down
//! and returns the registry to the idle state.
//!
//! ## Module Organization
//!
//! - [`execution`] - Envelope codec, registry, worker pool, dispatcher
//! - [`session`] - Lifecycle controller, start options, storage
//! - [`config`] - Dispatcher configuration loading
//! - [`logging`] - Structured logging with a runtime-adjustable level
//! - [`error`] - Dispatcher error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_worker::{ChannelResultSink, Dispatcher};
//!
//! # async fn example() -> agent_worker::Result<()> {
//! let (sink, results) = ChannelResultSink::unbounded();
//! let dispatcher = Dispatcher::builder().build(sink)?;
//!
//! dispatcher.submit(r#"{"id":"1","pkg":"agent","fn":"Start","payload":{}}"#);
//! // `results` yields the `asset-ready` push, then the start confirmation.
//! # drop(results);
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod session;

pub use config::{ConfigManager, DispatcherConfig};
pub use constants::{AGENT_PACKAGE, START_FUNCTION, STARTUP_TOPIC, STOP_FUNCTION};
pub use error::{DispatchError, HandlerMiss, Result};
pub use execution::{
    ChannelResultSink, Command, CommandHandler, CommandResult, Dispatcher, DispatcherBuilder,
    HandlerEntry, HandlerError, HandlerProvider, Notifier, Payload, ResultSink, StdoutResultSink,
};
pub use session::{AgentStartOptions, SessionContext, SessionInfo};
