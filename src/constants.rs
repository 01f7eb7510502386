//! # Dispatcher Constants
//!
//! Wire-level names shared between the host boundary and the dispatcher:
//! the lifecycle control package, readiness topic, and the recognized
//! values of the start options.

/// Lifecycle control package; always present in the registry
pub const AGENT_PACKAGE: &str = "agent";

/// Session start function in the control package (Idle state only)
pub const START_FUNCTION: &str = "Start";

/// Session stop function in the control package (Active state only)
pub const STOP_FUNCTION: &str = "Stop";

/// Topic of the one-shot readiness notification
pub const STARTUP_TOPIC: &str = "asset-ready";

/// Prefix for every error message produced by the dispatcher
pub const ERROR_MESSAGE_PREFIX: &str = "agent worker: ";

/// Confirmation payload messages for lifecycle transitions
pub mod messages {
    pub const AGENT_STARTED: &str = "agent started successfully";
    pub const AGENT_STOPPED: &str = "agent stopped";
}

/// Recognized `storageType` discriminator values
pub mod storage_types {
    pub const SDS: &str = "sds";
    pub const INDEXED_DB: &str = "indexedDB";

    /// Valid values, in the order they are listed in error messages
    pub const ALL: &[&str] = &[SDS, INDEXED_DB];
}

/// Recognized `outbound-transport` values
pub mod transports {
    pub const HTTP: &str = "http";
    pub const WEBSOCKET: &str = "ws";
}

/// System-wide defaults
pub mod system {
    /// Minimum and default number of concurrent workers
    pub const MIN_WORKERS: usize = 2;

    /// Default inbound queue capacity; enough for interactive bursts
    pub const DEFAULT_INBOUND_BUFFER_SIZE: usize = 32;

    /// Environment variable prefix for configuration overrides
    pub const ENV_PREFIX: &str = "AGENT_WORKER";

    /// Version compatibility marker
    pub const AGENT_WORKER_VERSION: &str = env!("CARGO_PKG_VERSION");
}
