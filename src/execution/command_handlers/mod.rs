//! Command Handlers Module
//!
//! Session handlers share one calling contract: JSON payload bytes in, JSON
//! object bytes out, or a [`HandlerError`]. Providers contribute them as
//! [`HandlerEntry`] values at session start; [`ExecHandler`] adapts an entry to
//! the [`CommandHandler`] trait the registry routes to.

pub mod messaging_handler;
pub mod store_handler;
pub mod vdr_handler;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::error::{DispatchError, Result};
use crate::execution::codec::{decode_payload, encode_payload};
use crate::execution::command::{Command, CommandResult, Payload};
use crate::execution::command_router::{CommandHandler, HandlerKey};
use crate::session::SessionContext;

pub use messaging_handler::MessagingHandlerProvider;
pub use store_handler::StoreHandlerProvider;
pub use vdr_handler::VdrHandlerProvider;

/// Uniform handler body: request bytes in, response bytes out
pub type ExecFn =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, std::result::Result<Vec<u8>, HandlerError>> + Send + Sync>;

/// Failure reported by a session handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct HandlerError {
    /// Provider-specific error code, when available
    pub code: Option<i32>,
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "code: {code}, message: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        DispatchError::HandlerExecution(err.to_string())
    }
}

/// One `(package, function)` handler contributed by a provider
#[derive(Clone)]
pub struct HandlerEntry {
    pub package_name: String,
    pub function_name: String,
    pub exec: ExecFn,
}

impl HandlerEntry {
    /// Entry over a raw bytes-in/bytes-out function
    pub fn new<F, Fut>(package_name: impl Into<String>, function_name: impl Into<String>, exec: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Vec<u8>, HandlerError>> + Send + 'static,
    {
        Self {
            package_name: package_name.into(),
            function_name: function_name.into(),
            exec: Arc::new(move |request| exec(request).boxed()),
        }
    }

    /// Entry over a payload-in/payload-out function
    pub fn json<F, Fut>(package_name: impl Into<String>, function_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Payload, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(package_name, function_name, move |request: Vec<u8>| {
            let handler = Arc::clone(&handler);
            async move {
                let payload = decode_payload(&request)
                    .map_err(|e| HandlerError::new(format!("failed to decode request: {e}")))?;
                let response = handler(payload).await?;
                serde_json::to_vec(&response)
                    .map_err(|e| HandlerError::new(format!("failed to encode response: {e}")))
            }
        })
    }

    pub fn key(&self) -> HandlerKey {
        HandlerKey::new(&self.package_name, &self.function_name)
    }

    /// Wrap into the registry-facing handler
    pub fn into_command_handler(self) -> (HandlerKey, Arc<dyn CommandHandler>) {
        let key = self.key();
        let handler: Arc<dyn CommandHandler> = Arc::new(ExecHandler {
            name: key.to_string(),
            exec: self.exec,
        });
        (key, handler)
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("package_name", &self.package_name)
            .field("function_name", &self.function_name)
            .finish()
    }
}

/// Adapts an [`ExecFn`] to the [`CommandHandler`] contract
pub struct ExecHandler {
    name: String,
    exec: ExecFn,
}

#[async_trait]
impl CommandHandler for ExecHandler {
    async fn handle_command(&self, command: Command) -> CommandResult {
        let request = match encode_payload(&command.payload) {
            Ok(request) => request,
            Err(e) => {
                return CommandResult::error(
                    command.id,
                    format!("failed to unmarshal payload. err={e}"),
                )
            }
        };

        let response = match (self.exec)(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(handler = %self.name, id = %command.id, error = %e, "Handler returned an error");
                return CommandResult::error(command.id, e);
            }
        };

        match decode_payload(&response) {
            Ok(payload) => CommandResult::success(command.id, payload),
            Err(e) => CommandResult::error(
                command.id,
                format!(
                    "failed to unmarshal command result={} err={e}",
                    String::from_utf8_lossy(&response)
                ),
            ),
        }
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Source of session handlers, instantiated at every session start
///
/// Implementations capture whatever session state they need (storage,
/// notifier, options) inside the closures of the entries they return.
pub trait HandlerProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Build this provider's handlers for a new session
    fn command_handlers(&self, context: &SessionContext) -> Result<Vec<HandlerEntry>>;
}

/// Providers enabled when `enable_builtin_providers` is set
pub fn builtin_providers() -> Vec<Arc<dyn HandlerProvider>> {
    vec![
        Arc::new(StoreHandlerProvider),
        Arc::new(VdrHandlerProvider),
        Arc::new(MessagingHandlerProvider),
    ]
}

/// Read a required string field from a handler request
pub(crate) fn required_str<'a>(payload: &'a Payload, field: &str) -> std::result::Result<&'a str, HandlerError> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerError::new(format!("missing required field '{field}'")))
}
