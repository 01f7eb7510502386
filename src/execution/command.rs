//! Command and result envelopes exchanged with the host

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{AGENT_PACKAGE, ERROR_MESSAGE_PREFIX, START_FUNCTION, STARTUP_TOPIC, STOP_FUNCTION};

/// Free-form JSON object carried by commands and results
pub type Payload = Map<String, Value>;

/// Inbound request envelope received from the host
///
/// `id` is caller-supplied and echoed back on the result; the dispatcher treats it as
/// opaque and does not enforce uniqueness. `pkg`/`fn` select the handler.
///
/// # Examples
///
/// ```rust
/// use agent_worker::execution::command::Command;
///
/// let command: Command =
///     serde_json::from_str(r#"{"id":"1","pkg":"agent","fn":"Start","payload":{}}"#).unwrap();
///
/// assert!(command.is_start_command());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Correlation identifier chosen by the caller
    #[serde(default)]
    pub id: String,

    /// Package (first routing level)
    #[serde(rename = "pkg", default)]
    pub package: String,

    /// Function within the package (second routing level)
    #[serde(rename = "fn", default)]
    pub function: String,

    /// Handler input, passed through uninterpreted
    #[serde(default, deserialize_with = "deserialize_payload")]
    pub payload: Payload,
}

impl Command {
    pub fn new(
        id: impl Into<String>,
        package: impl Into<String>,
        function: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: id.into(),
            package: package.into(),
            function: function.into(),
            payload,
        }
    }

    /// True when this command addresses the session start handler
    pub fn is_start_command(&self) -> bool {
        self.package == AGENT_PACKAGE && self.function == START_FUNCTION
    }

    /// True when this command addresses the session stop handler
    pub fn is_stop_command(&self) -> bool {
        self.package == AGENT_PACKAGE && self.function == STOP_FUNCTION
    }

    /// `pkg/fn` label used in logs and error messages
    pub fn route(&self) -> String {
        format!("{}/{}", self.package, self.function)
    }
}

/// Outbound envelope delivered to the host
///
/// Handler-originated results carry the command `id` and an empty `topic`.
/// Notifier pushes carry a fresh `id` and a non-empty `topic`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "isErr", default)]
    pub is_error: bool,

    #[serde(rename = "errMsg", default)]
    pub error_message: String,

    #[serde(
        default,
        skip_serializing_if = "Map::is_empty",
        deserialize_with = "deserialize_payload"
    )]
    pub payload: Payload,

    #[serde(default)]
    pub topic: String,
}

impl CommandResult {
    /// Successful result correlated to a command
    pub fn success(id: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
            ..Default::default()
        }
    }

    /// Successful result carrying a single `message` field
    pub fn message(id: impl Into<String>, message: &str) -> Self {
        let mut payload = Payload::new();
        payload.insert("message".to_string(), Value::String(message.to_string()));
        Self::success(id, payload)
    }

    /// Error result; the message is prefixed with the dispatcher tag
    pub fn error(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            is_error: true,
            error_message: format!("{ERROR_MESSAGE_PREFIX}{message}"),
            ..Default::default()
        }
    }

    /// Uncorrelated, topic-tagged push with a fresh id
    pub fn notification(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            payload,
            ..Default::default()
        }
    }

    /// The one-shot readiness push sent once workers are running
    pub fn startup() -> Self {
        Self::notification(STARTUP_TOPIC, Payload::new())
    }

    pub fn is_notification(&self) -> bool {
        !self.topic.is_empty()
    }
}

/// Accepts `null` as an empty payload
fn deserialize_payload<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}
