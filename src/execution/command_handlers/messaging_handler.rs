//! Messaging Handler
//!
//! Lets the host push a topic-tagged notification through the session
//! notifier, the same path providers use for asynchronous events.

use serde_json::Value;

use super::{required_str, HandlerEntry, HandlerError, HandlerProvider};
use crate::error::Result;
use crate::execution::command::Payload;
use crate::session::SessionContext;

pub const MESSAGING_PACKAGE: &str = "messaging";

/// Provides `messaging/Notify`
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagingHandlerProvider;

impl HandlerProvider for MessagingHandlerProvider {
    fn name(&self) -> &str {
        MESSAGING_PACKAGE
    }

    fn command_handlers(&self, context: &SessionContext) -> Result<Vec<HandlerEntry>> {
        let notifier = context.notifier.clone();

        Ok(vec![HandlerEntry::json(
            MESSAGING_PACKAGE,
            "Notify",
            move |payload: Payload| {
                let notifier = notifier.clone();
                async move {
                    let topic = required_str(&payload, "topic")?;
                    let message = match payload.get("message") {
                        None | Some(Value::Null) => Payload::new(),
                        Some(Value::Object(message)) => message.clone(),
                        Some(_) => return Err(HandlerError::new("'message' must be a JSON object")),
                    };

                    notifier.notify_payload(topic, message)?;
                    Ok(Payload::new())
                }
            },
        )])
    }
}
