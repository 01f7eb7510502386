//! `test/*` handlers used by the integration suites

use std::time::Duration;

use agent_worker::session::SessionContext;
use agent_worker::{DispatchError, HandlerEntry, HandlerError, HandlerProvider, Payload};
use serde_json::{json, Value};

pub const TEST_PACKAGE: &str = "test";

/// Provides `test/echo`, `test/throwError`, `test/slow` and `test/notify`
pub struct TestHandlerProvider;

impl HandlerProvider for TestHandlerProvider {
    fn name(&self) -> &str {
        TEST_PACKAGE
    }

    fn command_handlers(&self, context: &SessionContext) -> Result<Vec<HandlerEntry>, DispatchError> {
        let notifier = context.notifier.clone();
        let label = context.options.label.clone();

        Ok(vec![
            HandlerEntry::json(TEST_PACKAGE, "echo", move |payload: Payload| {
                let label = label.clone();
                async move {
                    let mut response = payload;
                    response.insert("label".to_string(), json!(label));
                    Ok(response)
                }
            }),
            HandlerEntry::json(TEST_PACKAGE, "throwError", |_payload: Payload| async move {
                Err(HandlerError::with_code(1001, "throwing error as requested"))
            }),
            HandlerEntry::json(TEST_PACKAGE, "slow", |payload: Payload| async move {
                let ms = payload.get("ms").and_then(Value::as_u64).unwrap_or(100);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(object(json!({ "slept": ms })))
            }),
            HandlerEntry::new(TEST_PACKAGE, "notify", move |request: Vec<u8>| {
                let notifier = notifier.clone();
                async move {
                    notifier.notify("test_topic", &request)?;
                    Ok(Vec::new())
                }
            }),
        ])
    }
}

pub fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
