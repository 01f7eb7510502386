//! Host-side harness: a dispatcher plus the receiving end of its sink

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_worker::execution::codec::decode_result;
use agent_worker::{ChannelResultSink, CommandResult, Dispatcher, DispatcherConfig};
use crossbeam::channel::Receiver;
use serde_json::{json, Value};

use super::test_provider::TestHandlerProvider;

const RESULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestHost {
    pub dispatcher: Dispatcher,
    results: Receiver<String>,
    pending: Vec<CommandResult>,
}

impl TestHost {
    /// Quiet dispatcher with the built-in and `test/*` providers
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default().without_startup_notification())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let (sink, results) = ChannelResultSink::unbounded();
        let dispatcher = Dispatcher::builder()
            .with_config(config)
            .with_provider(Arc::new(TestHandlerProvider))
            .build(sink)
            .expect("dispatcher should build inside a runtime");

        Self {
            dispatcher,
            results,
            pending: Vec::new(),
        }
    }

    pub fn send(&self, id: &str, package: &str, function: &str, payload: Value) {
        let text = json!({ "id": id, "pkg": package, "fn": function, "payload": payload }).to_string();
        self.dispatcher.submit(&text);
    }

    /// Send and wait for the correlated result
    pub async fn call(&mut self, id: &str, package: &str, function: &str, payload: Value) -> CommandResult {
        self.send(id, package, function, payload);
        self.wait_for(id).await
    }

    pub async fn start(&mut self, payload: Value) -> CommandResult {
        self.call("start", "agent", "Start", payload).await
    }

    pub async fn stop(&mut self) -> CommandResult {
        self.call("stop", "agent", "Stop", json!({})).await
    }

    /// Wait for the result with `id`, buffering anything else that arrives
    pub async fn wait_for(&mut self, id: &str) -> CommandResult {
        self.wait_until(|result| result.id == id)
            .await
            .unwrap_or_else(|| panic!("no result for id {id} within {RESULT_TIMEOUT:?}"))
    }

    /// Wait for the next notification on `topic`
    pub async fn wait_for_topic(&mut self, topic: &str) -> CommandResult {
        self.wait_until(|result| result.topic == topic)
            .await
            .unwrap_or_else(|| panic!("no notification on {topic} within {RESULT_TIMEOUT:?}"))
    }

    /// Collect exactly `count` results in delivery order
    pub async fn collect(&mut self, count: usize) -> Vec<CommandResult> {
        let deadline = Instant::now() + RESULT_TIMEOUT;
        while self.pending.len() < count {
            assert!(Instant::now() < deadline, "only {} of {count} results arrived", self.pending.len());
            self.pump().await;
        }
        self.pending.drain(..count).collect()
    }

    async fn wait_until(&mut self, matches: impl Fn(&CommandResult) -> bool) -> Option<CommandResult> {
        let deadline = Instant::now() + RESULT_TIMEOUT;
        loop {
            if let Some(index) = self.pending.iter().position(&matches) {
                return Some(self.pending.remove(index));
            }
            if Instant::now() >= deadline {
                return None;
            }
            self.pump().await;
        }
    }

    async fn pump(&mut self) {
        let mut received = false;
        while let Ok(text) = self.results.try_recv() {
            self.pending
                .push(decode_result(&text).expect("dispatcher emits well-formed results"));
            received = true;
        }
        if !received {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Results that arrived but were not consumed by a wait
    pub fn unclaimed(&self) -> &[CommandResult] {
        &self.pending
    }

    pub async fn shutdown(self) -> u64 {
        self.dispatcher.shutdown().await
    }
}
