use agent_worker::{CommandResult, Payload};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for JSON leaf values that survive a text round-trip exactly
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _\\-]{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for nested JSON values
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9_]{0,12}", json_value_strategy(), 0..5)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for well-formed results, correlated or topic-tagged
pub fn command_result_strategy() -> impl Strategy<Value = CommandResult> {
    (
        "[a-f0-9\\-]{1,36}",
        any::<bool>(),
        "[a-zA-Z :]{0,40}",
        payload_strategy(),
        prop::option::of("[a-z_\\-]{1,16}"),
    )
        .prop_map(|(id, is_error, message, payload, topic)| CommandResult {
            id,
            is_error,
            error_message: if is_error { message } else { String::new() },
            payload,
            topic: topic.unwrap_or_default(),
        })
}

/// Strategy for DID method names
pub fn method_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,11}"
}

/// Strategy for resolver endpoint URLs
pub fn resolver_url_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}", prop::option::of(1024u16..65535))
        .prop_map(|(host, port)| match port {
            Some(port) => format!("http://{host}.example.com:{port}/resolve"),
            None => format!("https://{host}.example.com/1.0/identifiers"),
        })
}

/// Strategy for a shuffled mix of `K` slow and `K` fast `test/slow` commands
///
/// Yields `(id, ms)` pairs; ids are `slow-<i>` and `fast-<i>`, K is 3..7.
pub fn mixed_latency_strategy() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::vec((20u64..60, 0u64..3), 3..7).prop_flat_map(|latencies| {
        let commands: Vec<(String, u64)> = latencies
            .iter()
            .enumerate()
            .flat_map(|(i, &(slow, fast))| [(format!("slow-{i}"), slow), (format!("fast-{i}"), fast)])
            .collect();
        Just(commands).prop_shuffle()
    })
}
