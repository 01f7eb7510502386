//! Store Handler
//!
//! `store/*` commands over the session storage provider. Values are arbitrary
//! JSON and are persisted as their serialized bytes.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::{required_str, HandlerEntry, HandlerError, HandlerProvider};
use crate::error::Result;
use crate::execution::command::Payload;
use crate::session::{SessionContext, StorageError, StorageProvider, Store};

pub const STORE_PACKAGE: &str = "store";

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// Provides `store/Put`, `store/Get`, `store/Delete` and `store/Keys`
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreHandlerProvider;

impl HandlerProvider for StoreHandlerProvider {
    fn name(&self) -> &str {
        STORE_PACKAGE
    }

    fn command_handlers(&self, context: &SessionContext) -> Result<Vec<HandlerEntry>> {
        let storage = &context.storage;

        Ok(vec![
            entry("Put", storage, put),
            entry("Get", storage, get),
            entry("Delete", storage, delete),
            entry("Keys", storage, keys),
        ])
    }
}

fn entry<F, Fut>(function: &str, storage: &Arc<dyn StorageProvider>, op: F) -> HandlerEntry
where
    F: Fn(Arc<dyn StorageProvider>, Payload) -> Fut + Copy + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<Payload, HandlerError>> + Send + 'static,
{
    let storage = Arc::clone(storage);
    HandlerEntry::json(STORE_PACKAGE, function, move |payload: Payload| {
        op(Arc::clone(&storage), payload)
    })
}

async fn open(storage: &Arc<dyn StorageProvider>, payload: &Payload) -> std::result::Result<Arc<dyn Store>, HandlerError> {
    let name = required_str(payload, "store")?;
    Ok(storage.open_store(name).await?)
}

async fn put(storage: Arc<dyn StorageProvider>, payload: Payload) -> std::result::Result<Payload, HandlerError> {
    let store = open(&storage, &payload).await?;
    let key = required_str(&payload, "key")?;
    let value = payload
        .get("value")
        .ok_or_else(|| HandlerError::new("missing required field 'value'"))?;

    let bytes = serde_json::to_vec(value)
        .map_err(|e| HandlerError::new(format!("failed to encode value: {e}")))?;
    store.put(key, bytes).await?;
    debug!(key = %key, "Stored value");

    Ok(Payload::new())
}

async fn get(storage: Arc<dyn StorageProvider>, payload: Payload) -> std::result::Result<Payload, HandlerError> {
    let store = open(&storage, &payload).await?;
    let key = required_str(&payload, "key")?;

    let bytes = store
        .get(key)
        .await?
        .ok_or_else(|| HandlerError::new(format!("data not found for key '{key}'")))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| HandlerError::new(format!("stored value is corrupt: {e}")))?;

    Ok(object(json!({ "value": value })))
}

async fn delete(storage: Arc<dyn StorageProvider>, payload: Payload) -> std::result::Result<Payload, HandlerError> {
    let store = open(&storage, &payload).await?;
    let key = required_str(&payload, "key")?;
    let deleted = store.delete(key).await?;

    Ok(object(json!({ "deleted": deleted })))
}

async fn keys(storage: Arc<dyn StorageProvider>, payload: Payload) -> std::result::Result<Payload, HandlerError> {
    let store = open(&storage, &payload).await?;
    let keys = store.keys().await?;

    Ok(object(json!({ "keys": keys })))
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
