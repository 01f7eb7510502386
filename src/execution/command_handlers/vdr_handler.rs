//! VDR Handler
//!
//! Exposes the HTTP resolver groups configured for the session.

use super::{HandlerEntry, HandlerProvider};
use crate::error::{DispatchError, Result};
use crate::execution::command::Payload;
use crate::session::SessionContext;

pub const VDR_PACKAGE: &str = "vdr";

/// Provides `vdr/GetResolvers`
#[derive(Debug, Default, Clone, Copy)]
pub struct VdrHandlerProvider;

impl HandlerProvider for VdrHandlerProvider {
    fn name(&self) -> &str {
        VDR_PACKAGE
    }

    fn command_handlers(&self, context: &SessionContext) -> Result<Vec<HandlerEntry>> {
        let resolvers = serde_json::to_value(&*context.resolvers)
            .map_err(|e| DispatchError::config(format!("failed to encode resolvers: {e}")))?;

        Ok(vec![HandlerEntry::json(
            VDR_PACKAGE,
            "GetResolvers",
            move |_payload: Payload| {
                let resolvers = resolvers.clone();
                async move {
                    let mut response = Payload::new();
                    response.insert("resolvers".to_string(), resolvers);
                    Ok(response)
                }
            },
        )])
    }
}
