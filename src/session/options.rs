//! Typed start options decoded from the `agent/Start` payload

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::constants::{storage_types, transports};
use crate::error::{DispatchError, Result};
use crate::execution::command::Payload;

/// Options accepted by the session start handler
///
/// Every field is optional on the wire; type mismatches fail the start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentStartOptions {
    #[serde(rename = "agent-default-label")]
    pub label: String,

    #[serde(rename = "http-resolver-url")]
    pub http_resolvers: Vec<String>,

    #[serde(rename = "auto-accept")]
    pub auto_accept: bool,

    #[serde(rename = "outbound-transport")]
    pub outbound_transport: Vec<String>,

    #[serde(rename = "transport-return-route")]
    pub transport_return_route: String,

    #[serde(rename = "log-level")]
    pub log_level: String,

    #[serde(rename = "storageType")]
    pub storage_type: String,

    #[serde(rename = "indexedDB-namespace")]
    pub indexed_db_namespace: String,

    #[serde(rename = "sdsServerURL")]
    pub sds_server_url: String,

    #[serde(rename = "sdsVaultID")]
    pub sds_vault_id: String,

    #[serde(rename = "blocDomain")]
    pub bloc_domain: String,

    #[serde(rename = "trustbloc-resolver")]
    pub trustbloc_resolver: String,
}

impl AgentStartOptions {
    /// Decode options from a start command payload
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|e| DispatchError::config(format!("invalid start options: {e}")))
    }
}

/// Set of DID methods served by one HTTP resolver endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverGroup {
    pub url: String,
    pub methods: BTreeSet<String>,
}

impl ResolverGroup {
    pub fn accepts(&self, method: &str) -> bool {
        self.methods.contains(method)
    }
}

/// Group `"<method>@<url>"` specs by URL, keeping first-appearance order
///
/// `["trustbloc@http://r.com", "v1@http://r.com"]` becomes one group for
/// `http://r.com` accepting `trustbloc` and `v1`.
pub fn parse_http_resolvers(specs: &[String]) -> Result<Vec<ResolverGroup>> {
    let mut groups: Vec<ResolverGroup> = Vec::new();

    for spec in specs {
        let (method, url) = match spec.split('@').collect::<Vec<_>>().as_slice() {
            [method, url] if !method.is_empty() && !url.is_empty() => (*method, *url),
            _ => {
                return Err(DispatchError::invalid_config(format!(
                    "invalid http resolver options found: {spec}"
                )))
            }
        };

        Url::parse(url).map_err(|e| {
            DispatchError::invalid_config(format!("invalid http resolver url {url}: {e}"))
        })?;

        match groups.iter_mut().find(|group| group.url == url) {
            Some(group) => {
                group.methods.insert(method.to_string());
            }
            None => groups.push(ResolverGroup {
                url: url.to_string(),
                methods: BTreeSet::from([method.to_string()]),
            }),
        }
    }

    Ok(groups)
}

/// Outbound transport kinds a session may enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutboundTransport {
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "ws")]
    WebSocket,
}

impl FromStr for OutboundTransport {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            transports::HTTP => Ok(OutboundTransport::Http),
            transports::WEBSOCKET => Ok(OutboundTransport::WebSocket),
            other => Err(DispatchError::invalid_config(format!(
                "unsupported transport : {other}"
            ))),
        }
    }
}

pub fn parse_outbound_transports(values: &[String]) -> Result<Vec<OutboundTransport>> {
    values.iter().map(|value| value.parse()).collect()
}

/// Storage backend discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageType {
    /// Encrypted vault (`sds`)
    #[serde(rename = "sds")]
    Sds,
    /// Local namespaced store (`indexedDB`)
    #[serde(rename = "indexedDB")]
    IndexedDb,
}

impl FromStr for StorageType {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            storage_types::SDS => Ok(StorageType::Sds),
            storage_types::INDEXED_DB => Ok(StorageType::IndexedDb),
            other => Err(DispatchError::invalid_config(format!(
                "{other} is not a valid storage type. Valid storage types: {}",
                storage_types::ALL.join(", ")
            ))),
        }
    }
}
