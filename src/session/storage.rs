//! Session storage backends
//!
//! A session owns exactly one [`StorageProvider`], selected by the
//! `storageType` start option. Handlers open named [`Store`]s through it; the
//! provider is closed when the session stops.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::constants::storage_types;
use crate::error::{DispatchError, Result};
use crate::session::keys::SessionKeys;
use crate::session::options::{AgentStartOptions, StorageType};

const DEFAULT_NAMESPACE: &str = "agent";

/// Storage failures surfaced to handlers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("storage provider is closed")]
    Closed,

    #[error("store `{0}` has an invalid name")]
    InvalidStoreName(String),

    #[error("document cipher failure: {0}")]
    Cipher(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Opens named stores for one session
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Backend name (`sds` or `indexedDB`)
    fn kind(&self) -> &'static str;

    async fn open_store(&self, name: &str) -> StorageResult<Arc<dyn Store>>;

    /// Release every store; a second close fails
    async fn close(&self) -> Result<()>;
}

/// Key/value store opened from a [`StorageProvider`]
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Keys in ascending order
    async fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Build the provider selected by the start options
pub fn create_storage_provider(
    options: &AgentStartOptions,
    keys: Arc<SessionKeys>,
    cipher: Arc<dyn DocumentCipher>,
) -> Result<Arc<dyn StorageProvider>> {
    let storage_type = if options.storage_type.is_empty() {
        StorageType::IndexedDb
    } else {
        options.storage_type.parse()?
    };

    match storage_type {
        StorageType::IndexedDb => Ok(Arc::new(LocalStorageProvider::new(
            &options.indexed_db_namespace,
        ))),
        StorageType::Sds => Ok(Arc::new(EncryptedVaultProvider::new(
            &options.sds_server_url,
            &options.sds_vault_id,
            keys,
            cipher,
        )?)),
    }
}

/// In-memory namespaced storage backing `indexedDB`
pub struct LocalStorageProvider {
    namespace: String,
    stores: DashMap<String, Arc<LocalStore>>,
    closed: Arc<AtomicBool>,
}

impl LocalStorageProvider {
    pub fn new(namespace: &str) -> Self {
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        };
        debug!(namespace = %namespace, "Opening local storage");

        Self {
            namespace: namespace.to_string(),
            stores: DashMap::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn open_local(&self, name: &str) -> StorageResult<Arc<LocalStore>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        if name.is_empty() {
            return Err(StorageError::InvalidStoreName(name.to_string()));
        }

        let store = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(LocalStore {
                    entries: DashMap::new(),
                    closed: Arc::clone(&self.closed),
                })
            })
            .clone();

        Ok(store)
    }

    fn shut(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    fn kind(&self) -> &'static str {
        storage_types::INDEXED_DB
    }

    async fn open_store(&self, name: &str) -> StorageResult<Arc<dyn Store>> {
        let store: Arc<dyn Store> = self.open_local(name)?;
        Ok(store)
    }

    async fn close(&self) -> Result<()> {
        if !self.shut() {
            return Err(DispatchError::teardown(format!(
                "failed to close {} storage: already closed",
                self.kind()
            )));
        }
        self.stores.clear();
        info!(namespace = %self.namespace, "Local storage closed");
        Ok(())
    }
}

struct LocalStore {
    entries: DashMap<String, Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl LocalStore {
    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.check_open()?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check_open()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        let keys: BTreeSet<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        Ok(keys.into_iter().collect())
    }
}

/// Encrypts documents before they reach the vault
pub trait DocumentCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> StorageResult<Vec<u8>>;
}

/// Identity cipher used until a key-management backend is plugged in
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCipher;

impl DocumentCipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

/// Encrypted data vault backing `sds`
///
/// Document ids are HMACs of `store/key` under the session key, so the vault
/// never sees plaintext key names.
pub struct EncryptedVaultProvider {
    server_url: Url,
    vault_id: String,
    keys: Arc<SessionKeys>,
    cipher: Arc<dyn DocumentCipher>,
    documents: LocalStorageProvider,
    // store name -> plaintext key index, shared by every handle on that store
    indexes: DashMap<String, Arc<DashMap<String, String>>>,
}

impl EncryptedVaultProvider {
    pub fn new(
        server_url: &str,
        vault_id: &str,
        keys: Arc<SessionKeys>,
        cipher: Arc<dyn DocumentCipher>,
    ) -> Result<Self> {
        if server_url.is_empty() {
            return Err(DispatchError::config(
                "sds storage requires the 'sdsServerURL' option",
            ));
        }
        if vault_id.is_empty() {
            return Err(DispatchError::config(
                "sds storage requires the 'sdsVaultID' option",
            ));
        }

        let server_url = Url::parse(server_url).map_err(|e| {
            DispatchError::invalid_config(format!("invalid sds server url {server_url}: {e}"))
        })?;

        debug!(server = %server_url, vault_id = %vault_id, "Opening encrypted vault");

        Ok(Self {
            server_url,
            vault_id: vault_id.to_string(),
            keys,
            cipher,
            documents: LocalStorageProvider::new(vault_id),
            indexes: DashMap::new(),
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn vault_id(&self) -> &str {
        &self.vault_id
    }
}

#[async_trait]
impl StorageProvider for EncryptedVaultProvider {
    fn kind(&self) -> &'static str {
        storage_types::SDS
    }

    async fn open_store(&self, name: &str) -> StorageResult<Arc<dyn Store>> {
        let documents = self.documents.open_local(name)?;
        let index = Arc::clone(self.indexes.entry(name.to_string()).or_default().value());
        Ok(Arc::new(VaultStore {
            name: name.to_string(),
            documents,
            index,
            keys: Arc::clone(&self.keys),
            cipher: Arc::clone(&self.cipher),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.documents.shut() {
            return Err(DispatchError::teardown(format!(
                "failed to close {} storage: already closed",
                self.kind()
            )));
        }
        self.documents.stores.clear();
        self.indexes.clear();
        info!(vault_id = %self.vault_id, "Encrypted vault closed");
        Ok(())
    }
}

struct VaultStore {
    name: String,
    documents: Arc<LocalStore>,
    // plaintext key -> document id, kept only in session memory
    index: Arc<DashMap<String, String>>,
    keys: Arc<SessionKeys>,
    cipher: Arc<dyn DocumentCipher>,
}

impl VaultStore {
    fn document_id(&self, key: &str) -> String {
        self.keys.mac_hex(format!("{}/{key}", self.name).as_bytes())
    }
}

#[async_trait]
impl Store for VaultStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let document_id = self.document_id(key);
        let sealed = self.cipher.encrypt(&value)?;
        self.documents.put(&document_id, sealed).await?;
        self.index.insert(key.to_string(), document_id);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.documents.get(&self.document_id(key)).await? {
            Some(sealed) => Ok(Some(self.cipher.decrypt(&sealed)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let existed = self.documents.delete(&self.document_id(key)).await?;
        self.index.remove(key);
        Ok(existed)
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.documents.check_open()?;
        let keys: BTreeSet<String> = self.index.iter().map(|e| e.key().clone()).collect();
        Ok(keys.into_iter().collect())
    }
}
