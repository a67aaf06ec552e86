use std::{
    cell::RefCell,
    collections::HashMap,
    io,
    path::PathBuf,
    rc::Rc,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("malformed store payload for domain {domain}: {message}")]
    Corrupt { domain: String, message: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Asynchronous key-value service, namespaced by a domain string.
///
/// One domain holds the persisted state of one game. Implementations are
/// driven from a single-threaded runtime, so no `Send` bound is required.
#[allow(async_fn_in_trait)]
pub trait DurableStore {
    /// Fetch every key/value pair stored under `domain`.
    async fn properties_for_domain(
        &self,
        domain: &str,
    ) -> Result<HashMap<String, String>, StoreError>;

    async fn set_value(&self, domain: &str, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete_value(&self, domain: &str, key: &str) -> Result<(), StoreError>;
}

/// In-memory store with shared-handle semantics.
///
/// Clones observe the same contents, which lets a test (or an embedding
/// host) keep a handle to the backend it passed into the cache.
#[derive(Clone, Default)]
pub struct MemoryStore {
    domains: Rc<RefCell<HashMap<String, HashMap<String, String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a domain's current contents.
    pub fn snapshot(&self, domain: &str) -> HashMap<String, String> {
        self.domains
            .borrow()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }
}

impl DurableStore for MemoryStore {
    async fn properties_for_domain(
        &self,
        domain: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.snapshot(domain))
    }

    async fn set_value(&self, domain: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.domains
            .borrow_mut()
            .entry(domain.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete_value(&self, domain: &str, key: &str) -> Result<(), StoreError> {
        if let Some(properties) = self.domains.borrow_mut().get_mut(domain) {
            properties.remove(key);
        }
        Ok(())
    }
}

/// File-backed store keeping one JSON object per domain under a root
/// directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn domain_path(&self, domain: &str) -> PathBuf {
        // Domains come from game identifiers; anything that isn't a safe
        // file-name character is flattened to '_'.
        let mut name: String = domain
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        name.push_str(".json");
        self.root.join(name)
    }

    async fn read_domain(&self, domain: &str) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(self.domain_path(domain)).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
                    domain: domain.to_owned(),
                    message: err.to_string(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_domain(
        &self,
        domain: &str,
        properties: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let payload = serde_json::to_vec_pretty(properties).map_err(|err| StoreError::Corrupt {
            domain: domain.to_owned(),
            message: err.to_string(),
        })?;
        tokio::fs::write(self.domain_path(domain), payload).await?;
        Ok(())
    }
}

impl DurableStore for JsonFileStore {
    async fn properties_for_domain(
        &self,
        domain: &str,
    ) -> Result<HashMap<String, String>, StoreError> {
        self.read_domain(domain).await
    }

    async fn set_value(&self, domain: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let mut properties = self.read_domain(domain).await?;
        properties.insert(key.to_owned(), value.to_owned());
        self.write_domain(domain, &properties).await
    }

    async fn delete_value(&self, domain: &str, key: &str) -> Result<(), StoreError> {
        let mut properties = self.read_domain(domain).await?;
        if properties.remove(key).is_some() {
            self.write_domain(domain, &properties).await?;
        }
        Ok(())
    }
}
