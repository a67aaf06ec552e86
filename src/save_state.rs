use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use log::{debug, warn};

use crate::store::{DurableStore, StoreError};

/// Keys carrying this prefix hold real-time-clock register state and are
/// transcoded to/from JSON at the cache boundary.
pub const RTC_KEY_PREFIX: &str = "RTC_";

const MAX_WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Value as seen by cache users.
///
/// RTC keys carry [`SaveValue::Structured`] records; everything else is plain
/// text. The cache stores the encoded text form internally, so comparisons
/// and store writes always operate on strings.
#[derive(Clone, Debug, PartialEq)]
pub enum SaveValue {
    Text(String),
    Structured(serde_json::Value),
}

impl SaveValue {
    pub fn text(value: impl Into<String>) -> Self {
        SaveValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SaveValue::Text(text) => Some(text),
            SaveValue::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            SaveValue::Text(_) => None,
            SaveValue::Structured(value) => Some(value),
        }
    }
}

impl From<&str> for SaveValue {
    fn from(value: &str) -> Self {
        SaveValue::Text(value.to_owned())
    }
}

impl From<String> for SaveValue {
    fn from(value: String) -> Self {
        SaveValue::Text(value)
    }
}

impl From<serde_json::Value> for SaveValue {
    fn from(value: serde_json::Value) -> Self {
        SaveValue::Structured(value)
    }
}

/// Write that exhausted its retries and was dropped.
#[derive(Debug)]
pub struct PersistFailure {
    pub domain: String,
    pub key: String,
    pub error: StoreError,
}

enum WriteKind {
    Put(String),
    Delete,
}

struct WriteOp {
    domain: String,
    key: String,
    kind: WriteKind,
}

struct CacheState {
    domain: Option<String>,
    entries: HashMap<String, String>,
    queue: VecDeque<WriteOp>,
    epoch: u64,
}

struct CacheShared<S> {
    store: S,
    state: RefCell<CacheState>,
    on_persist_failure: RefCell<Option<Box<dyn FnMut(PersistFailure)>>>,
}

/// In-memory mirror of one domain's key-value pairs.
///
/// The cache is a cheap-clone handle; the lifecycle controller, engine glue,
/// and tests can all hold one and observe the same entries. All reads and
/// writes go through it, with store traffic buffered in a retry queue drained
/// by [`SaveStateCache::flush`].
pub struct SaveStateCache<S> {
    shared: Rc<CacheShared<S>>,
}

impl<S> Clone for SaveStateCache<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<S: DurableStore> SaveStateCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            shared: Rc::new(CacheShared {
                store,
                state: RefCell::new(CacheState {
                    domain: None,
                    entries: HashMap::new(),
                    queue: VecDeque::new(),
                    epoch: 0,
                }),
                on_persist_failure: RefCell::new(None),
            }),
        }
    }

    pub fn domain(&self) -> Option<String> {
        self.shared.state.borrow().domain.clone()
    }

    /// Register the handler invoked when a write is dropped after exhausting
    /// its retries.
    pub fn on_persist_failure(&self, handler: impl FnMut(PersistFailure) + 'static) {
        *self.shared.on_persist_failure.borrow_mut() = Some(Box::new(handler));
    }

    /// Select `domain` and repopulate the mirror from the store.
    ///
    /// Clears the cache immediately, then installs the fetched properties
    /// unless a newer `open` superseded this one, in which case the fetch
    /// results are discarded. `get`/`set` are only trustworthy once the
    /// returned future resolves.
    pub async fn open(&self, domain: &str) -> Result<(), StoreError> {
        let epoch = {
            let mut state = self.shared.state.borrow_mut();
            state.epoch += 1;
            state.domain = Some(domain.to_owned());
            state.entries.clear();
            state.epoch
        };

        let properties = self.shared.store.properties_for_domain(domain).await?;

        let mut state = self.shared.state.borrow_mut();
        if state.epoch != epoch {
            debug!("discarding stale save-state fetch for {domain}");
            return Ok(());
        }
        state.entries = properties;
        Ok(())
    }

    /// Synchronous lookup. RTC keys are decoded back to their structured
    /// form; malformed payloads read as absent.
    pub fn get(&self, key: &str) -> Option<SaveValue> {
        let state = self.shared.state.borrow();
        let raw = state.entries.get(key)?;

        if is_rtc_key(key) {
            match serde_json::from_str(raw) {
                Ok(value) => Some(SaveValue::Structured(value)),
                Err(err) => {
                    warn!("malformed RTC payload under {key}: {err}");
                    None
                }
            }
        } else {
            Some(SaveValue::Text(raw.clone()))
        }
    }

    /// Write `key`, updating the mirror synchronously.
    ///
    /// The store write is only enqueued when the encoded value differs from
    /// the cached one, so re-writing an unchanged value costs nothing.
    pub fn set(&self, key: &str, value: &SaveValue) {
        let Some(encoded) = encode_value(key, value) else {
            return;
        };

        let mut state = self.shared.state.borrow_mut();
        let Some(domain) = state.domain.clone() else {
            warn!("dropping save-state write to {key}: no domain open");
            return;
        };

        if state.entries.get(key).is_some_and(|previous| *previous == encoded) {
            return;
        }

        state.entries.insert(key.to_owned(), encoded.clone());
        state.queue.push_back(WriteOp {
            domain,
            key: key.to_owned(),
            kind: WriteKind::Put(encoded),
        });
    }

    pub fn delete(&self, key: &str) {
        let mut state = self.shared.state.borrow_mut();
        let Some(domain) = state.domain.clone() else {
            warn!("dropping save-state delete of {key}: no domain open");
            return;
        };

        state.entries.remove(key);
        state.queue.push_back(WriteOp {
            domain,
            key: key.to_owned(),
            kind: WriteKind::Delete,
        });
    }

    /// Number of writes waiting for [`SaveStateCache::flush`].
    pub fn pending_writes(&self) -> usize {
        self.shared.state.borrow().queue.len()
    }

    /// Drain the write queue against the store.
    ///
    /// Each op is attempted up to `MAX_WRITE_ATTEMPTS` times with a short
    /// backoff; an op that still fails is dropped with a warning and handed
    /// to the persistence-failure handler. Hosts are expected to pump this
    /// from their event loop.
    pub async fn flush(&self) {
        loop {
            let op = self.shared.state.borrow_mut().queue.pop_front();
            let Some(op) = op else {
                break;
            };

            let mut attempt = 1;
            loop {
                match self.persist(&op).await {
                    Ok(()) => break,
                    Err(err) if attempt < MAX_WRITE_ATTEMPTS => {
                        debug!(
                            "retrying save-state write {}/{} after failure: {err}",
                            op.domain, op.key
                        );
                        attempt += 1;
                        tokio::time::sleep(WRITE_RETRY_DELAY).await;
                    }
                    Err(err) => {
                        warn!("dropping save-state write {}/{}: {err}", op.domain, op.key);
                        if let Some(handler) = self.shared.on_persist_failure.borrow_mut().as_mut()
                        {
                            handler(PersistFailure {
                                domain: op.domain.clone(),
                                key: op.key.clone(),
                                error: err,
                            });
                        }
                        break;
                    }
                }
            }
        }
    }

    async fn persist(&self, op: &WriteOp) -> Result<(), StoreError> {
        match &op.kind {
            WriteKind::Put(value) => {
                self.shared.store.set_value(&op.domain, &op.key, value).await
            }
            WriteKind::Delete => self.shared.store.delete_value(&op.domain, &op.key).await,
        }
    }
}

fn is_rtc_key(key: &str) -> bool {
    key.starts_with(RTC_KEY_PREFIX)
}

// The RTC can't be stored in its native form; JSON-encode it. Non-RTC keys
// pass through as plain text.
fn encode_value(key: &str, value: &SaveValue) -> Option<String> {
    let encoded = if is_rtc_key(key) {
        match value {
            SaveValue::Structured(structured) => serde_json::to_string(structured),
            SaveValue::Text(text) => serde_json::to_string(text),
        }
    } else {
        match value {
            SaveValue::Text(text) => return Some(text.clone()),
            SaveValue::Structured(structured) => serde_json::to_string(structured),
        }
    };

    match encoded {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("cannot encode save-state value for {key}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_prefix_is_exact() {
        assert!(is_rtc_key("RTC_ALARM"));
        assert!(is_rtc_key("RTC_"));
        assert!(!is_rtc_key("RTc_ALARM"));
        assert!(!is_rtc_key("HP"));
    }

    #[test]
    fn rtc_values_encode_to_json() {
        let value = SaveValue::Structured(serde_json::json!({"h": 3}));
        assert_eq!(encode_value("RTC_ALARM", &value).as_deref(), Some("{\"h\":3}"));
    }

    #[test]
    fn rtc_text_values_are_json_quoted() {
        let value = SaveValue::text("latched");
        assert_eq!(
            encode_value("RTC_STATE", &value).as_deref(),
            Some("\"latched\"")
        );
    }

    #[test]
    fn plain_keys_pass_through() {
        let value = SaveValue::text("10");
        assert_eq!(encode_value("HP", &value).as_deref(), Some("10"));
    }
}
