// In-process gateway. Used by tests and single-process runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{PersistenceGateway, Versioned};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct Log {
    keys: HashSet<String>,
    entries: Vec<Value>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: BTreeMap<String, Versioned<Value>>,
    logs: HashMap<String, Log>,
}

/// Mutex-guarded maps. Every call is a single critical section, so CAS and
/// uniqueness hold across threads.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("gateway mutex poisoned")
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn get(&self, key: &str) -> Result<Option<Versioned<Value>>, GatewayError> {
        Ok(self.inner().documents.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> Result<u64, GatewayError> {
        let mut inner = self.inner();
        let current = inner.documents.get(key).map(|d| d.version);
        if current != expected_version {
            return Err(GatewayError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
            });
        }
        let version = current.map_or(1, |v| v + 1);
        inner
            .documents
            .insert(key.to_string(), Versioned { version, value });
        Ok(version)
    }

    async fn append_unique(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: Value,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner();
        let log = inner.logs.entry(log_key.to_string()).or_default();
        if !log.keys.insert(unique_key.to_string()) {
            return Err(GatewayError::DuplicateKey {
                log_key: log_key.to_string(),
                unique_key: unique_key.to_string(),
            });
        }
        log.entries.push(entry);
        Ok(())
    }

    async fn read_log(&self, log_key: &str) -> Result<Vec<Value>, GatewayError> {
        Ok(self
            .inner()
            .logs
            .get(log_key)
            .map(|log| log.entries.clone())
            .unwrap_or_default())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self
            .inner()
            .documents
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_create_then_cas() {
        let gw = InMemoryGateway::new();
        assert_eq!(gw.put("k", json!(1), None).await.unwrap(), 1);
        assert!(matches!(
            gw.put("k", json!(2), None).await,
            Err(GatewayError::VersionConflict { .. })
        ));
        assert_eq!(gw.put("k", json!(2), Some(1)).await.unwrap(), 2);
        assert!(matches!(
            gw.put("k", json!(3), Some(1)).await,
            Err(GatewayError::VersionConflict { .. })
        ));
        let doc = gw.get("k").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.value, json!(2));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let gw = InMemoryGateway::new();
        assert!(gw.get("nope").await.unwrap().is_none());
        assert!(matches!(
            gw.put("nope", json!(1), Some(3)).await,
            Err(GatewayError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn append_unique_rejects_duplicates() {
        let gw = InMemoryGateway::new();
        gw.append_unique("log", "a", json!({"n": 1})).await.unwrap();
        gw.append_unique("log", "b", json!({"n": 2})).await.unwrap();
        assert!(matches!(
            gw.append_unique("log", "a", json!({"n": 3})).await,
            Err(GatewayError::DuplicateKey { .. })
        ));
        // Same unique key in a different log is fine.
        gw.append_unique("other", "a", json!({"n": 4})).await.unwrap();

        let entries = gw.read_log("log").await.unwrap();
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 2})]);
        assert!(gw.read_log("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_keys_by_prefix() {
        let gw = InMemoryGateway::new();
        gw.put("draft:b:state", json!({}), None).await.unwrap();
        gw.put("draft:a:state", json!({}), None).await.unwrap();
        gw.put("other", json!({}), None).await.unwrap();
        assert_eq!(
            gw.list_keys("draft:").await.unwrap(),
            vec!["draft:a:state".to_string(), "draft:b:state".to_string()]
        );
    }
}
