// Persistence gateway: the document/log store contract the engine runs on.

pub mod memory;
pub mod retry;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;

pub use memory::InMemoryGateway;
pub use retry::{RetryPolicy, RetryingGateway};
pub use sqlite::SqliteGateway;

/// A stored document and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Key-value documents with compare-and-swap, plus append-only logs with a
/// per-entry uniqueness key.
///
/// `VersionConflict` and `DuplicateKey` are ordinary outcomes under
/// concurrency, not failures of the store.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch a document. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Versioned<Value>>, GatewayError>;

    /// Write a document if its stored version is `expected_version`
    /// (`None` means the key must not exist yet). Returns the new version.
    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> Result<u64, GatewayError>;

    /// Append `entry` to `log_key` unless an entry with `unique_key` is
    /// already there.
    async fn append_unique(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: Value,
    ) -> Result<(), GatewayError>;

    /// All entries of a log in append order.
    async fn read_log(&self, log_key: &str) -> Result<Vec<Value>, GatewayError>;

    /// Document keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, GatewayError>;
}

/// Key layout for draft data.
pub mod keys {
    pub const DRAFT_PREFIX: &str = "draft:";
    const STATE_SUFFIX: &str = ":state";

    pub fn state(league_id: &str) -> String {
        format!("{DRAFT_PREFIX}{league_id}{STATE_SUFFIX}")
    }

    pub fn picks(league_id: &str) -> String {
        format!("{DRAFT_PREFIX}{league_id}:picks")
    }

    pub fn rosters(league_id: &str) -> String {
        format!("{DRAFT_PREFIX}{league_id}:rosters")
    }

    pub fn events(league_id: &str) -> String {
        format!("{DRAFT_PREFIX}{league_id}:events")
    }

    /// Inverse of [`state`]. `None` for any other key.
    pub fn league_from_state_key(key: &str) -> Option<&str> {
        key.strip_prefix(DRAFT_PREFIX)?
            .strip_suffix(STATE_SUFFIX)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn state_key_round_trip() {
        let key = keys::state("league-42");
        assert_eq!(key, "draft:league-42:state");
        assert_eq!(keys::league_from_state_key(&key), Some("league-42"));
    }

    #[test]
    fn non_state_keys_are_ignored() {
        assert_eq!(keys::league_from_state_key(&keys::picks("lg")), None);
        assert_eq!(keys::league_from_state_key("draft::state"), None);
        assert_eq!(keys::league_from_state_key("other:lg:state"), None);
    }
}
