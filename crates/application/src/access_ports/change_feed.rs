use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{ObjectKey, ObjectKind};

/// One observed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Monotonic feed position.
    pub sequence: u64,
    /// Kind of the changed object.
    pub kind: ObjectKind,
    /// Key of the changed object.
    pub key: ObjectKey,
    /// Request named by a changed response.
    pub request_ref: Option<String>,
}

/// Page of change events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Events ordered by sequence.
    pub events: Vec<ChangeEvent>,
    /// Cursor to pass to the next poll.
    pub next_cursor: u64,
}

/// Live keys of one kind plus the feed position they are current as of.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectListing {
    /// Keys of every stored object of the kind, deleting ones included.
    pub keys: Vec<ObjectKey>,
    /// Feed position read no later than the keys.
    ///
    /// Watching from here misses no write made after the listing.
    pub cursor: u64,
}

/// Notification port replacing a push-based watch.
///
/// Consumers list first, then follow the feed from the listing cursor, and
/// compact what they have consumed.
#[async_trait]
pub trait ClusterChangeFeed: Send + Sync {
    /// Lists the keys of every live object of one kind.
    async fn list_keys(&self, kind: ObjectKind) -> AppResult<ObjectListing>;

    /// Returns events with a sequence greater than the cursor.
    async fn changes_since(&self, cursor: u64, limit: usize) -> AppResult<ChangeBatch>;

    /// Drops events with a sequence at or below `through`; returns how many went.
    async fn compact(&self, through: u64) -> AppResult<u64>;
}
