//! The remote group directory the pipeline talks to.

use async_trait::async_trait;
use thiserror::Error;

use super::{ChatRecord, MemberRecord};

/// Outcome of a failed directory call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The provider wants us to wait this many seconds.
    #[error("Flood wait required: {0} seconds")]
    Cooldown(u32),

    /// The handle no longer points at a usable group.
    #[error("Could not resolve @{handle}: {reason}")]
    Resolution { handle: String, reason: String },

    /// Any other remote failure. Not retried.
    #[error("Remote call failed: {0}")]
    Remote(String),
}

/// A group that was resolved by handle and can be queried for members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub id: i64,
    pub access_hash: i64,
}

/// Searchable directory of public groups.
///
/// Implementations perform exactly one remote request per call and leave
/// retries to the caller.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Searches public chats matching `query`.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<ChatRecord>, DirectoryError>;

    /// Resolves a public handle to a group.
    async fn resolve_handle(&self, handle: &str) -> Result<ResolvedGroup, DirectoryError>;

    /// Lists up to `limit` members of a group.
    async fn list_members(
        &self,
        group: ResolvedGroup,
        limit: u32,
    ) -> Result<Vec<MemberRecord>, DirectoryError>;
}
