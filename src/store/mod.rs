//! Session store for user facets, invitations, chat links, and access lists
//!
//! The store is the system's only cross-cutting mutual-exclusion point:
//! every operation is a single indivisible unit, and multi-row writes (the
//! two sides of a chat link, an invitation replace) are all-or-nothing.

pub mod memory;

pub use memory::MemoryStore;

use crate::types::{ActiveCounts, Facet, RoomId, UserId};

/// Errors surfaced by session store operations. Callers propagate these to
/// the top-level command boundary; they are never silently swallowed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store lock poisoned")]
    Poisoned,

    #[error("topic \"{topic}\" is already posted by another user")]
    TopicConflict { topic: String },

    #[error("refusing chat link of user {user} with themselves")]
    SelfLink { user: UserId },
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Atomic read-modify-write primitives over session state.
///
/// Implementations must guarantee that each method executes as one
/// indivisible operation: partial application (one side of a chat link
/// written, the other not) must not be observable, even under failure
/// mid-operation.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Current facet of a user; users unknown to the store are `Idle`
    fn facet(&self, user: UserId) -> StoreResult<Facet>;

    /// Overwrite a user's facet. Single-writer semantics: last write wins,
    /// no merge. Setting `Idle` forgets any invitation the user owned.
    fn set_facet(&self, user: UserId, facet: Facet) -> StoreResult<()>;

    /// Atomically pair two users: removes any invitation either party
    /// owns, dissolves any prior link either party is in, and writes both
    /// `Chatting` rows. All-or-nothing.
    fn create_chat_link(&self, a: UserId, b: UserId) -> StoreResult<()>;

    /// Atomically dissolve a chat link from either side. Both parties end
    /// up `Idle`; returns the ex-partner if a link existed.
    fn remove_chat_link(&self, user: UserId) -> StoreResult<Option<UserId>>;

    /// Post or replace the user's invitation under `topic`. Re-posting
    /// one's own topic is an idempotent replace; a topic owned by a
    /// different user is rejected with [`StoreError::TopicConflict`],
    /// never silently overwritten.
    fn post_invitation(&self, user: UserId, topic: &str) -> StoreResult<()>;

    /// Atomically read and remove the invitation under `topic`, returning
    /// its owner. Exactly one of several concurrent claimants wins.
    fn pop_invitation(&self, topic: &str) -> StoreResult<Option<UserId>>;

    /// Read-only probe of an invitation's owner
    fn invitation_owner(&self, topic: &str) -> StoreResult<Option<UserId>>;

    /// Drop any invitation or topic prompt the user has open, returning
    /// them to the lobby. No-op for other facets.
    fn cancel_invitation(&self, user: UserId, room: RoomId) -> StoreResult<()>;

    /// The lobby population: users in the lobby, typing a topic, or
    /// waiting on a posted invitation. These receive discovery broadcasts
    /// and lobby chatter.
    fn list_unmatched_users(&self) -> StoreResult<Vec<UserId>>;

    /// Currently posted invitation topics, in store-defined (effectively
    /// random) order. The randomization is intentional so repeat viewers
    /// are not always shown the same topics.
    fn list_posted_topics(&self) -> StoreResult<Vec<String>>;

    /// Every connected user (chatting + lobby population), for broadcasts
    fn list_known_users(&self) -> StoreResult<Vec<UserId>>;

    /// Connected-user counts for the lobby summary
    fn active_counts(&self) -> StoreResult<ActiveCounts>;

    fn is_banned(&self, user: UserId) -> StoreResult<bool>;

    fn is_admin(&self, user: UserId) -> StoreResult<bool>;
}
