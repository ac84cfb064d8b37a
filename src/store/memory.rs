//! In-memory session store
//!
//! A single `RwLock` guards the facet map and the topic index together, so
//! every trait operation is indivisible by construction and multi-row
//! writes cannot be observed half-applied. A relational implementation
//! would stand behind the same trait; schema and SQL are out of scope here.

use crate::store::{SessionStore, StoreError, StoreResult};
use crate::types::{ActiveCounts, Facet, RoomId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    facets: HashMap<UserId, Facet>,
    /// Invitation index: topic text -> owner. Topic text is the primary
    /// key, which is what enforces global uniqueness.
    topics: HashMap<String, UserId>,
}

impl StoreState {
    /// Drop any topic rows owned by `user`
    fn clear_topics_of(&mut self, user: UserId) {
        self.topics.retain(|_, owner| *owner != user);
    }

    /// Dissolve the link `user` is in, if any, clearing both sides.
    /// Also clears any stray one-sided rows pointing at `user`.
    fn unlink(&mut self, user: UserId) -> Option<UserId> {
        let partner = match self.facets.get(&user) {
            Some(Facet::Chatting { partner }) => Some(*partner),
            _ => None,
        };
        if let Some(p) = partner {
            self.facets.insert(user, Facet::Idle);
            if matches!(self.facets.get(&p), Some(Facet::Chatting { partner }) if *partner == user)
            {
                self.facets.insert(p, Facet::Idle);
            }
        }
        // A stray reverse row must not survive either
        let strays: Vec<UserId> = self
            .facets
            .iter()
            .filter(|(id, f)| **id != user && f.partner() == Some(user))
            .map(|(id, _)| *id)
            .collect();
        for id in strays {
            self.facets.insert(id, Facet::Idle);
        }
        partner
    }
}

/// Transactional in-memory store with static access lists
pub struct MemoryStore {
    state: RwLock<StoreState>,
    admins: HashSet<UserId>,
    banned: HashSet<UserId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_access_lists(Vec::new(), Vec::new())
    }

    /// Build a store with the admin and ban lists fixed for the process
    /// lifetime; both are immutable at runtime.
    pub fn with_access_lists(admins: Vec<UserId>, banned: Vec<UserId>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            admins: admins.into_iter().collect(),
            banned: banned.into_iter().collect(),
        }
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemoryStore {
    fn facet(&self, user: UserId) -> StoreResult<Facet> {
        let state = self.read()?;
        Ok(state.facets.get(&user).cloned().unwrap_or(Facet::Idle))
    }

    fn set_facet(&self, user: UserId, facet: Facet) -> StoreResult<()> {
        let mut state = self.write()?;
        match &facet {
            Facet::InvitationPosted { topic } => {
                if let Some(owner) = state.topics.get(topic) {
                    if *owner != user {
                        return Err(StoreError::TopicConflict {
                            topic: topic.clone(),
                        });
                    }
                }
                state.clear_topics_of(user);
                state.topics.insert(topic.clone(), user);
            }
            _ => state.clear_topics_of(user),
        }
        state.facets.insert(user, facet);
        Ok(())
    }

    fn create_chat_link(&self, a: UserId, b: UserId) -> StoreResult<()> {
        if a == b {
            return Err(StoreError::SelfLink { user: a });
        }
        let mut state = self.write()?;
        state.unlink(a);
        state.unlink(b);
        state.clear_topics_of(a);
        state.clear_topics_of(b);
        state.facets.insert(a, Facet::Chatting { partner: b });
        state.facets.insert(b, Facet::Chatting { partner: a });
        Ok(())
    }

    fn remove_chat_link(&self, user: UserId) -> StoreResult<Option<UserId>> {
        let mut state = self.write()?;
        Ok(state.unlink(user))
    }

    fn post_invitation(&self, user: UserId, topic: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(owner) = state.topics.get(topic) {
            if *owner != user {
                return Err(StoreError::TopicConflict {
                    topic: topic.to_string(),
                });
            }
        }
        // Posting implies leaving any chat; never leave the partner with a
        // one-sided link.
        state.unlink(user);
        state.clear_topics_of(user);
        state.topics.insert(topic.to_string(), user);
        state.facets.insert(
            user,
            Facet::InvitationPosted {
                topic: topic.to_string(),
            },
        );
        Ok(())
    }

    fn pop_invitation(&self, topic: &str) -> StoreResult<Option<UserId>> {
        let mut state = self.write()?;
        let owner = match state.topics.remove(topic) {
            Some(owner) => owner,
            None => return Ok(None),
        };
        // The owner falls back to plain lobby presence until the caller
        // commits the pairing.
        if matches!(
            state.facets.get(&owner),
            Some(Facet::InvitationPosted { .. })
        ) {
            state.facets.insert(owner, Facet::InLobby { room: 0 });
        }
        Ok(Some(owner))
    }

    fn invitation_owner(&self, topic: &str) -> StoreResult<Option<UserId>> {
        let state = self.read()?;
        Ok(state.topics.get(topic).copied())
    }

    fn cancel_invitation(&self, user: UserId, room: RoomId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.clear_topics_of(user);
        if matches!(
            state.facets.get(&user),
            Some(Facet::TypingTopic) | Some(Facet::InvitationPosted { .. })
        ) {
            state.facets.insert(user, Facet::InLobby { room });
        }
        Ok(())
    }

    fn list_unmatched_users(&self) -> StoreResult<Vec<UserId>> {
        let state = self.read()?;
        Ok(state
            .facets
            .iter()
            .filter(|(_, f)| f.is_lobbyish())
            .map(|(id, _)| *id)
            .collect())
    }

    fn list_posted_topics(&self) -> StoreResult<Vec<String>> {
        let state = self.read()?;
        // HashMap iteration order serves as the intentional shuffle
        Ok(state.topics.keys().cloned().collect())
    }

    fn list_known_users(&self) -> StoreResult<Vec<UserId>> {
        let state = self.read()?;
        Ok(state
            .facets
            .iter()
            .filter(|(_, f)| f.is_connected())
            .map(|(id, _)| *id)
            .collect())
    }

    fn active_counts(&self) -> StoreResult<ActiveCounts> {
        let state = self.read()?;
        let mut counts = ActiveCounts::default();
        for facet in state.facets.values() {
            match facet {
                Facet::Chatting { .. } => counts.chatting += 1,
                f if f.is_lobbyish() => counts.in_lobby += 1,
                _ => {}
            }
        }
        Ok(counts)
    }

    fn is_banned(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.banned.contains(&user))
    }

    fn is_admin(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.admins.contains(&user))
    }
}
