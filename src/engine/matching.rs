//! Topic match-or-post logic
//!
//! The heart of pairing: a proposed topic either claims an existing
//! invitation (first claim wins, atomically) or becomes a new invitation.
//! Self-collisions always resolve to re-posting, never self-pairing.

use crate::engine::{replies, Matchmaker};
use crate::error::Result;
use crate::store::StoreError;
use crate::types::{OutboundAction, OutboundPayload, Priority, UserId};
use crate::utils::clip_topic;
use tracing::{debug, info};

/// How the topic reached the engine; only the reply wording differs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSource {
    /// Typed via `/new` or the topic prompt
    Proposed,
    /// Tapped on a discovery control
    Accepted,
}

impl TopicSource {
    fn wait_text(self, topic: &str) -> String {
        match self {
            TopicSource::Proposed => replies::topic_posted_wait(topic),
            TopicSource::Accepted => replies::topic_joining_wait(topic),
        }
    }

    fn success_text(self, topic: &str) -> String {
        match self {
            TopicSource::Proposed => replies::topic_posted(topic),
            TopicSource::Accepted => replies::topic_joining(topic),
        }
    }
}

impl Matchmaker {
    /// Match-or-post a topic for `user`. The clipped form is the lookup
    /// key; the raw form is what the user sees echoed back.
    pub(crate) async fn respond_topic(
        &self,
        user: UserId,
        raw_topic: &str,
        source: TopicSource,
    ) -> Result<()> {
        let topic = clip_topic(raw_topic);
        if topic.is_empty() {
            return Ok(());
        }

        match self.store().invitation_owner(&topic)? {
            Some(owner) if owner != user => {
                // Claim it. The pop is atomic, so of any number of
                // concurrent claimants exactly one gets the owner.
                match self.store().pop_invitation(&topic)? {
                    Some(partner) if partner != user => {
                        self.commit_match(user, partner, &topic, source).await
                    }
                    _ => self.topic_gone(user, &topic).await,
                }
            }
            owner => {
                // Fresh topic, or the user's own stale posting
                let rebroadcast = owner.is_none();
                self.post_and_wait(user, raw_topic, &topic, source, rebroadcast)
                    .await
            }
        }
    }

    /// Post (or idempotently re-post) the invitation and tell the user to
    /// wait. New invitations are refused outside open hours and are
    /// announced to the rest of the lobby.
    async fn post_and_wait(
        &self,
        user: UserId,
        raw_topic: &str,
        topic: &str,
        source: TopicSource,
        rebroadcast: bool,
    ) -> Result<()> {
        if !self.admission_open() {
            self.quick_reply(user, replies::closed());
            return Ok(());
        }

        match self.store().post_invitation(user, topic) {
            Ok(()) => {}
            Err(StoreError::TopicConflict { .. }) => {
                // Someone else posted the same topic between our probe and
                // the write; claim them instead.
                debug!("Topic \"{topic}\" contended; attempting claim");
                return match self.store().pop_invitation(topic)? {
                    Some(partner) if partner != user => {
                        self.commit_match(user, partner, topic, source).await
                    }
                    _ => self.topic_gone(user, topic).await,
                };
            }
            Err(e) => return Err(e.into()),
        }

        self.metrics().session().invitations_posted_total.inc();
        info!("User {user} posted invitation \"{topic}\"");
        self.quick_reply(user, source.wait_text(raw_topic.trim()));

        if rebroadcast {
            self.broadcast_invitation(user, topic)?;
        }
        Ok(())
    }

    /// The claimed topic vanished under us; show fresh choices instead of
    /// leaving the user stateless.
    async fn topic_gone(&self, user: UserId, topic: &str) -> Result<()> {
        self.quick_reply(user, replies::topic_gone(topic));
        self.send_topic_menu(user, replies::topic_list_short())
            .await?;
        Ok(())
    }

    /// Commit a pairing: one atomic store operation creates the symmetric
    /// link and consumes both parties' lobby/invitation state, then both
    /// parties are congratulated and the rest of the lobby is told the
    /// topic is gone.
    async fn commit_match(
        &self,
        user: UserId,
        partner: UserId,
        topic: &str,
        source: TopicSource,
    ) -> Result<()> {
        self.store().create_chat_link(user, partner)?;
        self.metrics().session().matches_total.inc();
        info!("Matched users {user} and {partner} on \"{topic}\"");

        self.quick_reply(user, source.success_text(topic));

        let connected = replies::matched(topic, self.settings().debug_mode);
        self.queue().enqueue(
            Priority::High,
            vec![
                OutboundAction::new(user, OutboundPayload::text(connected.clone())),
                OutboundAction::new(partner, OutboundPayload::text(connected)),
            ],
            None,
        );

        self.broadcast_match(user, partner, topic)?;
        Ok(())
    }

    /// Tell the rest of the lobby about a fresh invitation, with a join
    /// control attached. Quiet, lowest tier.
    fn broadcast_invitation(&self, poster: UserId, topic: &str) -> Result<()> {
        let nick = self.pseudonym(poster);
        let body = replies::discovery_invitation(&nick, topic);
        let actions: Vec<OutboundAction> = self
            .store()
            .list_unmatched_users()?
            .into_iter()
            .filter(|u| *u != poster)
            .map(|u| {
                OutboundAction::new(
                    u,
                    OutboundPayload::JoinPrompt {
                        body: body.clone(),
                        topic: topic.to_string(),
                        quiet: true,
                    },
                )
            })
            .collect();
        self.queue().enqueue(Priority::Low, actions, None);
        Ok(())
    }

    /// Tell the rest of the lobby a topic has been matched away
    fn broadcast_match(&self, a: UserId, b: UserId, topic: &str) -> Result<()> {
        let nick = self.pseudonym(a);
        let body = replies::match_broadcast(&nick, topic);
        let actions: Vec<OutboundAction> = self
            .store()
            .list_unmatched_users()?
            .into_iter()
            .filter(|u| *u != a && *u != b)
            .map(|u| OutboundAction::new(u, OutboundPayload::quiet_text(body.clone())))
            .collect();
        self.queue().enqueue(Priority::Low, actions, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{build_engine, wait_until};
    use crate::store::{MemoryStore, SessionStore};
    use crate::types::Facet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_posting_fresh_topic_waits_and_broadcasts_discovery() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();

        engine
            .respond_topic(1, "movies", TopicSource::Proposed)
            .await
            .unwrap();

        assert_eq!(
            store.facet(1).unwrap(),
            Facet::InvitationPosted {
                topic: "movies".to_string()
            }
        );
        // The poster waits; the other lobby member gets a join control
        wait_until(|| !messenger.bodies_for(2).is_empty()).await;
        assert!(messenger.bodies_for(1)[0].contains("You posted"));
        assert!(messenger.bodies_for(2)[0].contains("movies"));
    }

    #[tokio::test]
    async fn test_matching_topic_pairs_both_users() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();
        store.post_invitation(1, "movies").unwrap();

        engine
            .respond_topic(2, "movies", TopicSource::Accepted)
            .await
            .unwrap();

        assert_eq!(store.facet(1).unwrap(), Facet::Chatting { partner: 2 });
        assert_eq!(store.facet(2).unwrap(), Facet::Chatting { partner: 1 });
        assert!(store.list_posted_topics().unwrap().is_empty());

        // Both parties hear the connection notice; the partner's send is
        // the later one, so wait for it
        wait_until(|| {
            messenger
                .bodies_for(2)
                .iter()
                .any(|b| b.contains("You are connected"))
        })
        .await;
        assert!(messenger
            .bodies_for(1)
            .iter()
            .any(|b| b.contains("You are connected")));
    }

    #[tokio::test]
    async fn test_self_accept_reposts_instead_of_self_pairing() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _messenger) = build_engine(store.clone());
        store.post_invitation(1, "movies").unwrap();

        engine
            .respond_topic(1, "movies", TopicSource::Accepted)
            .await
            .unwrap();

        // Never Chatting(self, self); the invitation simply stands again
        assert_eq!(
            store.facet(1).unwrap(),
            Facet::InvitationPosted {
                topic: "movies".to_string()
            }
        );
        assert_eq!(store.invitation_owner("movies").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_self_repost_does_not_rebroadcast_discovery() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();
        store.post_invitation(1, "movies").unwrap();

        engine
            .respond_topic(1, "movies", TopicSource::Proposed)
            .await
            .unwrap();

        wait_until(|| !messenger.bodies_for(1).is_empty()).await;
        // Leave room for a (wrong) low-tier discovery notice to drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(messenger.bodies_for(2).is_empty());
    }

    #[tokio::test]
    async fn test_long_topics_match_on_clipped_key() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();
        let long_topic = "a".repeat(100);

        engine
            .respond_topic(1, &long_topic, TopicSource::Proposed)
            .await
            .unwrap();
        engine
            .respond_topic(2, &long_topic, TopicSource::Proposed)
            .await
            .unwrap();

        assert_eq!(store.facet(1).unwrap(), Facet::Chatting { partner: 2 });
    }

    #[tokio::test]
    async fn test_match_excludes_both_parties_from_lobby_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(3, Facet::InLobby { room: 0 }).unwrap();
        store.post_invitation(1, "movies").unwrap();

        engine
            .respond_topic(2, "movies", TopicSource::Accepted)
            .await
            .unwrap();

        wait_until(|| !messenger.bodies_for(3).is_empty()).await;
        assert!(messenger.bodies_for(3)[0].contains("Invitation matched"));
    }

    #[tokio::test]
    async fn test_closed_hours_refuse_new_invitations_only() {
        use crate::dispatch::DispatchConfig;
        use crate::engine::{Matchmaker, MatchmakerSettings};
        use crate::engine::test_support::CapturingMessenger;
        use crate::hours::OpenHours;
        use crate::metrics::MetricsCollector;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(CapturingMessenger::default());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let queue = crate::dispatch::DispatchQueue::start(
            messenger.clone(),
            DispatchConfig {
                pacing_interval: Duration::from_millis(1),
                ..DispatchConfig::default()
            },
            metrics.clone(),
        );
        // A one-hour window two hours from now: certainly closed
        let now_hour = chrono::Timelike::hour(&crate::utils::current_timestamp());
        let closed_now = OpenHours {
            open_hour: (now_hour + 2) % 24,
            close_hour: (now_hour + 3) % 24,
            tz_offset_secs: 0,
            always_open: false,
        };
        let engine = Matchmaker::new(
            store.clone(),
            queue,
            closed_now,
            MatchmakerSettings::default(),
            metrics,
        );

        // A fresh invitation is refused...
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();
        engine
            .respond_topic(2, "books", TopicSource::Proposed)
            .await
            .unwrap();
        assert_eq!(store.facet(2).unwrap(), Facet::InLobby { room: 0 });

        // ...but claiming an existing invitation still works
        store.post_invitation(1, "movies").unwrap();
        engine
            .respond_topic(2, "movies", TopicSource::Accepted)
            .await
            .unwrap();
        assert_eq!(store.facet(2).unwrap(), Facet::Chatting { partner: 1 });
    }
}
