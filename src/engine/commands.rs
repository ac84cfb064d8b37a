//! Command and content handlers
//!
//! One method per user-visible operation. Every handler reads the caller's
//! facet once, normalizes a stale topic prompt away, and then applies the
//! transition rules. Store errors propagate up and are recovered at the
//! public boundary with a single failure notice.

use crate::engine::matching::TopicSource;
use crate::engine::{replies, Matchmaker};
use crate::error::Result;
use crate::gateway::relay;
use crate::types::{
    ContentPayload, Facet, InboundMessage, OutboundAction, OutboundPayload, Priority, UserId,
};
use tracing::{debug, info};

impl Matchmaker {
    /// `/start` — join the lobby, or re-display the summary
    pub(crate) async fn handle_start(&self, user: UserId) -> Result<()> {
        let facet = self.store().facet(user)?;
        let facet = self.normalize_typing(user, &facet)?;

        match facet {
            Facet::Chatting { .. } => {
                self.quick_reply(user, replies::busy_in_chat());
                Ok(())
            }
            Facet::InLobby { .. } | Facet::InvitationPosted { .. } => {
                self.send_lobby_summary(user).await
            }
            Facet::Idle => {
                if !self.admission_open() {
                    self.quick_reply(user, replies::closed());
                    return Ok(());
                }
                self.store().set_facet(
                    user,
                    Facet::InLobby {
                        room: self.settings().default_room,
                    },
                )?;
                self.metrics().session().lobby_joins_total.inc();
                info!("User {user} joined the lobby");
                self.send_lobby_summary(user).await
            }
            Facet::TypingTopic => unreachable!("normalized above"),
        }
    }

    /// Welcome text, the open-hours notice when applicable, and the
    /// current topic menu
    async fn send_lobby_summary(&self, user: UserId) -> Result<()> {
        let counts = self.store().active_counts()?;
        let nick = self.pseudonym(user);
        self.quick_reply(user, replies::welcome(counts, &nick));
        if !self.admission_open() {
            self.quick_reply(user, replies::closed());
            return Ok(());
        }
        self.send_topic_menu(user, replies::topic_list_short())
            .await?;
        Ok(())
    }

    /// Send up to the configured cap of posted topics as a tappable menu.
    /// Returns how many topics were shown.
    pub(crate) async fn send_topic_menu(&self, user: UserId, caption: String) -> Result<usize> {
        let mut topics = self.store().list_posted_topics()?;
        topics.truncate(self.settings().topic_list_cap);
        let count = topics.len();
        if count == 0 {
            return Ok(0);
        }
        self.queue().enqueue(
            Priority::High,
            vec![OutboundAction::new(
                user,
                OutboundPayload::TopicMenu {
                    body: caption,
                    topics,
                },
            )],
            None,
        );
        Ok(count)
    }

    /// `/new [topic]` — propose a topic, or prompt for one
    pub(crate) async fn handle_new(&self, user: UserId, topic: Option<String>) -> Result<()> {
        let facet = self.store().facet(user)?;
        let facet = self.normalize_typing(user, &facet)?;

        match facet {
            Facet::Chatting { .. } => {
                self.quick_reply(user, replies::busy_in_chat());
                Ok(())
            }
            Facet::Idle => {
                self.quick_reply(user, replies::not_connected());
                Ok(())
            }
            Facet::InLobby { .. } | Facet::InvitationPosted { .. } => match topic {
                Some(topic) => {
                    self.respond_topic(user, &topic, TopicSource::Proposed)
                        .await
                }
                None => {
                    if !self.admission_open() {
                        self.quick_reply(user, replies::closed());
                        return Ok(());
                    }
                    self.store().set_facet(user, Facet::TypingTopic)?;
                    self.quick_reply(user, replies::prompt_topic());
                    Ok(())
                }
            },
            Facet::TypingTopic => unreachable!("normalized above"),
        }
    }

    /// `/nick` — show the caller's pseudonym for today
    pub(crate) async fn handle_nick(&self, user: UserId) -> Result<()> {
        let facet = self.store().facet(user)?;
        if !facet.is_connected() {
            self.quick_reply(user, replies::not_connected());
            return Ok(());
        }
        let nick = self.pseudonym(user);
        self.quick_reply(user, replies::pseudonym_info(&nick));
        Ok(())
    }

    /// `/list` — show posted topics
    pub(crate) async fn handle_list(&self, user: UserId) -> Result<()> {
        let facet = self.store().facet(user)?;
        let facet = self.normalize_typing(user, &facet)?;

        if !facet.is_connected() {
            self.quick_reply(user, replies::not_connected());
            return Ok(());
        }
        let counts = self.store().active_counts()?;
        let shown = self
            .send_topic_menu(user, replies::topic_list_caption(counts))
            .await?;
        if shown == 0 {
            self.quick_reply(user, replies::no_topics(counts));
        }
        Ok(())
    }

    /// `/leave` — end the chat or withdraw the invitation
    pub(crate) async fn handle_leave(&self, user: UserId) -> Result<()> {
        match self.store().facet(user)? {
            Facet::TypingTopic | Facet::InvitationPosted { .. } => {
                self.store()
                    .cancel_invitation(user, self.settings().default_room)?;
                self.quick_reply(user, replies::invitation_withdrawn());
                Ok(())
            }
            Facet::Chatting { .. } => {
                let partner = self.store().remove_chat_link(user)?;
                self.store().set_facet(
                    user,
                    Facet::InLobby {
                        room: self.settings().default_room,
                    },
                )?;
                let counts = self.store().active_counts()?;
                self.quick_reply(user, replies::chat_ended(counts));
                self.send_topic_menu(user, replies::topic_list_short())
                    .await?;
                if let Some(partner) = partner {
                    info!("User {user} left their chat with {partner}");
                    self.quick_reply(partner, replies::partner_left());
                }
                Ok(())
            }
            Facet::InLobby { .. } => {
                self.quick_reply(user, replies::leave_noop());
                Ok(())
            }
            Facet::Idle => {
                self.quick_reply(user, replies::not_connected());
                Ok(())
            }
        }
    }

    /// `/disconnect` — leave the lobby entirely. Invalid while chatting.
    pub(crate) async fn handle_disconnect(&self, user: UserId) -> Result<()> {
        let facet = self.store().facet(user)?;
        let facet = self.normalize_typing(user, &facet)?;

        match facet {
            Facet::Chatting { .. } => {
                self.quick_reply(user, replies::busy_in_chat());
                Ok(())
            }
            Facet::InvitationPosted { .. } => {
                self.store()
                    .cancel_invitation(user, self.settings().default_room)?;
                self.store().set_facet(user, Facet::Idle)?;
                self.quick_reply(user, replies::disconnect_farewell());
                Ok(())
            }
            Facet::InLobby { .. } => {
                self.store().set_facet(user, Facet::Idle)?;
                info!("User {user} disconnected");
                self.quick_reply(user, replies::disconnect_farewell());
                Ok(())
            }
            Facet::Idle => {
                self.quick_reply(user, replies::not_connected());
                Ok(())
            }
            Facet::TypingTopic => unreachable!("normalized above"),
        }
    }

    /// `/wall text` — admin announcement to every connected user. The
    /// announcement batch rides the lowest tier; the result report goes
    /// back to the admin at high priority once every send has completed.
    pub(crate) async fn handle_broadcast(&self, user: UserId, text: &str) -> Result<()> {
        if !self.store().is_admin(user)? {
            return self.handle_unknown(user).await;
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let recipients = self.store().list_known_users()?;
        let body = replies::announcement(text);
        let actions: Vec<OutboundAction> = recipients
            .iter()
            .map(|r| OutboundAction::new(*r, OutboundPayload::text(body.clone())))
            .collect();

        info!(
            "Admin {user} announcing to {} connected users",
            actions.len()
        );
        self.metrics().session().broadcasts_total.inc();

        let queue = self.queue().clone();
        self.queue().enqueue(
            Priority::Low,
            actions,
            Some(Box::new(move |result| {
                let (ok, failed) = (result.success_count(), result.failure_count());
                info!("Announcement complete: {ok} delivered, {failed} failed");
                queue.enqueue(
                    Priority::High,
                    vec![OutboundAction::new(
                        user,
                        OutboundPayload::quiet_text(replies::broadcast_report(ok, failed)),
                    )],
                    None,
                );
            })),
        );
        Ok(())
    }

    /// An unrecognized command
    pub(crate) async fn handle_unknown(&self, user: UserId) -> Result<()> {
        let facet = self.store().facet(user)?;
        self.quick_reply(user, replies::invalid_command(facet.is_connected()));
        Ok(())
    }

    /// Non-command content: topic line, private relay, or lobby chatter
    pub(crate) async fn handle_content(&self, user: UserId, msg: InboundMessage) -> Result<()> {
        if let ContentPayload::Unsupported { kind } = &msg.payload {
            debug!(
                "{}",
                crate::error::ConfabError::UnsupportedContent { kind: kind.clone() }
            );
        }
        match self.store().facet(user)? {
            Facet::TypingTopic => {
                let topic = match &msg.payload {
                    ContentPayload::Text { body } => body.trim().to_string(),
                    _ => String::new(),
                };
                if topic.is_empty() {
                    self.quick_reply(user, replies::prompt_topic());
                    return Ok(());
                }
                self.store()
                    .cancel_invitation(user, self.settings().default_room)?;
                self.respond_topic(user, &topic, TopicSource::Proposed)
                    .await
            }
            Facet::Chatting { partner } => self.relay_private(user, partner, msg).await,
            // Waiting users still chat in the lobby
            Facet::InLobby { .. } | Facet::InvitationPosted { .. } => {
                self.relay_lobby(user, msg).await
            }
            Facet::Idle => {
                self.quick_reply(user, replies::not_connected());
                Ok(())
            }
        }
    }

    /// Forward content to the chat partner, anonymously
    async fn relay_private(
        &self,
        user: UserId,
        partner: UserId,
        msg: InboundMessage,
    ) -> Result<()> {
        // A one-sided link means the partner is already gone; normalize
        // rather than deliver into the void.
        if self.store().facet(partner)?.partner() != Some(user) {
            self.store().remove_chat_link(user)?;
            self.quick_reply(user, replies::partner_already_left());
            return Ok(());
        }

        if msg.reply_to.is_some() && !msg.forwarded {
            self.quick_reply(user, replies::reply_unsupported());
        }

        let actions = relay::forward_actions(partner, user, None, &msg, false);
        let queue = self.queue().clone();
        self.queue().enqueue(
            Priority::Normal,
            actions,
            Some(Box::new(move |result| {
                if result.first_failure().is_some() {
                    queue.enqueue(
                        Priority::High,
                        vec![OutboundAction::new(
                            user,
                            OutboundPayload::text(replies::delivery_failure()),
                        )],
                        None,
                    );
                }
            })),
        );
        Ok(())
    }

    /// Forward content to every other lobby member, labeled with the
    /// sender's daily pseudonym and without notification sounds
    async fn relay_lobby(&self, user: UserId, msg: InboundMessage) -> Result<()> {
        if !self.admission_open() {
            self.quick_reply(user, replies::closed());
            return Ok(());
        }

        if msg.reply_to.is_some() && !msg.forwarded {
            self.quick_reply(user, replies::reply_unsupported());
        }

        let members = self.store().list_unmatched_users()?;
        let nick = self.pseudonym(user);
        let actions: Vec<OutboundAction> = members
            .iter()
            .filter(|m| **m != user)
            .flat_map(|m| relay::forward_actions(*m, user, Some(&nick), &msg, true))
            .collect();

        self.queue().enqueue(
            Priority::Low,
            actions,
            Some(Box::new(move |result| {
                info!(
                    "Lobby relay complete: {} delivered, {} failed",
                    result.success_count(),
                    result.failure_count()
                );
            })),
        );
        Ok(())
    }

    /// A tap on a discovery control. Equivalent to proposing the control's
    /// literal topic, after normalizing any stale state away.
    pub(crate) async fn handle_click(&self, user: UserId, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(());
        }

        match self.store().facet(user)? {
            Facet::TypingTopic => {
                self.store()
                    .cancel_invitation(user, self.settings().default_room)?;
            }
            Facet::Chatting { partner } => {
                if self.store().facet(partner)?.partner() == Some(user) {
                    self.quick_reply(user, replies::busy_in_chat());
                    return Ok(());
                }
                // Stale one-sided link; clear it and fall through
                self.store().remove_chat_link(user)?;
                self.store().set_facet(
                    user,
                    Facet::InLobby {
                        room: self.settings().default_room,
                    },
                )?;
            }
            _ => {}
        }

        self.respond_topic(user, token, TopicSource::Accepted).await
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::{build_engine, wait_until};
    use crate::engine::{replies, Command};
    use crate::store::{MemoryStore, SessionStore};
    use crate::types::{Facet, InboundMessage, OutboundPayload};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_joins_lobby_and_welcomes() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());

        engine.handle_command(1, Command::Start).await;

        assert_eq!(store.facet(1).unwrap(), Facet::InLobby { room: 0 });
        wait_until(|| messenger.sent_count() >= 1).await;
        let bodies = messenger.bodies_for(1);
        assert!(bodies[0].contains("Welcome to Confab"));
    }

    #[tokio::test]
    async fn test_start_while_chatting_is_rejected_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.create_chat_link(1, 2).unwrap();

        engine.handle_command(1, Command::Start).await;

        assert_eq!(store.facet(1).unwrap(), Facet::Chatting { partner: 2 });
        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(messenger.bodies_for(1), vec![replies::busy_in_chat()]);
    }

    #[tokio::test]
    async fn test_bare_new_prompts_for_topic() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();

        engine
            .handle_command(1, Command::New { topic: None })
            .await;

        assert_eq!(store.facet(1).unwrap(), Facet::TypingTopic);
        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(messenger.bodies_for(1), vec![replies::prompt_topic()]);
    }

    #[tokio::test]
    async fn test_typed_topic_line_becomes_invitation() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::TypingTopic).unwrap();

        engine
            .handle_free_text(1, InboundMessage::text(1, "late night movies"))
            .await;

        assert_eq!(
            store.facet(1).unwrap(),
            Facet::InvitationPosted {
                topic: "late night movies".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_whitespace_topic_line_reprompts() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::TypingTopic).unwrap();

        engine
            .handle_free_text(1, InboundMessage::text(1, "   "))
            .await;

        assert_eq!(store.facet(1).unwrap(), Facet::TypingTopic);
        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(messenger.bodies_for(1), vec![replies::prompt_topic()]);
    }

    #[tokio::test]
    async fn test_disconnect_while_chatting_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.create_chat_link(1, 2).unwrap();

        engine.handle_command(1, Command::Disconnect).await;

        assert_eq!(store.facet(1).unwrap(), Facet::Chatting { partner: 2 });
        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(messenger.bodies_for(1), vec![replies::busy_in_chat()]);
    }

    #[tokio::test]
    async fn test_disconnect_from_lobby_goes_idle() {
        let store = Arc::new(MemoryStore::new());
        let (engine, _messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();

        engine.handle_command(1, Command::Disconnect).await;

        assert_eq!(store.facet(1).unwrap(), Facet::Idle);
    }

    #[tokio::test]
    async fn test_leave_ends_chat_and_notifies_partner() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.create_chat_link(1, 2).unwrap();

        engine.handle_command(1, Command::Leave).await;

        assert_eq!(store.facet(1).unwrap(), Facet::InLobby { room: 0 });
        assert_eq!(store.facet(2).unwrap(), Facet::Idle);
        wait_until(|| !messenger.bodies_for(2).is_empty()).await;
        assert_eq!(messenger.bodies_for(2), vec![replies::partner_left()]);
    }

    #[tokio::test]
    async fn test_leave_withdraws_invitation() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.post_invitation(1, "movies").unwrap();

        engine.handle_command(1, Command::Leave).await;

        assert_eq!(store.facet(1).unwrap(), Facet::InLobby { room: 0 });
        assert!(store.list_posted_topics().unwrap().is_empty());
        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(
            messenger.bodies_for(1),
            vec![replies::invitation_withdrawn()]
        );
    }

    #[tokio::test]
    async fn test_private_relay_forwards_to_partner_only() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.create_chat_link(1, 2).unwrap();
        store.set_facet(3, Facet::InLobby { room: 0 }).unwrap();

        engine
            .handle_free_text(1, InboundMessage::text(1, "hey there"))
            .await;

        wait_until(|| !messenger.bodies_for(2).is_empty()).await;
        // Anonymous by construction: no pseudonym prefix
        assert_eq!(messenger.bodies_for(2), vec!["hey there".to_string()]);
        assert!(messenger.bodies_for(3).is_empty());
    }

    #[tokio::test]
    async fn test_lobby_relay_labels_with_pseudonym_and_excludes_sender() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();
        store.set_facet(2, Facet::InLobby { room: 0 }).unwrap();
        store.set_facet(3, Facet::InLobby { room: 0 }).unwrap();

        engine
            .handle_free_text(1, InboundMessage::text(1, "anyone here?"))
            .await;

        wait_until(|| !messenger.bodies_for(2).is_empty() && !messenger.bodies_for(3).is_empty())
            .await;
        for user in [2, 3] {
            let bodies = messenger.bodies_for(user);
            assert!(bodies[0].starts_with('['), "missing label: {bodies:?}");
            assert!(bodies[0].ends_with("anyone here?"));
        }
        assert!(messenger.bodies_for(1).is_empty());
    }

    #[tokio::test]
    async fn test_directed_reply_degrades_with_notice() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.create_chat_link(1, 2).unwrap();

        let mut msg = InboundMessage::text(5, "re: earlier");
        msg.reply_to = Some(3);
        engine.handle_free_text(1, msg).await;

        wait_until(|| !messenger.bodies_for(1).is_empty() && !messenger.bodies_for(2).is_empty())
            .await;
        // Sender gets the explanation, partner still gets the content
        assert_eq!(messenger.bodies_for(1), vec![replies::reply_unsupported()]);
        assert_eq!(messenger.bodies_for(2), vec!["re: earlier".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_one_sided_link_degrades_gracefully() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        // Manufacture a one-sided link through the raw facet primitive
        store.set_facet(1, Facet::Chatting { partner: 2 }).unwrap();

        engine
            .handle_free_text(1, InboundMessage::text(1, "hello?"))
            .await;

        wait_until(|| !messenger.bodies_for(1).is_empty()).await;
        assert_eq!(
            messenger.bodies_for(1),
            vec![replies::partner_already_left()]
        );
        assert!(messenger.bodies_for(2).is_empty());
    }

    #[tokio::test]
    async fn test_wall_requires_admin() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();

        engine
            .handle_command(
                1,
                Command::Broadcast {
                    text: "hello all".to_string(),
                },
            )
            .await;

        wait_until(|| messenger.sent_count() >= 1).await;
        assert_eq!(messenger.bodies_for(1), vec![replies::invalid_command(true)]);
    }

    #[tokio::test]
    async fn test_wall_reaches_everyone_and_reports_back() {
        let store = Arc::new(MemoryStore::with_access_lists(vec![9], vec![]));
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();
        store.create_chat_link(2, 3).unwrap();

        engine
            .handle_command(
                9,
                Command::Broadcast {
                    text: "maintenance at noon".to_string(),
                },
            )
            .await;

        // All three connected users hear it, then the admin gets the tally
        wait_until(|| !messenger.bodies_for(9).is_empty()).await;
        for user in [1, 2, 3] {
            let bodies = messenger.bodies_for(user);
            assert!(
                bodies.iter().any(|b| b.contains("maintenance at noon")),
                "user {user} missed the announcement: {bodies:?}"
            );
        }
        assert_eq!(
            messenger.bodies_for(9),
            vec![replies::broadcast_report(3, 0)]
        );
    }

    #[tokio::test]
    async fn test_nick_reports_daily_pseudonym() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(1, Facet::InLobby { room: 0 }).unwrap();

        engine.handle_command(1, Command::Nick).await;

        wait_until(|| messenger.sent_count() >= 1).await;
        let bodies = messenger.bodies_for(1);
        assert!(bodies[0].contains("Your lobby ID for today"));
    }

    #[tokio::test]
    async fn test_list_caps_topics_at_configured_maximum() {
        let store = Arc::new(MemoryStore::new());
        let (engine, messenger) = build_engine(store.clone());
        store.set_facet(99, Facet::InLobby { room: 0 }).unwrap();
        for i in 0..15 {
            store.post_invitation(i, &format!("topic-{i}")).unwrap();
        }

        engine.handle_command(99, Command::List).await;

        wait_until(|| messenger.sent_count() >= 1).await;
        let menu_sizes: Vec<usize> = messenger
            .sent()
            .into_iter()
            .filter_map(|(_, p)| match p {
                OutboundPayload::TopicMenu { topics, .. } => Some(topics.len()),
                _ => None,
            })
            .collect();
        assert_eq!(menu_sizes, vec![10]);
    }
}
