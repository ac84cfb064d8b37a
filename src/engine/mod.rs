//! Matchmaking engine
//!
//! The per-user session state machine and the topic-matching algorithm.
//! The engine reads and mutates the session store, decides each transition,
//! and hands the resulting notifications to the dispatch queue. It also
//! implements the failure-feedback bridge: a permanent delivery failure
//! tears the affected user's relations down as if they had left.

pub mod commands;
pub mod matching;
pub mod replies;

use crate::dispatch::{DispatchQueue, PermanentFailureHandler};
use crate::error::{ConfabError, Result};
use crate::hours::OpenHours;
use crate::metrics::MetricsCollector;
use crate::store::{SessionStore, StoreError};
use crate::types::{Facet, InboundMessage, OutboundAction, OutboundPayload, RoomId, UserId};
use crate::utils::{current_timestamp, daily_pseudonym, day_seed};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Commands accepted at the process boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Join, or re-display the lobby summary
    Start,
    /// Propose a topic; without an argument, prompt for one
    New { topic: Option<String> },
    /// Show the caller's daily pseudonym
    Nick,
    /// List posted topics
    List,
    /// End the current chat or withdraw the current invitation
    Leave,
    /// Leave the lobby entirely
    Disconnect,
    /// Admin-only announcement to every connected user
    Broadcast { text: String },
    /// Anything else starting with a slash
    Unknown { raw: String },
}

impl Command {
    /// Parse a line of the form `/name args`. Returns `None` for lines
    /// that are not commands at all.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        let command = match name {
            "start" => Command::Start,
            "new" => Command::New {
                topic: (!args.is_empty()).then(|| args.to_string()),
            },
            "nick" => Command::Nick,
            "list" => Command::List,
            "leave" => Command::Leave,
            "disconnect" => Command::Disconnect,
            "wall" => Command::Broadcast {
                text: args.to_string(),
            },
            _ => Command::Unknown {
                raw: line.to_string(),
            },
        };
        Some(command)
    }
}

/// Engine settings that are configuration, not code
#[derive(Debug, Clone)]
pub struct MatchmakerSettings {
    /// The single shared lobby room
    pub default_room: RoomId,
    /// Maximum topics shown by a listing
    pub topic_list_cap: usize,
    /// Secret feeding the daily pseudonym hash
    pub pseudonym_secret: String,
    /// Debug mode changes the privacy note on match and relaxes gates
    pub debug_mode: bool,
}

impl Default for MatchmakerSettings {
    fn default() -> Self {
        Self {
            default_room: 0,
            topic_list_cap: 10,
            pseudonym_secret: "confab-dev-secret".to_string(),
            debug_mode: false,
        }
    }
}

/// The matchmaking engine. One instance per process, shared behind `Arc`.
pub struct Matchmaker {
    store: Arc<dyn SessionStore>,
    queue: DispatchQueue,
    hours: OpenHours,
    settings: MatchmakerSettings,
    metrics: Arc<MetricsCollector>,
}

impl Matchmaker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        queue: DispatchQueue,
        hours: OpenHours,
        settings: MatchmakerSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            hours,
            settings,
            metrics,
        })
    }

    /// Wire this engine in as the queue's failure-feedback bridge
    pub fn register_bridge(self: &Arc<Self>) {
        let handler_dyn: Arc<dyn PermanentFailureHandler> = self.clone();
        let weak = Arc::downgrade(&handler_dyn);
        self.queue.set_failure_handler(weak);
    }

    // ---- public boundary -------------------------------------------------

    /// Handle a slash command. Errors are recovered here: one generic
    /// failure notice per command, never a partial mix of replies.
    pub async fn handle_command(&self, user: UserId, command: Command) {
        if self.rejected_by_ban_list(user).await {
            return;
        }
        let result = match command {
            Command::Start => self.handle_start(user).await,
            Command::New { topic } => self.handle_new(user, topic).await,
            Command::Nick => self.handle_nick(user).await,
            Command::List => self.handle_list(user).await,
            Command::Leave => self.handle_leave(user).await,
            Command::Disconnect => self.handle_disconnect(user).await,
            Command::Broadcast { text } => self.handle_broadcast(user, &text).await,
            Command::Unknown { .. } => self.handle_unknown(user).await,
        };
        self.recover(user, result);
    }

    /// Handle non-command content: a topic line while one is being typed,
    /// relay while chatting, lobby chatter otherwise.
    pub async fn handle_free_text(&self, user: UserId, msg: InboundMessage) {
        if self.rejected_by_ban_list(user).await {
            return;
        }
        let result = self.handle_content(user, msg).await;
        self.recover(user, result);
    }

    /// Handle a tap on a discovery control; functionally identical to
    /// proposing the control's literal topic.
    pub async fn handle_discovery_click(&self, user: UserId, token: &str) {
        if self.rejected_by_ban_list(user).await {
            return;
        }
        let result = self.handle_click(user, token).await;
        self.recover(user, result);
    }

    /// Edited messages are rejected by design: no history is retained,
    /// so edits cannot be tracked.
    pub async fn handle_edited_message(&self, user: UserId) {
        if self.rejected_by_ban_list(user).await {
            return;
        }
        self.quick_reply(user, replies::edit_unsupported());
    }

    // ---- shared helpers --------------------------------------------------

    /// Ban-listed users are turned away before any state transition
    async fn rejected_by_ban_list(&self, user: UserId) -> bool {
        match self.store.is_banned(user) {
            Ok(true) => {
                self.quick_reply(user, replies::banned());
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!("Ban-list check failed for user {user}: {e}");
                self.quick_reply(user, replies::delivery_failure());
                true
            }
        }
    }

    /// Top-of-handler error recovery: log under the service taxonomy,
    /// then one generic notice. The command's remaining steps were
    /// abandoned by `?`, never half-applied.
    fn recover(&self, user: UserId, result: Result<()>) {
        if let Err(e) = result {
            let err = match e.downcast::<StoreError>() {
                Ok(store_err) => ConfabError::from(store_err),
                Err(other) => ConfabError::InternalError {
                    message: format!("{other:#}"),
                },
            };
            error!("Handling failed for user {user}: {err}");
            self.quick_reply(user, replies::delivery_failure());
        }
    }

    /// One high-priority text reply to one user
    pub(crate) fn quick_reply(&self, user: UserId, text: String) {
        self.queue.enqueue(
            crate::types::Priority::High,
            vec![OutboundAction::new(user, OutboundPayload::text(text))],
            None,
        );
    }

    pub(crate) fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub(crate) fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub(crate) fn settings(&self) -> &MatchmakerSettings {
        &self.settings
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The caller's pseudonym for today
    pub(crate) fn pseudonym(&self, user: UserId) -> String {
        let seed = day_seed(current_timestamp(), self.hours.tz_offset_secs);
        daily_pseudonym(&self.settings.pseudonym_secret, user, seed)
    }

    /// Whether new joins/invitations are currently admitted
    pub(crate) fn admission_open(&self) -> bool {
        self.settings.debug_mode || self.hours.is_open(current_timestamp())
    }

    /// Normalize a transient topic prompt away before another command runs
    pub(crate) fn normalize_typing(&self, user: UserId, facet: &Facet) -> Result<Facet> {
        if matches!(facet, Facet::TypingTopic) {
            self.store
                .cancel_invitation(user, self.settings.default_room)?;
            return Ok(Facet::InLobby {
                room: self.settings.default_room,
            });
        }
        Ok(facet.clone())
    }

    // ---- failure-feedback bridge ----------------------------------------

    /// Idempotently tear down everything the user is part of. Safe to run
    /// concurrently with a normal transition for the same user; the store's
    /// atomic operations keep links two-sided throughout.
    pub(crate) async fn teardown(&self, user: UserId) -> Result<()> {
        if let Some(partner) = self.store.remove_chat_link(user)? {
            self.store.set_facet(
                partner,
                Facet::InLobby {
                    room: self.settings.default_room,
                },
            )?;
            self.quick_reply(partner, replies::partner_left());
        }
        self.store
            .cancel_invitation(user, self.settings.default_room)?;
        self.store.set_facet(user, Facet::Idle)?;
        Ok(())
    }
}

#[async_trait]
impl PermanentFailureHandler for Matchmaker {
    async fn on_permanent_failure(&self, user: UserId) {
        info!("User {user} is permanently unreachable; tearing down their session");
        self.metrics.session().teardowns_total.inc();
        if let Err(e) = self.teardown(user).await {
            error!("Teardown for user {user} failed: {e:#}");
        }
    }
}
