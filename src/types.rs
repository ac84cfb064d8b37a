//! Common types used throughout the pairing chat service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable numeric identity of a user on the messaging platform
pub type UserId = i64;

/// Identifier of a shared lobby room
pub type RoomId = i32;

/// Correlation id for a dispatched batch
pub type BatchId = Uuid;

/// The single current session state of a user.
///
/// A user occupies exactly one facet at a time; the matchmaking engine is
/// responsible for moving users between facets, the store for keeping each
/// transition atomic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facet {
    /// No relation to the service
    Idle,
    /// Present in a shared lobby room
    InLobby { room: RoomId },
    /// Has been prompted to type a topic line (transient)
    TypingTopic,
    /// Has a discoverable topic posted, awaiting a responder
    InvitationPosted { topic: String },
    /// Paired one-on-one; links are symmetric
    Chatting { partner: UserId },
}

impl Facet {
    /// Partner id if the user is currently paired
    pub fn partner(&self) -> Option<UserId> {
        match self {
            Facet::Chatting { partner } => Some(*partner),
            _ => None,
        }
    }

    /// Whether the user counts as connected (anything but `Idle`)
    pub fn is_connected(&self) -> bool {
        !matches!(self, Facet::Idle)
    }

    /// Whether the user counts toward the lobby population
    /// (lobby, typing a topic, or waiting on a posted invitation)
    pub fn is_lobbyish(&self) -> bool {
        matches!(
            self,
            Facet::InLobby { .. } | Facet::TypingTopic | Facet::InvitationPosted { .. }
        )
    }
}

/// Delivery priority tier. Strict ordering: a lower tier is never serviced
/// while a higher tier holds an undispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// All tiers, highest first
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Tier index into the dispatch queue's internal lists
    pub fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a media attachment carried through the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Audio,
    Video,
    VideoNote,
    Voice,
    Sticker,
    Document,
}

impl MediaKind {
    /// Whether the platform renders a caption together with the media,
    /// so a pseudonym label can ride in the caption instead of a
    /// separate message.
    pub fn carries_caption(self) -> bool {
        matches!(
            self,
            MediaKind::Photo | MediaKind::Video | MediaKind::Voice | MediaKind::Document
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::VideoNote => "video_note",
            MediaKind::Voice => "voice",
            MediaKind::Sticker => "sticker",
            MediaKind::Document => "document",
        }
    }
}

/// Inbound content payload, forwarded verbatim between matched parties.
/// Per-content-type translation happens at the gateway seam; the engine
/// treats these as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPayload {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        file_id: String,
        caption: Option<String>,
    },
    Contact {
        phone: String,
        first_name: String,
        last_name: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Venue {
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
    },
    /// A content kind with no relay mapping (polls, games, ...)
    Unsupported {
        kind: String,
    },
}

/// An inbound message as seen by the engine boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id, used for verbatim re-forwards
    pub message_id: i64,
    pub payload: ContentPayload,
    /// Set when the message carries a "forwarded from" origin marker
    pub forwarded: bool,
    /// Set when the message is a directed reply to an earlier message.
    /// Directed replies cannot be relayed (no history is retained).
    pub reply_to: Option<i64>,
}

impl InboundMessage {
    /// Plain text message helper
    pub fn text(message_id: i64, body: impl Into<String>) -> Self {
        Self {
            message_id,
            payload: ContentPayload::Text { body: body.into() },
            forwarded: false,
            reply_to: None,
        }
    }
}

/// Outbound payload handed to the messaging-platform client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundPayload {
    Text {
        body: String,
        /// Suppress the recipient's notification (lobby chatter, discovery)
        quiet: bool,
    },
    /// Topic list with one tappable discovery control per topic
    TopicMenu {
        body: String,
        topics: Vec<String>,
    },
    /// Discovery notice with a single join control for one topic
    JoinPrompt {
        body: String,
        topic: String,
        quiet: bool,
    },
    /// Verbatim re-forward of an inbound message
    Forward {
        origin: UserId,
        message_id: i64,
        quiet: bool,
    },
    Media {
        kind: MediaKind,
        file_id: String,
        caption: Option<String>,
        quiet: bool,
    },
    Contact {
        phone: String,
        first_name: String,
        last_name: Option<String>,
        quiet: bool,
    },
    Location {
        latitude: f64,
        longitude: f64,
        quiet: bool,
    },
    Venue {
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
        quiet: bool,
    },
}

impl OutboundPayload {
    /// Loud text message helper
    pub fn text(body: impl Into<String>) -> Self {
        OutboundPayload::Text {
            body: body.into(),
            quiet: false,
        }
    }

    /// Quiet text message helper
    pub fn quiet_text(body: impl Into<String>) -> Self {
        OutboundPayload::Text {
            body: body.into(),
            quiet: true,
        }
    }
}

/// One queued delivery. The recipient rides alongside the payload so the
/// queue never has to recover it by introspecting the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAction {
    pub recipient: UserId,
    pub payload: OutboundPayload,
}

impl OutboundAction {
    pub fn new(recipient: UserId, payload: OutboundPayload) -> Self {
        Self { recipient, payload }
    }
}

/// Snapshot of connected-user counts for the lobby summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCounts {
    /// Users currently paired one-on-one
    pub chatting: usize,
    /// Users in the lobby, typing a topic, or waiting on an invitation
    pub in_lobby: usize,
}

impl ActiveCounts {
    pub fn total(&self) -> usize {
        self.chatting + self.in_lobby
    }
}
