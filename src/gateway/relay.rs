//! Pass-through content relay
//!
//! Translates a generic inbound payload into the outbound actions for one
//! recipient. Forwarded content is re-forwarded verbatim; media that cannot
//! carry a caption gets the pseudonym label as a separate line; unsupported
//! kinds degrade to a placeholder notice rather than being dropped.

use crate::types::{
    ContentPayload, InboundMessage, OutboundAction, OutboundPayload, UserId,
};

/// Placeholder body shown when a payload has no relay mapping
pub const UNSUPPORTED_NOTICE: &str = "[unsupported message]";

/// Render the label line for a lobby pseudonym
fn label(nick: &str) -> String {
    format!("[{nick}]")
}

/// Prefix a body with the pseudonym label, if one applies
fn labelled(nick: Option<&str>, body: &str) -> String {
    match nick {
        Some(nick) => format!("[{nick}] {body}"),
        None => body.to_string(),
    }
}

/// Build the outbound actions that deliver `msg` from `origin` to
/// `recipient`. `nick` labels lobby traffic; one-on-one relay passes
/// `None` and stays anonymous by construction. `quiet` suppresses the
/// recipient's notification (used for lobby fan-out).
pub fn forward_actions(
    recipient: UserId,
    origin: UserId,
    nick: Option<&str>,
    msg: &InboundMessage,
    quiet: bool,
) -> Vec<OutboundAction> {
    let mut actions = Vec::with_capacity(2);

    if msg.forwarded {
        // Forward markers are preserved by re-forwarding the original
        // message; the label rides ahead as its own line.
        if let Some(nick) = nick {
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Text {
                    body: label(nick),
                    quiet,
                },
            ));
        }
        actions.push(OutboundAction::new(
            recipient,
            OutboundPayload::Forward {
                origin,
                message_id: msg.message_id,
                quiet,
            },
        ));
        return actions;
    }

    match &msg.payload {
        ContentPayload::Text { body } => {
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Text {
                    body: labelled(nick, body),
                    quiet,
                },
            ));
        }
        ContentPayload::Media {
            kind,
            file_id,
            caption,
        } => {
            let caption = if kind.carries_caption() {
                match (nick, caption) {
                    (Some(nick), Some(c)) => Some(labelled(Some(nick), c)),
                    (Some(nick), None) => Some(label(nick)),
                    (None, c) => c.clone(),
                }
            } else {
                if let Some(nick) = nick {
                    actions.push(OutboundAction::new(
                        recipient,
                        OutboundPayload::Text {
                            body: label(nick),
                            quiet,
                        },
                    ));
                }
                caption.clone()
            };
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Media {
                    kind: *kind,
                    file_id: file_id.clone(),
                    caption,
                    quiet,
                },
            ));
        }
        ContentPayload::Contact {
            phone,
            first_name,
            last_name,
        } => {
            if let Some(nick) = nick {
                actions.push(OutboundAction::new(
                    recipient,
                    OutboundPayload::Text {
                        body: label(nick),
                        quiet,
                    },
                ));
            }
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Contact {
                    phone: phone.clone(),
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    quiet,
                },
            ));
        }
        ContentPayload::Location {
            latitude,
            longitude,
        } => {
            if let Some(nick) = nick {
                actions.push(OutboundAction::new(
                    recipient,
                    OutboundPayload::Text {
                        body: label(nick),
                        quiet,
                    },
                ));
            }
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Location {
                    latitude: *latitude,
                    longitude: *longitude,
                    quiet,
                },
            ));
        }
        ContentPayload::Venue {
            title,
            address,
            latitude,
            longitude,
        } => {
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Venue {
                    title: labelled(nick, title),
                    address: address.clone(),
                    latitude: *latitude,
                    longitude: *longitude,
                    quiet,
                },
            ));
        }
        ContentPayload::Unsupported { .. } => {
            actions.push(OutboundAction::new(
                recipient,
                OutboundPayload::Text {
                    body: labelled(nick, UNSUPPORTED_NOTICE),
                    quiet,
                },
            ));
        }
    }

    actions
}
