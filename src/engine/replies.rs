//! User-facing reply texts
//!
//! All strings the engine sends back to users live here so handlers stay
//! readable and the voice stays consistent.

use crate::types::ActiveCounts;

pub fn banned() -> String {
    "You are not welcome here.".to_string()
}

pub fn welcome(counts: ActiveCounts, nick: &str) -> String {
    format!(
        "Welcome to Confab — find a stranger to talk the night away with.\n\
         \n\
         There are two modes: the shared lobby, and private one-on-one chats.\n\
         You are in the lobby now; your ID for today is [{nick}].\n\
         To start a private chat, send /new.\n\
         \n\
         {} people are connected, {} of them in the lobby.\n\
         Send /disconnect to leave entirely.\n\
         Please be kind, and stay within the law.",
        counts.total(),
        counts.in_lobby
    )
}

pub fn closed() -> String {
    "❌ The lobby is closed right now. Existing chats keep going; come back \
     during open hours to join or post a topic."
        .to_string()
}

pub fn busy_in_chat() -> String {
    "You are in a private chat.\nSend /leave first to return to the lobby.".to_string()
}

pub fn not_connected() -> String {
    "You are not connected yet.\nWhy not try /start?".to_string()
}

pub fn invalid_command(connected: bool) -> String {
    if connected {
        "That is not a command I know.\nWhy not try /start?".to_string()
    } else {
        "That is not a command I know.\nYou are not connected yet — try /start.".to_string()
    }
}

pub fn prompt_topic() -> String {
    "Now type a one-line topic and wait for someone to respond:".to_string()
}

pub fn topic_posted_wait(topic: &str) -> String {
    format!(
        "You posted: {topic}\n\
         \n\
         Wait for someone to respond,\n\
         or send /list to see what else is on offer."
    )
}

pub fn topic_joining_wait(topic: &str) -> String {
    format!(
        "Joining topic: {topic}\n\
         \n\
         Wait for someone to respond,\n\
         or send /list to see what else is on offer."
    )
}

pub fn topic_posted(topic: &str) -> String {
    format!("You posted: {topic}")
}

pub fn topic_joining(topic: &str) -> String {
    format!("Joining topic: {topic}")
}

pub fn topic_gone(topic: &str) -> String {
    format!("Too late — \"{topic}\" has already been taken.")
}

pub fn matched(topic: &str, debug_mode: bool) -> String {
    let privacy_note = if debug_mode {
        "Note: the service is running in debug mode and operators may see this \
         chat. Be kind, and do not share secrets."
    } else {
        "Note: nothing from here on is recorded and operators cannot read it. \
         Be kind anyway, and do not share secrets."
    };
    format!(
        "💕 You are connected — enjoy the conversation.\n\
         \n\
         Topic: {topic}\n\
         Send /leave to end this chat.\n\
         \n\
         {privacy_note}"
    )
}

pub fn pseudonym_info(nick: &str) -> String {
    format!(
        "Your lobby ID for today is [{nick}].\n\
         It rotates automatically in the small hours."
    )
}

pub fn topic_list_caption(counts: ActiveCounts) -> String {
    format!(
        "{} people are connected, {} of them in the lobby.\n\
         These are the open invitations —\n\
         tap one to start a private chat, or send /new to post your own.",
        counts.total(),
        counts.in_lobby
    )
}

pub fn topic_list_short() -> String {
    "These are the open invitations.\nTap one to start a private chat:".to_string()
}

pub fn no_topics(counts: ActiveCounts) -> String {
    format!(
        "{} people are connected, {} of them in the lobby.\n\
         No invitations are posted right now.\n\
         Why not /new one yourself?",
        counts.total(),
        counts.in_lobby
    )
}

pub fn invitation_withdrawn() -> String {
    "Your invitation has been withdrawn; you are back in the lobby.".to_string()
}

pub fn chat_ended(counts: ActiveCounts) -> String {
    format!(
        "This chat has ended and you are back in the lobby.\n\
         If you enjoyed it, tell a friend about Confab — more people, more fun.\n\
         \n\
         {} people are connected, {} of them in the lobby.",
        counts.total(),
        counts.in_lobby
    )
}

pub fn partner_left() -> String {
    "Your partner ended the chat.\nSend /leave to return to the lobby.".to_string()
}

pub fn partner_already_left() -> String {
    "Your partner already ended this chat; the message was not delivered.\n\
     Send /leave to return to the lobby."
        .to_string()
}

pub fn leave_noop() -> String {
    "You are already in the lobby — chat away.\n\
     To leave entirely, send /disconnect."
        .to_string()
}

pub fn disconnect_farewell() -> String {
    "You are disconnected now.\n\
     Confab will miss you — come back any time.\n\
     \n\
     Send /start to begin again."
        .to_string()
}

pub fn reply_unsupported() -> String {
    "No chat history is kept here, so earlier messages cannot be traced.\n\
     Because of that, directed replies cannot be delivered. Sorry."
        .to_string()
}

pub fn edit_unsupported() -> String {
    "No chat history is kept here, so message edits cannot be tracked.\n\
     Because of that, editing is not supported. Sorry."
        .to_string()
}

pub fn delivery_failure() -> String {
    "Something went wrong; the last message may not have been delivered.".to_string()
}

pub fn discovery_invitation(nick: &str, topic: &str) -> String {
    format!("New invitation\n\n[{nick}] {topic}")
}

pub fn match_broadcast(nick: &str, topic: &str) -> String {
    format!("Invitation matched\n\n[{nick}] {topic}")
}

pub fn announcement(text: &str) -> String {
    format!("Announcement\n\n{text}")
}

pub fn broadcast_report(success: usize, failure: usize) -> String {
    if failure == 0 {
        format!("✅ delivered: {success}")
    } else {
        format!("✅ delivered: {success}, ✖ failed: {failure}")
    }
}
