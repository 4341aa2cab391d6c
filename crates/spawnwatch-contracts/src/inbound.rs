use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::ids::SubscriberId;
use crate::interaction::InteractionEvent;
use crate::spawn::{ChatMessage, Scope};

/// A text command typed by a user, e.g. `/sub_bulk 1 2 3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Used to address the ephemeral reply.
    #[serde(default)]
    pub interaction_id: u64,
    pub user_id: SubscriberId,
    /// Absent when the command was issued in a direct message.
    #[serde(default)]
    pub scope: Option<Scope>,
    pub text: String,
}

/// One line of the inbound event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(ChatMessage),
    Interaction(InteractionEvent),
    Command(CommandEvent),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Interaction(_) => "interaction",
            Self::Command(_) => "command",
        }
    }
}

/// Parses one JSONL line. Blank lines yield `None`.
pub fn parse_inbound_line(line: &str) -> anyhow::Result<Option<InboundEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let event = serde_json::from_str(trimmed).context("invalid inbound event")?;
    Ok(Some(event))
}
