use std::fmt;

use spawnwatch_contracts::interaction::InteractionKind;
use spawnwatch_contracts::notification::NotificationCard;
use spawnwatch_contracts::{MessageRef, SubscriberId};

/// Bot activity shown next to its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Watching(String),
    Playing(String),
}

impl Presence {
    pub fn activity(&self) -> &'static str {
        match self {
            Self::Watching(_) => "watching",
            Self::Playing(_) => "playing",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Watching(text) | Self::Playing(text) => text,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watching(text) => write!(f, "Watching {text}"),
            Self::Playing(text) => write!(f, "Playing {text}"),
        }
    }
}

/// Outbound side of the chat platform.
///
/// Implementations must be usable from the event loop and the presence loop
/// at the same time.
pub trait ChatGateway: Send + Sync {
    /// Sends `card` to `recipient` as a direct message with one control
    /// attached.
    fn send_direct(
        &self,
        recipient: SubscriberId,
        card: &NotificationCard,
        control: &InteractionKind,
    ) -> anyhow::Result<MessageRef>;

    /// Replaces the card on an existing message, keeping its controls.
    fn edit_message(&self, message: MessageRef, card: &NotificationCard) -> anyhow::Result<()>;

    /// Marks an interaction as received before slow work starts.
    fn acknowledge(&self, interaction_id: u64) -> anyhow::Result<()>;

    /// Reply visible only to the user who triggered the interaction.
    fn reply_ephemeral(&self, interaction_id: u64, text: &str) -> anyhow::Result<()>;

    fn set_presence(&self, presence: &Presence) -> anyhow::Result<()>;

    /// Number of servers the bot is currently in.
    fn server_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_renders_activity_and_text() {
        let watching = Presence::Watching("for shinies!".to_string());
        assert_eq!(watching.to_string(), "Watching for shinies!");
        assert_eq!(watching.activity(), "watching");

        let playing = Presence::Playing("with 3 servers".to_string());
        assert_eq!(playing.to_string(), "Playing with 3 servers");
        assert_eq!(playing.text(), "with 3 servers");
    }
}
