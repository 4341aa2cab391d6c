use serde::{Deserialize, Serialize};

use crate::ids::{MessageRef, ScopeId};

/// Literal phrase fragments the upstream bot uses when a creature appears.
/// Matching is case-sensitive.
pub const SPAWN_PHRASES: &[&str] = &[
    "A wild pokémon has appeared!",
    "wild pokémon has appeared!",
    "fled. A new wild pokémon has appeared!",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
}

/// A chat message as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Absent for direct messages.
    #[serde(default)]
    pub scope: Option<Scope>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
}

impl ChatMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            channel: self.channel_id,
            message: self.message_id,
        }
    }

    /// True when any spawn phrase appears in the content or in the title or
    /// description of any embed.
    pub fn announces_spawn(&self) -> bool {
        let texts = std::iter::once(self.content.as_str()).chain(
            self.embeds.iter().flat_map(|embed| {
                embed
                    .title
                    .as_deref()
                    .into_iter()
                    .chain(embed.description.as_deref())
            }),
        );
        texts
            .into_iter()
            .any(|text| SPAWN_PHRASES.iter().any(|phrase| text.contains(phrase)))
    }

    /// First attachment, else the first embed carrying an image.
    pub fn spawn_image_url(&self) -> Option<&str> {
        if let Some(attachment) = self.attachments.first() {
            return Some(attachment.url.as_str());
        }
        self.embeds
            .iter()
            .filter_map(|embed| embed.image_url.as_deref())
            .find(|url| !url.trim().is_empty())
    }

    pub fn message_link(&self) -> Option<String> {
        let scope = self.scope.as_ref()?;
        Some(message_link(scope.id, self.channel_id, self.message_id))
    }
}

pub fn message_link(scope: ScopeId, channel_id: u64, message_id: u64) -> String {
    format!("https://discord.com/channels/{scope}/{channel_id}/{message_id}")
}

/// Where the spawn image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url.as_str()),
            Self::Bytes(_) => None,
        }
    }
}

/// A detected spawn, bound to exactly one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnEvent {
    pub scope: ScopeId,
    pub scope_name: String,
    pub message_link: String,
    pub image: ImageSource,
}
