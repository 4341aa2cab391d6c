use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, MessageRef, SubscriberId};
use crate::notification::NotificationCard;

const WRONG_SPECIES_PREFIX: &str = "wrong_species";

/// Interactive controls the bot attaches to its messages.
///
/// The wire form is the control's custom id (`<kind>:<payload>`); it is
/// decoded once at the gateway boundary and dispatched with a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    WrongSpecies { correlation_id: CorrelationId },
}

impl InteractionKind {
    pub fn parse(custom_id: &str) -> Option<Self> {
        let (kind, payload) = custom_id.split_once(':')?;
        match kind {
            WRONG_SPECIES_PREFIX => payload
                .parse()
                .ok()
                .map(|correlation_id| Self::WrongSpecies { correlation_id }),
            _ => None,
        }
    }

    /// True when `custom_id` carries the wrong-species prefix, whether or
    /// not its payload is a readable correlation id.
    pub fn is_wrong_species(custom_id: &str) -> bool {
        custom_id
            .split_once(':')
            .is_some_and(|(kind, _)| kind == WRONG_SPECIES_PREFIX)
    }

    pub fn custom_id(&self) -> String {
        match self {
            Self::WrongSpecies { correlation_id } => {
                format!("{WRONG_SPECIES_PREFIX}:{correlation_id}")
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::WrongSpecies { .. } => "Wrong Pokemon",
        }
    }
}

/// A component interaction as delivered by the gateway: which control was
/// pressed, by whom, on which message, and the card currently displayed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub interaction_id: u64,
    pub custom_id: String,
    pub user_id: SubscriberId,
    pub message: MessageRef,
    #[serde(default)]
    pub card: Option<NotificationCard>,
}

impl InteractionEvent {
    pub fn kind(&self) -> Option<InteractionKind> {
        InteractionKind::parse(&self.custom_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_species_custom_id_round_trips() {
        let correlation_id = CorrelationId::new();
        let kind = InteractionKind::WrongSpecies { correlation_id };
        let encoded = kind.custom_id();

        assert!(encoded.starts_with("wrong_species:"));
        assert_eq!(InteractionKind::parse(&encoded), Some(kind));
    }

    #[test]
    fn unknown_or_malformed_custom_ids_are_ignored() {
        assert_eq!(InteractionKind::parse("wrong_species"), None);
        assert_eq!(InteractionKind::parse("wrong_species:not-a-uuid"), None);
        assert_eq!(
            InteractionKind::parse("vote:3f0e8a54-9a71-4c39-9a4b-1d2a7f1c9c11"),
            None
        );
    }

    #[test]
    fn wrong_species_prefix_is_recognized_without_a_readable_id() {
        assert!(InteractionKind::is_wrong_species("wrong_species:1234"));
        assert!(InteractionKind::is_wrong_species("wrong_species:"));
        assert!(!InteractionKind::is_wrong_species("wrong_species"));
        assert!(!InteractionKind::is_wrong_species("vote:1234"));
    }
}
