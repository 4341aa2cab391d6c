use serde::Serialize;

use spawnwatch_contracts::corrections::PendingCorrection;
use spawnwatch_contracts::interaction::{InteractionEvent, InteractionKind};
use spawnwatch_contracts::notification::{capitalize, NotificationCard, SpawnCardSpec};
use spawnwatch_contracts::CorrelationId;

use crate::identify::IdentifyOutcome;
use crate::pipeline::{lock, SpawnPipeline};

pub const EXPIRED_REPLY: &str = "This request has expired.";
pub const UPDATED_REPLY: &str = "Updated with new identification!";
pub const FAILED_REPLY: &str = "Identification failed. Try again later.";

/// Terminal state of one "wrong species" interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// The message now shows `species`.
    Resolved { species: String },
    /// The model insisted on the species already displayed.
    Unchanged { species: String },
    Failed,
    Expired,
}

#[derive(Serialize)]
struct CorrectionRecord<'a> {
    correlation_id: Option<CorrelationId>,
    user_id: u64,
    #[serde(flatten)]
    outcome: &'a CorrectionOutcome,
}

impl SpawnPipeline {
    /// Handles a component interaction. Unknown controls are ignored and
    /// yield `None`; a wrong-species control with an unreadable id has
    /// expired.
    pub fn handle_interaction(&mut self, interaction: &InteractionEvent) -> Option<CorrectionOutcome> {
        let correlation_id = match interaction.kind() {
            Some(InteractionKind::WrongSpecies { correlation_id }) => Some(correlation_id),
            None if InteractionKind::is_wrong_species(&interaction.custom_id) => None,
            None => {
                tracing::debug!(custom_id = %interaction.custom_id, "ignoring unknown interaction");
                return None;
            }
        };
        let outcome = match correlation_id {
            Some(correlation_id) => self.correct_species(interaction, correlation_id),
            None => {
                tracing::warn!(custom_id = %interaction.custom_id, "unreadable correlation id");
                self.reply(interaction.interaction_id, EXPIRED_REPLY);
                CorrectionOutcome::Expired
            }
        };
        tracing::info!(correlation_id = ?correlation_id, outcome = ?outcome, "correction finished");
        self.journal_event(
            "correction",
            &CorrectionRecord {
                correlation_id,
                user_id: interaction.user_id.0,
                outcome: &outcome,
            },
        );
        Some(outcome)
    }

    fn correct_species(
        &mut self,
        interaction: &InteractionEvent,
        correlation_id: CorrelationId,
    ) -> CorrectionOutcome {
        let pending = match lock(&self.corrections, "correction registry") {
            Ok(corrections) => corrections.get(&correlation_id).cloned(),
            Err(err) => {
                tracing::error!("{err}");
                None
            }
        };
        let Some(pending) = pending else {
            self.reply(interaction.interaction_id, EXPIRED_REPLY);
            return CorrectionOutcome::Expired;
        };

        if let Err(err) = self.gateway.acknowledge(interaction.interaction_id) {
            tracing::warn!(interaction_id = interaction.interaction_id, "acknowledge failed: {err:#}");
        }

        let previous_guess = interaction.card.as_ref().map(|card| card.species.as_str());
        let isolated = self.isolator.isolate(&pending.image_bytes);
        let species = match self.identifier.identify_detailed(&isolated, previous_guess) {
            IdentifyOutcome::Identified(species) => species,
            IdentifyOutcome::Repeated(species) => {
                self.reply(
                    interaction.interaction_id,
                    &format!("I still think this is **{}**.", capitalize(&species)),
                );
                return CorrectionOutcome::Unchanged { species };
            }
            IdentifyOutcome::NoAnswer => {
                self.reply(interaction.interaction_id, FAILED_REPLY);
                return CorrectionOutcome::Failed;
            }
        };

        let color = self.colors.resolve(&species);
        let card = self.corrected_card(interaction.card.as_ref(), &pending, &species, color);
        if let Err(err) = self.gateway.edit_message(interaction.message, &card) {
            tracing::warn!(correlation_id = %correlation_id, "editing notification failed: {err:#}");
            self.reply(interaction.interaction_id, FAILED_REPLY);
            return CorrectionOutcome::Failed;
        }
        self.reply(interaction.interaction_id, UPDATED_REPLY);
        CorrectionOutcome::Resolved { species }
    }

    fn corrected_card(
        &self,
        displayed: Option<&NotificationCard>,
        pending: &PendingCorrection,
        species: &str,
        color: u32,
    ) -> NotificationCard {
        match displayed {
            Some(card) => card.with_species(species, &pending.scope_name, color, self.upstream_bot_id),
            None => NotificationCard::spawn(&SpawnCardSpec {
                species,
                scope_name: &pending.scope_name,
                color,
                message_link: &pending.message_link,
                thumbnail_url: pending.image.url(),
                upstream_bot_id: self.upstream_bot_id,
            }),
        }
    }

    pub(crate) fn reply(&self, interaction_id: u64, text: &str) {
        if let Err(err) = self.gateway.reply_ephemeral(interaction_id, text) {
            tracing::warn!(interaction_id, "ephemeral reply failed: {err:#}");
        }
    }
}
