use spawnwatch_contracts::interaction::InteractionKind;
use spawnwatch_contracts::notification::NotificationCard;
use spawnwatch_contracts::{MessageRef, SubscriberId};

use crate::gateway::ChatGateway;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<(SubscriberId, MessageRef)>,
    pub failed: Vec<SubscriberId>,
}

/// Sends one copy of `card` to each recipient in order. A failed delivery is
/// logged and does not stop the remaining ones.
pub fn fan_out(
    gateway: &dyn ChatGateway,
    recipients: &[SubscriberId],
    card: &NotificationCard,
    control: &InteractionKind,
) -> FanoutReport {
    let mut report = FanoutReport::default();
    for &recipient in recipients {
        match gateway.send_direct(recipient, card, control) {
            Ok(message) => report.delivered.push((recipient, message)),
            Err(err) => {
                tracing::warn!(recipient = %recipient, "notification delivery failed: {err:#}");
                report.failed.push(recipient);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use spawnwatch_contracts::notification::SpawnCardSpec;
    use spawnwatch_contracts::CorrelationId;

    use super::*;
    use crate::test_support::RecordingGateway;

    #[test]
    fn failed_recipient_does_not_block_the_rest() {
        let gateway = RecordingGateway::default().failing_for([SubscriberId(2)]);
        let card = NotificationCard::spawn(&SpawnCardSpec {
            species: "pikachu",
            scope_name: "Kanto",
            color: 0xF7D02C,
            message_link: "https://discord.com/channels/1/2/3",
            thumbnail_url: None,
            upstream_bot_id: 716390085896962058,
        });
        let control = InteractionKind::WrongSpecies {
            correlation_id: CorrelationId::new(),
        };

        let report = fan_out(
            &gateway,
            &[SubscriberId(1), SubscriberId(2), SubscriberId(3)],
            &card,
            &control,
        );

        assert_eq!(report.failed, vec![SubscriberId(2)]);
        let delivered: Vec<SubscriberId> = report.delivered.iter().map(|(id, _)| *id).collect();
        assert_eq!(delivered, vec![SubscriberId(1), SubscriberId(3)]);
        let sent = gateway.direct_messages();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, _, custom_id)| *custom_id == control.custom_id()));
    }
}
