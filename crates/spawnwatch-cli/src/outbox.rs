use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use spawnwatch_contracts::events::EventWriter;
use spawnwatch_contracts::interaction::InteractionKind;
use spawnwatch_contracts::notification::NotificationCard;
use spawnwatch_contracts::{MessageRef, ScopeId, SubscriberId};
use spawnwatch_engine::gateway::{ChatGateway, Presence};

/// File-backed gateway: every outbound action becomes one JSONL line that a
/// platform adapter can replay.
pub struct OutboxGateway {
    writer: EventWriter,
    next_message: AtomicU64,
    scopes: Mutex<BTreeSet<ScopeId>>,
}

impl OutboxGateway {
    pub fn new(writer: EventWriter) -> Self {
        Self {
            writer,
            next_message: AtomicU64::new(1),
            scopes: Mutex::new(BTreeSet::new()),
        }
    }

    /// Records a server the bot has seen traffic from.
    pub fn observe_scope(&self, scope: ScopeId) {
        if let Ok(mut scopes) = self.scopes.lock() {
            scopes.insert(scope);
        }
    }

    fn emit(&self, event_type: &str, payload: Value) -> anyhow::Result<()> {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.writer.emit(event_type, payload)?;
        Ok(())
    }
}

impl ChatGateway for OutboxGateway {
    fn send_direct(
        &self,
        recipient: SubscriberId,
        card: &NotificationCard,
        control: &InteractionKind,
    ) -> anyhow::Result<MessageRef> {
        let message = MessageRef {
            channel: recipient.0,
            message: self.next_message.fetch_add(1, Ordering::SeqCst),
        };
        self.emit(
            "send_direct",
            json!({
                "recipient": recipient,
                "message": message,
                "card": card,
                "control": {
                    "custom_id": control.custom_id(),
                    "label": control.label(),
                },
            }),
        )?;
        Ok(message)
    }

    fn edit_message(&self, message: MessageRef, card: &NotificationCard) -> anyhow::Result<()> {
        self.emit("edit_message", json!({ "message": message, "card": card }))
    }

    fn acknowledge(&self, interaction_id: u64) -> anyhow::Result<()> {
        self.emit("acknowledge", json!({ "interaction_id": interaction_id }))
    }

    fn reply_ephemeral(&self, interaction_id: u64, text: &str) -> anyhow::Result<()> {
        self.emit(
            "reply_ephemeral",
            json!({ "interaction_id": interaction_id, "text": text }),
        )
    }

    fn set_presence(&self, presence: &Presence) -> anyhow::Result<()> {
        self.emit(
            "set_presence",
            json!({ "activity": presence.activity(), "text": presence.text() }),
        )
    }

    fn server_count(&self) -> usize {
        self.scopes.lock().map(|scopes| scopes.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use spawnwatch_contracts::events::read_events;
    use spawnwatch_contracts::notification::SpawnCardSpec;
    use spawnwatch_contracts::CorrelationId;

    use super::*;

    #[test]
    fn outbound_actions_become_jsonl_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("outbox.jsonl");
        let gateway = OutboxGateway::new(EventWriter::new(&path, "session-1"));
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

        let first = gateway.send_direct(SubscriberId(42), &card, &control)?;
        let second = gateway.send_direct(SubscriberId(43), &card, &control)?;
        assert_ne!(first.message, second.message);
        assert_eq!(first.channel, 42);
        gateway.reply_ephemeral(7, "This request has expired.")?;
        gateway.set_presence(&Presence::Watching("for shinies!".to_string()))?;

        let events = read_events(&path)?;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0]["type"], "send_direct");
        assert_eq!(events[0]["recipient"], 42);
        assert_eq!(events[0]["control"]["custom_id"], control.custom_id());
        assert_eq!(events[0]["control"]["label"], "Wrong Pokemon");
        assert_eq!(events[0]["card"]["species"], "pikachu");
        assert_eq!(events[2]["text"], "This request has expired.");
        assert_eq!(events[3]["activity"], "watching");
        assert_eq!(events[3]["session_id"], "session-1");
        Ok(())
    }

    #[test]
    fn server_count_tracks_observed_scopes() {
        let temp = tempfile::tempdir().ok();
        let dir = temp
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_default();
        let gateway = OutboxGateway::new(EventWriter::new(dir.join("outbox.jsonl"), "s"));
        gateway.observe_scope(ScopeId(1));
        gateway.observe_scope(ScopeId(2));
        gateway.observe_scope(ScopeId(1));
        assert_eq!(gateway.server_count(), 2);
    }
}
