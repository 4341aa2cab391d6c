use spawnwatch_contracts::commands::{command_help, parse_command, Command};
use spawnwatch_contracts::inbound::CommandEvent;
use spawnwatch_contracts::subscriptions::SubscriptionStore;
use spawnwatch_contracts::{ScopeId, SubscriberId};

use crate::pipeline::{lock, SpawnPipeline};

pub const SERVER_ONLY_REPLY: &str = "This command can only be used in servers, not in DMs!";
const STATE_UNAVAILABLE_REPLY: &str = "Subscriptions are unavailable right now. Try again later.";

impl SpawnPipeline {
    /// Applies a subscription command and sends the reply. Returns the reply
    /// text, or `None` when `event.text` is not a command.
    pub fn handle_command(&mut self, event: &CommandEvent) -> Option<String> {
        let command = parse_command(&event.text)?;
        if let Some(scope) = &event.scope {
            self.remember_scope(scope);
        }
        let reply = match lock(&self.store, "subscription store") {
            Ok(mut store) => {
                let reply = self.apply_command(&mut store, event, &command);
                if command.is_mutating() {
                    if let Err(err) = store.save() {
                        tracing::error!(failure = "persistence", "saving subscriptions failed: {err:#}");
                    }
                }
                reply
            }
            Err(err) => {
                tracing::error!("{err}");
                STATE_UNAVAILABLE_REPLY.to_string()
            }
        };
        tracing::info!(user_id = %event.user_id, command = ?command, "command handled");
        self.reply(event.interaction_id, &reply);
        Some(reply)
    }

    fn apply_command(&self, store: &mut SubscriptionStore, event: &CommandEvent, command: &Command) -> String {
        let user = event.user_id;
        match command {
            Command::Subscribe => match &event.scope {
                Some(scope) if store.subscribe(user, scope.id) => {
                    format!("You've been subscribed to Pokémon notifications in **{}**!", scope.name)
                }
                Some(scope) => format!(
                    "You're already subscribed to Pokémon notifications in **{}**!",
                    scope.name
                ),
                None => SERVER_ONLY_REPLY.to_string(),
            },
            Command::Unsubscribe => match &event.scope {
                Some(scope) if store.unsubscribe(user, scope.id) => format!(
                    "You've been unsubscribed from Pokémon notifications in **{}**.",
                    scope.name
                ),
                Some(scope) => format!(
                    "You weren't subscribed to Pokémon notifications in **{}**.",
                    scope.name
                ),
                None => SERVER_ONLY_REPLY.to_string(),
            },
            Command::Status => self.status_reply(store, user),
            Command::UnsubscribeAll => match store.unsubscribe_all(user) {
                Some(count) => format!(
                    "You've been unsubscribed from Pokémon notifications in all {count} servers."
                ),
                None => "You weren't subscribed to any Pokémon notifications.".to_string(),
            },
            Command::SubscribeMany(scopes) => {
                let added = store.subscribe_many(user, scopes.iter().copied());
                format!(
                    "You've been subscribed to Pokémon notifications in {} of {} servers.",
                    added.len(),
                    scopes.len()
                )
            }
            Command::UnsubscribeMany(scopes) => {
                let removed = store.unsubscribe_many(user, scopes.iter().copied());
                format!(
                    "You've been unsubscribed from Pokémon notifications in {} of {} servers.",
                    removed.len(),
                    scopes.len()
                )
            }
            Command::Stats => {
                let stats = store.stats();
                format!(
                    "Tracking {} subscribers across {} servers ({} subscriptions).",
                    stats.subscribers, stats.scopes, stats.subscriptions
                )
            }
            Command::Unknown { command, .. } => format!(
                "Unknown command `/{command}`. Available commands:\n{}",
                command_help().join("\n")
            ),
            Command::Invalid { command, reason } => format!("Invalid `/{command}`: {reason}."),
        }
    }

    fn status_reply(&self, store: &SubscriptionStore, user: SubscriberId) -> String {
        let Some(scopes) = store.scopes_for(user).filter(|scopes| !scopes.is_empty()) else {
            return "You are not subscribed to Pokémon notifications in any server.".to_string();
        };
        let lines: Vec<String> = scopes
            .iter()
            .map(|scope| format!("• {}", self.display_scope(*scope)))
            .collect();
        format!(
            "You are currently subscribed to Pokémon notifications in the following servers:\n\n{}",
            lines.join("\n")
        )
    }

    fn display_scope(&self, scope: ScopeId) -> String {
        match self.scope_name(scope) {
            Some(name) => name.to_string(),
            None => format!("Unknown Server ({scope})"),
        }
    }
}
