use crate::ids::ScopeId;

use super::registry::{find_command, ArgShape};

/// A parsed subscription command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Status,
    UnsubscribeAll,
    SubscribeMany(Vec<ScopeId>),
    UnsubscribeMany(Vec<ScopeId>),
    Stats,
    Unknown { command: String, arg: String },
    Invalid { command: String, reason: String },
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .flat_map(|part| {
                part.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<String>>()
            })
            .collect(),
        Err(_) => arg
            .split(|ch: char| ch.is_whitespace() || ch == ',')
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_scope_list(command: &str, arg: &str) -> Command {
    let parts = split_args(arg);
    if parts.is_empty() {
        return Command::Invalid {
            command: command.to_string(),
            reason: "expected one or more server ids".to_string(),
        };
    }
    let mut scopes = Vec::with_capacity(parts.len());
    for part in parts {
        match part.parse::<ScopeId>() {
            Ok(scope) => {
                if !scopes.contains(&scope) {
                    scopes.push(scope);
                }
            }
            Err(_) => {
                return Command::Invalid {
                    command: command.to_string(),
                    reason: format!("'{part}' is not a server id"),
                }
            }
        }
    }
    Command::from_scope_action(command, scopes)
}

impl Command {
    fn from_scope_action(command: &str, scopes: Vec<ScopeId>) -> Self {
        match find_command(command).map(|entry| entry.action) {
            Some("unsubscribe_many") => Self::UnsubscribeMany(scopes),
            _ => Self::SubscribeMany(scopes),
        }
    }

    fn from_bare_action(action: &str) -> Option<Self> {
        match action {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            "status" => Some(Self::Status),
            "unsubscribe_all" => Some(Self::UnsubscribeAll),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }

    /// True for commands that change the subscription mapping.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Subscribe
                | Self::Unsubscribe
                | Self::UnsubscribeAll
                | Self::SubscribeMany(_)
                | Self::UnsubscribeMany(_)
        )
    }
}

/// Parses `/name args` text. Returns `None` for text that is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let tail = trimmed.strip_prefix('/').or_else(|| trimmed.strip_prefix('!'))?;
    let command_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return None;
    }
    let command = tail[..command_len].to_ascii_lowercase();
    let arg = tail[command_len..].trim();

    let Some(entry) = find_command(&command) else {
        return Some(Command::Unknown {
            command,
            arg: arg.to_string(),
        });
    };
    match entry.args {
        ArgShape::ScopeList => Some(parse_scope_list(&command, arg)),
        ArgShape::None => Command::from_bare_action(entry.action).or(Some(Command::Unknown {
            command,
            arg: arg.to_string(),
        })),
    }
}
