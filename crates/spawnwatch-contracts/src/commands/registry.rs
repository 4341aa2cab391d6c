#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    None,
    ScopeList,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub args: ArgShape,
    pub summary: &'static str,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "sub",
        action: "subscribe",
        args: ArgShape::None,
        summary: "Subscribe to spawn notifications in this server",
    },
    CommandSpec {
        command: "unsub",
        action: "unsubscribe",
        args: ArgShape::None,
        summary: "Unsubscribe from spawn notifications in this server",
    },
    CommandSpec {
        command: "sub_status",
        action: "status",
        args: ArgShape::None,
        summary: "Check your subscription status across all servers",
    },
    CommandSpec {
        command: "unsub_all",
        action: "unsubscribe_all",
        args: ArgShape::None,
        summary: "Unsubscribe from all servers",
    },
    CommandSpec {
        command: "sub_bulk",
        action: "subscribe_many",
        args: ArgShape::ScopeList,
        summary: "Subscribe to several servers by id",
    },
    CommandSpec {
        command: "unsub_bulk",
        action: "unsubscribe_many",
        args: ArgShape::ScopeList,
        summary: "Unsubscribe from several servers by id",
    },
    CommandSpec {
        command: "stats",
        action: "stats",
        args: ArgShape::None,
        summary: "Show subscription totals",
    },
];

pub(crate) fn find_command(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|entry| entry.command == command)
}

/// `/name: summary` lines for every registered command.
pub fn command_help() -> Vec<String> {
    COMMANDS
        .iter()
        .map(|entry| format!("/{}: {}", entry.command, entry.summary))
        .collect()
}
