use super::CommandResult;
use crate::core::controller::ChatController;

pub type CommandHandler = fn(&ChatController, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Create a new session and switch to it.",
        handler: super::handle_new,
    },
    Command {
        name: "switch",
        usage: "/switch <name>",
        help: "Make an existing session current.",
        handler: super::handle_switch,
    },
    Command {
        name: "sessions",
        usage: "/sessions",
        help: "List sessions; the current one is marked.",
        handler: super::handle_sessions,
    },
    Command {
        name: "request",
        usage: "/request",
        help: "Show the request history of the current session.",
        handler: super::handle_request,
    },
    Command {
        name: "response",
        usage: "/response",
        help: "Show the committed replies of the current session.",
        handler: super::handle_response,
    },
    Command {
        name: "clear-request",
        usage: "/clear-request",
        help: "Empty the request history of the current session.",
        handler: super::handle_clear_request,
    },
    Command {
        name: "clear-response",
        usage: "/clear-response",
        help: "Empty the committed replies of the current session.",
        handler: super::handle_clear_response,
    },
    Command {
        name: "status",
        usage: "/status",
        help: "Show whether a request is in flight and the last error.",
        handler: super::handle_status,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Exit the chat.",
        handler: super::handle_quit,
    },
];
