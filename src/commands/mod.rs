mod registry;

pub use registry::{all_commands, find_command, CommandInvocation};

use crate::core::controller::ChatController;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Text to show the user.
    Output(String),
    ProcessAsMessage(String),
    Quit,
}

pub fn process_input(controller: &ChatController, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = find_command(command_name) {
        let invocation = CommandInvocation { args };
        (command.handler)(controller, invocation)
    } else {
        CommandResult::ProcessAsMessage(input.to_string())
    }
}

pub(super) fn handle_help(
    _controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);

    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:width$}  {}\n", command.usage, command.help));
    }
    help.push_str("Anything else is sent as a prompt. Ctrl+C cancels a reply in progress.");
    CommandResult::Output(help)
}

pub(super) fn handle_new(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let name = controller.create_session();
    CommandResult::Output(format!("Switched to new session: {name}"))
}

pub(super) fn handle_switch(
    controller: &ChatController,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::Output("Usage: /switch <name>".to_string());
    }

    match controller.switch_session(invocation.args) {
        Ok(()) => CommandResult::Output(format!("Switched to session: {}", invocation.args)),
        Err(err) => CommandResult::Output(format!("❌ {err}")),
    }
}

pub(super) fn handle_sessions(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let current = controller.current_session();
    let listing = controller
        .sessions()
        .into_iter()
        .map(|name| {
            let marker = if name == current.name() { "*" } else { " " };
            format!("{marker} {name}")
        })
        .collect::<Vec<_>>()
        .join("\n");
    CommandResult::Output(listing)
}

pub(super) fn handle_request(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Output(show_buffer(controller.current_session().request_buffer()))
}

pub(super) fn handle_response(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Output(show_buffer(controller.current_session().response_buffer()))
}

fn show_buffer(buffer: &str) -> String {
    if buffer.is_empty() {
        "(empty)".to_string()
    } else {
        buffer.to_string()
    }
}

pub(super) fn handle_clear_request(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    controller.clear_request();
    CommandResult::Output("Request history cleared.".to_string())
}

pub(super) fn handle_clear_response(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    controller.clear_response();
    CommandResult::Output("Response history cleared.".to_string())
}

pub(super) fn handle_status(
    controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let status = controller.status();
    let session = controller.current_session();
    let state = if status.is_sending { "sending" } else { "idle" };

    let mut lines = vec![
        format!("Session: {}", session.name()),
        format!("State: {state}"),
    ];
    if let Some(error) = status.last_error {
        lines.push(format!("Last error: {error}"));
    }
    CommandResult::Output(lines.join("\n"))
}

pub(super) fn handle_quit(
    _controller: &ChatController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Quit
}
