//! Line-oriented chat frontend.
//!
//! Reads prompts from stdin, streams reply fragments to stdout as they are
//! decoded, and routes `/` commands through [`crate::commands`]. Status and
//! errors go to stderr.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::commands::{process_input, CommandResult};
use crate::core::client::CompletionOutcome;
use crate::core::controller::{ChatController, ChatEvent};
use crate::core::error::ChatError;

pub async fn run_chat(controller: &ChatController) -> Result<(), Box<dyn Error>> {
    let mut events = controller.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("💬 chatservice: type a prompt and press Enter, /help for commands, Ctrl+C to quit");

    loop {
        show_prompt(controller)?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match process_input(controller, &line) {
            CommandResult::Output(text) => println!("{text}"),
            CommandResult::Quit => break,
            CommandResult::ProcessAsMessage(prompt) => {
                stream_reply(controller, &prompt, &mut events).await?;
            }
        }
    }

    Ok(())
}

/// One-shot send. Returns whether a reply was received.
pub async fn run_ask(controller: &ChatController, prompt: &str) -> Result<bool, Box<dyn Error>> {
    let mut events = controller.subscribe();
    Ok(stream_reply(controller, prompt, &mut events).await?)
}

fn show_prompt(controller: &ChatController) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{}> ", controller.current_session().name())?;
    stdout.flush()
}

/// Send `prompt`, echoing fragments until the send resolves. Ctrl+C cancels
/// the send rather than exiting.
async fn stream_reply(
    controller: &ChatController,
    prompt: &str,
    events: &mut UnboundedReceiver<ChatEvent>,
) -> io::Result<bool> {
    // Events queued by earlier commands are not part of this reply
    while events.try_recv().is_ok() {}

    let send = controller.send(prompt);
    tokio::pin!(send);

    let mut printed = false;
    let result = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => printed |= render(&event)?,
            result = &mut send => break result,
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        printed |= render(&event)?;
    }
    if printed {
        println!();
    }

    Ok(report(result))
}

fn render(event: &ChatEvent) -> io::Result<bool> {
    match event {
        ChatEvent::Delta { text, .. } => {
            let mut stdout = io::stdout();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn report(result: Result<CompletionOutcome, ChatError>) -> bool {
    match result {
        Ok(CompletionOutcome::Success(_)) => true,
        Ok(CompletionOutcome::Failure(reason)) => {
            eprintln!("❌ {reason}");
            false
        }
        Ok(CompletionOutcome::Cancelled) => {
            eprintln!("⚠️  Reply cancelled");
            false
        }
        Err(err) => {
            eprintln!("❌ {err}");
            false
        }
    }
}
