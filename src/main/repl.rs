// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use parlance::chat::{
    ChatModel, ChatModelChange, ChatProgress, ChatService, RequestOutcome, Registration,
    WelcomeItem,
};
use parlance::cli::ChatArgs;
use parlance::config::Settings;
use parlance::error::ParlanceError;
use parlance::providers::{EchoProvider, EchoSlashCommands, ECHO_PROVIDER_ID};
use parlance::utils::{format_error, is_exit_command, parse_session_id, parse_slash_command};

/// Register the built-in echo provider and its `/upper` command.
pub(super) fn register_echo(
    service: &ChatService,
    settings: &Settings,
) -> anyhow::Result<Vec<Registration>> {
    let provider = service
        .register_provider(Arc::new(EchoProvider::from_config(&settings.echo)))
        .context("failed to register echo provider")?;
    let commands = service.register_slash_command_provider(Arc::new(EchoSlashCommands));
    Ok(vec![provider, commands])
}

pub(super) async fn run_chat(
    service: &ChatService,
    settings: &Settings,
    args: ChatArgs,
) -> anyhow::Result<()> {
    let registrations = register_echo(service, settings)?;

    let mut model = match args.resume {
        Some(id) => {
            let id = parse_session_id(&id)?;
            service
                .get_or_restore_session(&id)
                .ok_or_else(|| anyhow::anyhow!(format_error(&ParlanceError::UnknownSession(id))))?
        }
        None => service.start_session(ECHO_PROVIDER_ID, CancellationToken::new()),
    };
    model.wait_for_initialization().await?;
    print_session(&model)?;

    while let Some(input) = read_user_input()? {
        if input.is_empty() {
            continue;
        }
        if is_exit_command(&input) {
            break;
        }
        if input == ":clear" {
            service.clear_session(model.session_id())?;
            model = service.start_session(ECHO_PROVIDER_ID, CancellationToken::new());
            model.wait_for_initialization().await?;
            println!("Session cleared.\n");
            continue;
        }
        if let Some(("help", _)) = parse_slash_command(&input) {
            print_slash_commands(service, &model).await?;
            continue;
        }

        send_and_stream(service, &model, input).await?;
    }

    let saved = service.save_state().await?;
    tracing::debug!(target: "parlance", saved, "saved sessions on exit");
    for registration in registrations {
        registration.dispose();
    }
    Ok(())
}

/// Send one message and print the reply as it streams in. Ctrl-C cancels.
async fn send_and_stream(
    service: &ChatService,
    model: &ChatModel,
    input: String,
) -> anyhow::Result<()> {
    let mut changes = model.subscribe();
    let Some(completion) = service.send_request(model.session_id(), input).await? else {
        println!("(not sent)\n");
        return Ok(());
    };
    let request_id = completion.request_id().to_string();

    print_responder_prefix(&model.responder_username())?;
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(ChatModelChange::ResponseProgress {
                    request_id: id,
                    progress: ChatProgress::Content(content),
                }) if id == request_id => {
                    print!("{}", content);
                    io::stdout().flush()?;
                }
                Ok(ChatModelChange::ResponseCompleted { request_id: id })
                | Ok(ChatModelChange::RequestCancelled { request_id: id })
                    if id == request_id =>
                {
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                service.cancel_current_request_for_session(model.session_id());
            }
        }
    }

    let outcome = completion.wait().await?;
    println!();
    if outcome == RequestOutcome::Cancelled {
        println!("(cancelled)");
    } else if let Some(details) = model
        .request(&request_id)
        .and_then(|r| r.response.error_details)
    {
        let mut stdout = io::stdout();
        stdout.execute(SetForegroundColor(Color::Red))?;
        print!("{}", details.message);
        stdout.execute(ResetColor)?;
        println!();
    }
    println!();
    Ok(())
}

async fn print_slash_commands(service: &ChatService, model: &ChatModel) -> anyhow::Result<()> {
    let commands = service
        .get_slash_commands(model.session_id(), CancellationToken::new())
        .await?
        .unwrap_or_default();
    if commands.is_empty() {
        println!("No slash commands.\n");
        return Ok(());
    }
    for command in commands {
        println!(
            "  /{:<10} {}",
            command.command,
            command.detail.as_deref().unwrap_or("")
        );
    }
    println!();
    Ok(())
}

/// Print the welcome message of a fresh session or the exchanges of a
/// restored one.
fn print_session(model: &ChatModel) -> anyhow::Result<()> {
    let requests = model.requests();
    if requests.is_empty() {
        if let Some(welcome) = model.welcome_message() {
            print_responder_prefix(&welcome.responder_username)?;
            for item in welcome.items {
                match item {
                    WelcomeItem::Markdown(text) => println!("{}", text),
                    WelcomeItem::Followups(followups) => {
                        for followup in followups {
                            let label = followup.title.as_deref().unwrap_or(&followup.message);
                            println!("  > {}", label);
                        }
                    }
                }
            }
            println!();
        }
        return Ok(());
    }

    println!("Resumed session {}: {}\n", model.session_id(), model.title());
    for request in requests {
        print_user_prefix()?;
        println!("{}", request.message.text());
        print_responder_prefix(&model.responder_username())?;
        println!("{}\n", request.response.content);
    }
    Ok(())
}

fn print_user_prefix() -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("you: ");
    stdout.execute(ResetColor)?;
    stdout.flush()
}

fn print_responder_prefix(name: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("{}: ", name);
    stdout.execute(ResetColor)?;
    stdout.flush()
}

/// Read one line. `None` on end of input.
fn read_user_input() -> io::Result<Option<String>> {
    print_user_prefix()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        println!();
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
