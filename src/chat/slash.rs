// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slash-command aggregation and resolution
//!
//! A session's slash commands are the chat provider's own plus those of every
//! auxiliary provider scoped to it. Commands from auxiliary providers remember
//! where they came from so `/command` input can be resolved by them.

use std::sync::Arc;

use futures::future::{join, try_join_all};
use tokio_util::sync::CancellationToken;

use crate::chat::provider::{ChatProvider, SlashCommandProvider};
use crate::chat::types::{ChatSessionHandle, SlashCommand};
use crate::error::Result;

/// Ask the main provider and every scoped provider for commands concurrently.
///
/// If any auxiliary provider fails, the main provider's own result is
/// returned instead. A failure of the main provider itself is returned as an
/// error.
pub async fn collect_slash_commands(
    provider: &Arc<dyn ChatProvider>,
    session: &ChatSessionHandle,
    secondaries: Vec<Arc<dyn SlashCommandProvider>>,
    token: CancellationToken,
) -> Result<Option<Vec<SlashCommand>>> {
    if !provider.capabilities().slash_commands {
        return Ok(None);
    }

    let main_request = provider.provide_slash_commands(session, token.clone());
    let secondary_requests = try_join_all(secondaries.into_iter().map(|p| {
        let token = token.clone();
        async move {
            let commands = p.provide_slash_commands(token).await?;
            Ok::<_, crate::error::ParlanceError>(
                commands.map(|cs| cs.into_iter().map(|c| c.tagged(&p)).collect::<Vec<_>>()),
            )
        }
    }));

    let (main_result, secondary_result) = join(main_request, secondary_requests).await;

    match secondary_result {
        Ok(secondary) => {
            let main = main_result?;
            let commands: Vec<SlashCommand> = main
                .into_iter()
                .chain(secondary.into_iter().flatten())
                .flatten()
                .collect();
            Ok(Some(commands))
        }
        Err(e) => {
            tracing::error!(
                target: "parlance.chat.slash",
                provider_id = provider.id(),
                error = %e,
                "slash command provider failed, using main provider's commands"
            );
            main_result
        }
    }
}

/// Rewrite `/command ...` input through the provider that contributed the
/// matching command. Input that matches nothing, or whose provider is gone or
/// fails, is returned unchanged.
pub async fn resolve_slash_command(commands: &[SlashCommand], message: &str) -> String {
    for command in commands {
        if !message.starts_with(&format!("/{}", command.command)) {
            continue;
        }
        let Some(resolver) = command.resolver() else {
            continue;
        };
        return match resolver
            .resolve_slash_command(message, CancellationToken::new())
            .await
        {
            Ok(Some(resolved)) => resolved,
            Ok(None) => message.to_string(),
            Err(e) => {
                tracing::error!(
                    target: "parlance.chat.slash",
                    command = %command.command,
                    error = %e,
                    "slash command resolution failed"
                );
                message.to_string()
            }
        };
    }
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::provider::{ProgressReporter, ProviderCapabilities};
    use crate::chat::types::{CompleteResponse, ReplyRequest};
    use crate::error::ParlanceError;
    use async_trait::async_trait;

    struct Main {
        commands: Option<Vec<&'static str>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatProvider for Main {
        fn id(&self) -> &str {
            "main"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                slash_commands: true,
                ..Default::default()
            }
        }

        async fn prepare_session(
            &self,
            _state: Option<serde_json::Value>,
            _token: CancellationToken,
        ) -> Result<Option<ChatSessionHandle>> {
            Ok(None)
        }

        async fn provide_reply(
            &self,
            _request: ReplyRequest,
            _progress: ProgressReporter,
            _token: CancellationToken,
        ) -> Result<Option<CompleteResponse>> {
            Ok(None)
        }

        async fn provide_slash_commands(
            &self,
            _session: &ChatSessionHandle,
            _token: CancellationToken,
        ) -> Result<Option<Vec<SlashCommand>>> {
            if self.fail {
                return Err(ParlanceError::provider("main failed"));
            }
            Ok(self
                .commands
                .as_ref()
                .map(|cs| cs.iter().map(|c| SlashCommand::new(*c)).collect()))
        }
    }

    struct Aux {
        commands: Vec<&'static str>,
        fail: bool,
        prefix: &'static str,
    }

    #[async_trait]
    impl SlashCommandProvider for Aux {
        fn chat_provider_id(&self) -> &str {
            "main"
        }

        async fn provide_slash_commands(
            &self,
            _token: CancellationToken,
        ) -> Result<Option<Vec<SlashCommand>>> {
            if self.fail {
                return Err(ParlanceError::provider("aux failed"));
            }
            Ok(Some(
                self.commands.iter().map(|c| SlashCommand::new(*c)).collect(),
            ))
        }

        async fn resolve_slash_command(
            &self,
            command: &str,
            _token: CancellationToken,
        ) -> Result<Option<String>> {
            Ok(Some(format!("{}{}", self.prefix, command)))
        }
    }

    fn session() -> ChatSessionHandle {
        ChatSessionHandle::new(1, "u", "b")
    }

    fn names(commands: &[SlashCommand]) -> Vec<&str> {
        commands.iter().map(|c| c.command.as_str()).collect()
    }

    #[tokio::test]
    async fn test_merges_main_and_secondary() {
        let main: Arc<dyn ChatProvider> = Arc::new(Main {
            commands: Some(vec!["explain"]),
            fail: false,
        });
        let aux: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec!["upper"],
            fail: false,
            prefix: "",
        });

        let commands = collect_slash_commands(
            &main,
            &session(),
            vec![Arc::clone(&aux)],
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(names(&commands), vec!["explain", "upper"]);
        assert!(commands[0].resolver().is_none());
        assert!(commands[1].resolver().is_some());
    }

    #[tokio::test]
    async fn test_secondary_failure_falls_back_to_main() {
        let main: Arc<dyn ChatProvider> = Arc::new(Main {
            commands: Some(vec!["explain", "fix"]),
            fail: false,
        });
        let good: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec!["upper"],
            fail: false,
            prefix: "",
        });
        let bad: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec![],
            fail: true,
            prefix: "",
        });

        let commands =
            collect_slash_commands(&main, &session(), vec![good, bad], CancellationToken::new())
                .await
                .unwrap()
                .unwrap();

        assert_eq!(names(&commands), vec!["explain", "fix"]);
    }

    #[tokio::test]
    async fn test_main_failure_is_an_error() {
        let main: Arc<dyn ChatProvider> = Arc::new(Main {
            commands: None,
            fail: true,
        });
        let aux: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec!["upper"],
            fail: false,
            prefix: "",
        });

        let result =
            collect_slash_commands(&main, &session(), vec![aux], CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_main_without_commands_still_lists_secondary() {
        let main: Arc<dyn ChatProvider> = Arc::new(Main {
            commands: None,
            fail: false,
        });
        let aux: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec!["upper"],
            fail: false,
            prefix: "",
        });

        let commands =
            collect_slash_commands(&main, &session(), vec![aux], CancellationToken::new())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(names(&commands), vec!["upper"]);
    }

    #[tokio::test]
    async fn test_resolution_routes_to_contributor() {
        let aux: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec![],
            fail: false,
            prefix: "resolved:",
        });
        let commands = vec![
            SlashCommand::new("explain"),
            SlashCommand::new("upper").tagged(&aux),
        ];

        assert_eq!(
            resolve_slash_command(&commands, "/upper hi").await,
            "resolved:/upper hi"
        );
        assert_eq!(
            resolve_slash_command(&commands, "/explain foo").await,
            "/explain foo"
        );
        assert_eq!(resolve_slash_command(&commands, "/other").await, "/other");
    }

    #[tokio::test]
    async fn test_resolution_skips_dropped_provider() {
        let aux: Arc<dyn SlashCommandProvider> = Arc::new(Aux {
            commands: vec![],
            fail: false,
            prefix: "resolved:",
        });
        let commands = vec![SlashCommand::new("upper").tagged(&aux)];
        drop(aux);

        assert_eq!(resolve_slash_command(&commands, "/upper x").await, "/upper x");
    }
}
