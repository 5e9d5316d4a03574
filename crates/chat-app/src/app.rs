use std::sync::Arc;

use chrono::Local;
use contextlink_api::{BoxFuture, ConversationId};
use futures::stream::{FuturesUnordered, StreamExt};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::carbon_tracker::CarbonTracker;
use crate::chat::{
    ChatStore, Command, CommandRejection, EffectRunner, MainView, Outcome, composer_prompt,
    conversation_rows, render_conversation_list, render_empty_view, render_insight,
    render_message, render_thread,
};
use crate::model_selector::ModelSelector;
use crate::settings::SettingsStore;

const HELP_TEXT: &str = "\
Commands:
  /new [model]       start a conversation (defaults to the selected model)
  /list              show conversations
  /refresh           reload conversations from the backend
  /open <id>         open a conversation
  /show              redraw the active conversation
  /delete <id>       delete a conversation
  /models            list available models
  /model <name|n>    select a model by name or list number
  /info [model]      show model details
  /estimate          estimate cost of the active conversation
  /summary           summarize the active conversation
  /search <query>    search stored messages
  /context [n]       show the last n messages the backend keeps as context
  /compress          compress the middle of the active conversation
  /carbon            show the carbon tracker
  /health            check the backend
  /help              show this help
  /quit              exit
Anything else is sent as a message to the active conversation.";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShellError {
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type ShellResult<T> = Result<T, ShellError>;

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Dispatch(Command),
    SelectModel(String),
    ListConversations,
    ShowThread,
    ShowModels,
    ShowCarbon,
    Help,
    Quit,
    Invalid(String),
}

/// Plain text becomes a message; `/name args` lines become commands.
pub fn parse_input(line: &str) -> ShellInput {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(slash_command) = line.trim_start().strip_prefix('/') else {
        return ShellInput::Dispatch(Command::SendMessage {
            content: line.to_string(),
        });
    };

    let (name, argument) = match slash_command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (slash_command.trim(), ""),
    };

    match name {
        "new" => ShellInput::Dispatch(Command::CreateConversation {
            initial_model: argument.to_string(),
        }),
        "list" | "ls" => ShellInput::ListConversations,
        "refresh" => ShellInput::Dispatch(Command::RefreshConversations),
        "open" => {
            parse_conversation_id(argument, "/open <id>").map_or_else(ShellInput::Invalid, |id| {
                ShellInput::Dispatch(Command::SelectConversation(id))
            })
        }
        "delete" => parse_conversation_id(argument, "/delete <id>")
            .map_or_else(ShellInput::Invalid, |id| {
                ShellInput::Dispatch(Command::DeleteConversation(id))
            }),
        "show" => ShellInput::ShowThread,
        "models" => ShellInput::ShowModels,
        "model" if argument.is_empty() => ShellInput::ShowModels,
        "model" => ShellInput::SelectModel(argument.to_string()),
        "info" => ShellInput::Dispatch(Command::InspectModel {
            model_name: argument.to_string(),
        }),
        "estimate" => ShellInput::Dispatch(Command::EstimateCost),
        "summary" => ShellInput::Dispatch(Command::SummarizeConversation),
        "search" => ShellInput::Dispatch(Command::SearchMemory {
            query: argument.to_string(),
        }),
        "context" if argument.is_empty() => {
            ShellInput::Dispatch(Command::ShowContext { max_messages: 0 })
        }
        "context" => match argument.parse::<u32>() {
            Ok(max_messages) => ShellInput::Dispatch(Command::ShowContext { max_messages }),
            Err(_) => ShellInput::Invalid("usage: /context [n]".to_string()),
        },
        "compress" => ShellInput::Dispatch(Command::CompressContext),
        "carbon" => ShellInput::ShowCarbon,
        "health" => ShellInput::Dispatch(Command::CheckHealth),
        "help" | "?" => ShellInput::Help,
        "quit" | "exit" => ShellInput::Quit,
        other => ShellInput::Invalid(format!("unknown command /{other}, try /help")),
    }
}

fn parse_conversation_id(raw: &str, usage: &str) -> Result<ConversationId, String> {
    if raw.is_empty() {
        return Err(format!("usage: {usage}"));
    }
    ConversationId::parse(raw).map_err(|error| error.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What to print once an outcome has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redraw {
    ModelCount,
    List,
    Thread,
    Reply(ConversationId),
    Insight,
    Compression(ConversationId),
    Health,
    Failure,
}

impl Redraw {
    fn after(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::ModelsLoaded(_) => Self::ModelCount,
            Outcome::ConversationsLoaded(_) | Outcome::ConversationDeleted(_) => Self::List,
            Outcome::ConversationCreated(_) | Outcome::ConversationLoaded(_) => Self::Thread,
            Outcome::MessagePosted {
                conversation_id, ..
            } => Self::Reply(*conversation_id),
            Outcome::ModelInfoLoaded { .. }
            | Outcome::CostEstimated(_)
            | Outcome::SummaryLoaded(_)
            | Outcome::MemorySearched { .. }
            | Outcome::ContextLoaded(_) => Self::Insight,
            Outcome::ContextCompressed(report) => Self::Compression(report.conversation_id),
            Outcome::HealthChecked(_) => Self::Health,
            Outcome::Failed { .. } => Self::Failure,
        }
    }
}

/// Terminal front end: reads lines, dispatches commands, renders state.
pub struct ChatShell<W> {
    store: ChatStore,
    runner: EffectRunner,
    settings: Option<Arc<SettingsStore>>,
    tracker: CarbonTracker,
    in_flight: FuturesUnordered<BoxFuture<'static, Outcome>>,
    output: W,
    colored: bool,
}

impl<W> ChatShell<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(store: ChatStore, runner: EffectRunner, output: W) -> Self {
        Self {
            store,
            runner,
            settings: None,
            tracker: CarbonTracker::default(),
            in_flight: FuturesUnordered::new(),
            output,
            colored: false,
        }
    }

    /// Persists model selections through the given store.
    pub fn with_settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Enables ANSI provider tints in the model list.
    pub fn with_colors(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// State behind the shell, for inspection after a run.
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Runs until `/quit` or end of input, then drains in-flight effects.
    pub async fn run<R>(mut self, input: R) -> ShellResult<W>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        self.write_block("ContextLink terminal client. Type /help for commands.")
            .await?;
        self.dispatch(Command::CheckHealth);
        self.dispatch(Command::Initialize);

        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => {
                    match line.context(ReadInputSnafu { stage: "read-input-line" })? {
                        Some(line) => {
                            if self.handle_line(&line).await? == Flow::Quit {
                                break;
                            }
                        }
                        None => input_open = false,
                    }
                }
                Some(outcome) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.handle_outcome(outcome).await?;
                }
                else => break,
            }
        }

        self.settle().await?;
        tracing::info!("shell stopped");
        Ok(self.output)
    }

    /// Applies every in-flight outcome, rendering each as it lands.
    pub async fn settle(&mut self) -> ShellResult<()> {
        while let Some(outcome) = self.in_flight.next().await {
            self.handle_outcome(outcome).await?;
        }
        Ok(())
    }

    /// Handles one input line; effects it starts stay in flight.
    pub async fn handle_line(&mut self, line: &str) -> ShellResult<Flow> {
        match parse_input(line) {
            ShellInput::Dispatch(command) => {
                let is_send = matches!(command, Command::SendMessage { .. });
                if self.dispatch(command) == 0 {
                    self.report_rejection(is_send).await?;
                }
            }
            ShellInput::SelectModel(raw) => self.select_model(&raw).await?,
            ShellInput::ListConversations => {
                let rows = conversation_rows(
                    self.store.conversations(),
                    self.store.active_conversation_id(),
                    &Local::now(),
                );
                self.write_block(&render_conversation_list(&rows)).await?;
            }
            ShellInput::ShowThread => self.write_main_view().await?,
            ShellInput::ShowModels => {
                let rendered = self.model_selector().render(self.colored);
                self.write_block(&rendered).await?;
            }
            ShellInput::ShowCarbon => {
                let rendered = self.tracker.render();
                self.write_block(&rendered).await?;
            }
            ShellInput::Help => self.write_block(HELP_TEXT).await?,
            ShellInput::Quit => return Ok(Flow::Quit),
            ShellInput::Invalid(message) => self.write_block(&message).await?,
        }
        Ok(Flow::Continue)
    }

    fn dispatch(&mut self, command: Command) -> usize {
        let effects = self.store.dispatch(command);
        let count = effects.len();
        for effect in effects {
            self.in_flight.push(self.runner.run(effect));
        }
        count
    }

    fn model_selector(&self) -> ModelSelector {
        ModelSelector::new(self.store.selected_model(), self.store.models().to_vec())
    }

    async fn select_model(&mut self, raw: &str) -> ShellResult<()> {
        let selector = self.model_selector();
        let model_name = selector.resolve(raw);
        self.dispatch(Command::SelectModel(model_name.clone()));

        if let Some(settings) = &self.settings
            && let Err(error) = settings.remember_default_model(&model_name)
        {
            tracing::warn!(stage = "remember-default-model", "{error}");
        }

        let note = if selector.is_known(&model_name) {
            String::new()
        } else {
            " (not in the model list)".to_string()
        };
        self.write_block(&format!("Model set to {model_name}{note}."))
            .await
    }

    async fn report_rejection(&mut self, is_send: bool) -> ShellResult<()> {
        let message = match self.store.last_rejection() {
            // Blank lines are simply ignored.
            Some(CommandRejection::EmptyDraft) | None => return Ok(()),
            Some(CommandRejection::AlreadySending { .. }) => {
                "Still waiting for the previous reply.".to_string()
            }
            Some(CommandRejection::NoActiveConversation) if is_send => {
                "No active conversation. Use /new or /open <id> first.".to_string()
            }
            Some(CommandRejection::NoActiveConversation) => {
                "This needs an active conversation.".to_string()
            }
            Some(CommandRejection::EmptyQuery) => "usage: /search <query>".to_string(),
        };
        self.write_block(&message).await
    }

    async fn handle_outcome(&mut self, outcome: Outcome) -> ShellResult<()> {
        let redraw = Redraw::after(&outcome);
        self.store.apply(outcome);

        match redraw {
            Redraw::ModelCount => {
                let message = format!(
                    "{} models available, using {}.",
                    self.store.models().len(),
                    self.store.selected_model()
                );
                self.write_block(&message).await
            }
            Redraw::List => {
                let rows = conversation_rows(
                    self.store.conversations(),
                    self.store.active_conversation_id(),
                    &Local::now(),
                );
                self.write_block(&render_conversation_list(&rows)).await
            }
            Redraw::Thread => self.write_main_view().await,
            Redraw::Reply(conversation_id) => {
                let reply = self
                    .store
                    .active_conversation()
                    .filter(|active| active.id == conversation_id)
                    .and_then(|active| active.messages.last())
                    .map(render_message);
                match reply {
                    Some(rendered) => self.write_block(&rendered).await,
                    None => Ok(()),
                }
            }
            Redraw::Insight => {
                let insight = self.store.insight().map(render_insight);
                match insight {
                    Some(rendered) => self.write_block(&rendered).await,
                    None => Ok(()),
                }
            }
            Redraw::Compression(conversation_id) => {
                let insight = self.store.insight().map(render_insight);
                if let Some(rendered) = insight {
                    self.write_block(&rendered).await?;
                }
                // The stored thread was rewritten; reload it so the view matches.
                if self.store.active_conversation_id() == Some(conversation_id) {
                    self.dispatch(Command::SelectConversation(conversation_id));
                }
                Ok(())
            }
            Redraw::Health => {
                let message = match self.store.backend_status() {
                    Some(status) if status.is_healthy() => "Backend is healthy.".to_string(),
                    Some(status) => format!("Backend reports status '{}'.", status.status),
                    None => return Ok(()),
                };
                self.write_block(&message).await
            }
            Redraw::Failure => {
                let message = format!(
                    "Request failed ({}).",
                    self.store.last_failure().unwrap_or("unknown error")
                );
                self.write_block(&message).await
            }
        }
    }

    async fn write_main_view(&mut self) -> ShellResult<()> {
        let rendered = match (self.store.main_view(), self.store.active_conversation()) {
            (MainView::HasConversation(_), Some(conversation)) => render_thread(conversation),
            _ => render_empty_view(),
        };
        self.write_block(&rendered).await
    }

    async fn write_block(&mut self, text: &str) -> ShellResult<()> {
        let prompt = composer_prompt(self.store.composer());
        let block = format!("{text}\n{prompt}");
        self.output
            .write_all(block.as_bytes())
            .await
            .context(WriteOutputSnafu {
                stage: "write-shell-output",
            })?;
        self.output.flush().await.context(WriteOutputSnafu {
            stage: "flush-shell-output",
        })
    }
}

#[cfg(test)]
mod tests {
    use contextlink_api::MemoryBackend;

    use super::*;

    fn shell() -> ChatShell<Vec<u8>> {
        let runner = EffectRunner::new(Arc::new(MemoryBackend::with_default_catalog()));
        ChatShell::new(ChatStore::new("gpt-4"), runner, Vec::new())
    }

    fn output_text(shell: ChatShell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[test]
    fn plain_lines_become_messages_and_slash_lines_commands() {
        assert_eq!(
            parse_input("hello there\n"),
            ShellInput::Dispatch(Command::SendMessage {
                content: "hello there".to_string()
            })
        );
        assert_eq!(
            parse_input("/open 12"),
            ShellInput::Dispatch(Command::SelectConversation(ConversationId::new(12)))
        );
        assert_eq!(
            parse_input("/new claude-3-haiku"),
            ShellInput::Dispatch(Command::CreateConversation {
                initial_model: "claude-3-haiku".to_string()
            })
        );
        assert_eq!(parse_input("/model"), ShellInput::ShowModels);
        assert_eq!(parse_input("/quit"), ShellInput::Quit);
        assert!(matches!(parse_input("/open abc"), ShellInput::Invalid(_)));
        assert!(matches!(parse_input("/delete"), ShellInput::Invalid(_)));
        assert!(matches!(parse_input("/bogus"), ShellInput::Invalid(_)));
        assert_eq!(
            parse_input("/context"),
            ShellInput::Dispatch(Command::ShowContext { max_messages: 0 })
        );
        assert!(matches!(parse_input("/context many"), ShellInput::Invalid(_)));
    }

    #[tokio::test]
    async fn new_conversation_then_message_renders_reply() {
        let mut shell = shell();
        shell.handle_line("/new gpt-4").await.unwrap();
        shell.settle().await.unwrap();
        shell.handle_line("hello").await.unwrap();
        shell.settle().await.unwrap();

        let active = shell.store().active_conversation().unwrap();
        assert_eq!(active.message_count, 1);
        assert_eq!(shell.store().conversations()[0].message_count, 1);

        let output = output_text(shell);
        assert!(output.contains("== New Conversation (#1) =="));
        assert!(output.contains("Mock response to: hello"));
    }

    #[tokio::test]
    async fn message_without_conversation_is_explained() {
        let mut shell = shell();
        shell.handle_line("hello").await.unwrap();
        shell.handle_line("   ").await.unwrap();
        shell.settle().await.unwrap();

        let output = output_text(shell);
        assert!(output.contains("No active conversation"));
        assert_eq!(output.matches("No active conversation").count(), 1);
    }

    #[tokio::test]
    async fn compress_reloads_the_active_thread() {
        let mut shell = shell();
        shell.handle_line("/new gpt-4").await.unwrap();
        shell.settle().await.unwrap();
        for turn in ["one", "two", "three"] {
            shell.handle_line(turn).await.unwrap();
            shell.settle().await.unwrap();
        }

        shell.handle_line("/compress").await.unwrap();
        shell.settle().await.unwrap();

        let active = shell.store().active_conversation().unwrap();
        assert_eq!(active.messages.len(), 6);
        assert_eq!(active.messages[2].content, "[COMPRESSED] two");

        shell.handle_line("/context 2").await.unwrap();
        shell.settle().await.unwrap();
        let output = output_text(shell);
        assert!(output.contains("Compressed #1: 2 of 6 messages compressed"));
        assert!(output.contains("Context for #1 (2 messages):"));
    }

    #[tokio::test]
    async fn run_drains_effects_after_input_ends() {
        let input: &[u8] = b"/models\n";
        let output = shell().run(input).await.unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("Backend is healthy."));
        assert!(output.contains("6 models available"));
        assert!(output.contains("No conversations yet"));
    }

    #[tokio::test]
    async fn model_selection_by_index_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        let mut shell = shell().with_settings(Arc::clone(&settings));
        shell.dispatch(Command::Initialize);
        shell.settle().await.unwrap();

        shell.handle_line("/model 5").await.unwrap();
        assert_eq!(shell.store().selected_model(), "gemini-pro");
        assert_eq!(settings.settings().default_model, "gemini-pro");
    }
}
